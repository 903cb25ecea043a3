//! Aggregation queries for the external read surface.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use spacesync_core::{SyncError, SyncResult};

/// Byte totals over a directory subtree, directories excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirSize {
    pub total: i64,
    pub synced: i64,
}

/// Direct-children counters for a directory row. A child is stable when its
/// `selected` flag agrees with the presence of its spaces view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildCounts {
    pub total: u32,
    pub selected: u32,
    pub stable: u32,
}

/// Whole-catalog label approximation from `selected × view-present`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub archived: u64,
    pub synced: u64,
    pub syncing: u64,
    pub removing: u64,
}

pub fn total_size(conn: &Connection) -> SyncResult<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(size), 0) FROM entries WHERE type != 'dir'",
        [],
        |row| row.get(0),
    )
    .map_err(SyncError::storage)
}

pub fn synced_size(conn: &Connection) -> SyncResult<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(e.size), 0)
         FROM entries e
         JOIN spaces_view sv ON sv.entry_ino = e.inode
         WHERE e.type != 'dir'",
        [],
        |row| row.get(0),
    )
    .map_err(SyncError::storage)
}

pub fn dir_size(conn: &Connection, inode: u64) -> SyncResult<DirSize> {
    conn.query_row(
        "WITH RECURSIVE subtree(ino) AS (
            SELECT inode FROM entries WHERE inode = ?1
            UNION ALL
            SELECT e.inode FROM entries e JOIN subtree s ON e.parent_ino = s.ino
        )
        SELECT
            COALESCE(SUM(e.size), 0),
            COALESCE(SUM(CASE WHEN sv.entry_ino IS NOT NULL THEN e.size END), 0)
        FROM entries e
        LEFT JOIN spaces_view sv ON sv.entry_ino = e.inode
        WHERE e.inode IN (SELECT ino FROM subtree) AND e.type != 'dir'",
        params![inode],
        |row| {
            Ok(DirSize {
                total: row.get(0)?,
                synced: row.get(1)?,
            })
        },
    )
    .map_err(SyncError::storage)
}

pub fn child_counts(conn: &Connection, parent_ino: u64) -> SyncResult<ChildCounts> {
    conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(e.selected), 0),
            COALESCE(SUM(CASE WHEN e.selected = (sv.entry_ino IS NOT NULL) THEN 1 ELSE 0 END), 0)
         FROM entries e
         LEFT JOIN spaces_view sv ON sv.entry_ino = e.inode
         WHERE e.parent_ino = ?1",
        params![parent_ino],
        |row| {
            Ok(ChildCounts {
                total: row.get(0)?,
                selected: row.get(1)?,
                stable: row.get(2)?,
            })
        },
    )
    .map_err(SyncError::storage)
}

pub fn status_counts(conn: &Connection) -> SyncResult<StatusCounts> {
    conn.query_row(
        "SELECT
            COALESCE(SUM(e.selected = 0 AND sv.entry_ino IS NULL), 0),
            COALESCE(SUM(e.selected = 1 AND sv.entry_ino IS NOT NULL), 0),
            COALESCE(SUM(e.selected = 1 AND sv.entry_ino IS NULL), 0),
            COALESCE(SUM(e.selected = 0 AND sv.entry_ino IS NOT NULL), 0)
         FROM entries e
         LEFT JOIN spaces_view sv ON sv.entry_ino = e.inode",
        [],
        |row| {
            Ok(StatusCounts {
                archived: row.get(0)?,
                synced: row.get(1)?,
                syncing: row.get(2)?,
                removing: row.get(3)?,
            })
        },
    )
    .map_err(SyncError::storage)
}
