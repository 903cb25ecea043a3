//! Entry and SpacesView persistence as free functions over a connection,
//! composable inside the [`crate::Catalog`] transaction helpers.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use spacesync_core::{Entry, EntryKind, SpacesView, SyncError, SyncResult};

fn map_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let kind_text: String = row.get(3)?;
    let kind = EntryKind::parse(&kind_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown entry kind {kind_text:?}").into(),
        )
    })?;
    Ok(Entry {
        inode: row.get(0)?,
        parent_ino: row.get(1)?,
        name: row.get(2)?,
        kind,
        size: row.get(4)?,
        mtime: row.get(5)?,
        selected: row.get(6)?,
    })
}

const ENTRY_COLUMNS: &str = "inode, parent_ino, name, type, size, mtime, selected";

/// Insert or update an entry keyed by `(parent_ino, name)`.
///
/// A stale row holding the same path under a different inode — the disk file
/// was replaced — is removed together with its subtree in one recursive
/// statement before the insert; spaces views cascade away with the rows.
/// Re-registering an existing inode refreshes everything except `selected`,
/// which records user intent and survives.
pub fn upsert_entry(conn: &Connection, e: &Entry) -> SyncResult<()> {
    tracing::debug!(
        target: "spacesync.catalog",
        inode = e.inode,
        parent_ino = e.parent_ino,
        name = %e.name,
        kind = %e.kind,
        selected = e.selected,
        "upsert entry"
    );

    conn.execute(
        "DELETE FROM entries WHERE inode IN (
            WITH RECURSIVE stale(ino) AS (
                SELECT inode FROM entries
                    WHERE parent_ino = ?1 AND name = ?2 AND inode <> ?3
                UNION ALL
                SELECT e.inode FROM entries e JOIN stale s ON e.parent_ino = s.ino
            )
            SELECT ino FROM stale
        )",
        params![e.parent_ino, e.name, e.inode],
    )
    .map_err(SyncError::storage)?;

    conn.execute(
        "INSERT INTO entries (inode, parent_ino, name, type, size, mtime, selected)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(inode) DO UPDATE SET
             parent_ino = excluded.parent_ino,
             name       = excluded.name,
             type       = excluded.type,
             size       = excluded.size,
             mtime      = excluded.mtime",
        params![
            e.inode,
            e.parent_ino,
            e.name,
            e.kind.as_str(),
            e.size,
            e.mtime,
            e.selected
        ],
    )
    .map_err(SyncError::storage)?;
    Ok(())
}

pub fn update_entry_name(conn: &Connection, inode: u64, name: &str) -> SyncResult<()> {
    tracing::debug!(target: "spacesync.catalog", inode, name, "update entry name");
    conn.execute(
        "UPDATE entries SET name = ?1 WHERE inode = ?2",
        params![name, inode],
    )
    .map_err(SyncError::storage)?;
    Ok(())
}

pub fn update_entry_mtime(
    conn: &Connection,
    inode: u64,
    mtime: i64,
    size: Option<i64>,
) -> SyncResult<()> {
    conn.execute(
        "UPDATE entries SET mtime = ?1, size = ?2 WHERE inode = ?3",
        params![mtime, size, inode],
    )
    .map_err(SyncError::storage)?;
    Ok(())
}

pub fn get_entry(conn: &Connection, inode: u64) -> SyncResult<Option<Entry>> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE inode = ?1"),
        params![inode],
        map_row,
    )
    .optional()
    .map_err(SyncError::storage)
}

pub fn get_entry_by_path(
    conn: &Connection,
    parent_ino: u64,
    name: &str,
) -> SyncResult<Option<Entry>> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE parent_ino = ?1 AND name = ?2"),
        params![parent_ino, name],
        map_row,
    )
    .optional()
    .map_err(SyncError::storage)
}

pub fn list_children(conn: &Connection, parent_ino: u64) -> SyncResult<Vec<Entry>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE parent_ino = ?1
             ORDER BY type = 'dir' DESC, name ASC"
        ))
        .map_err(SyncError::storage)?;
    let rows = stmt
        .query_map(params![parent_ino], map_row)
        .map_err(SyncError::storage)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(SyncError::storage)
}

pub fn delete_entry(conn: &Connection, inode: u64) -> SyncResult<()> {
    tracing::debug!(target: "spacesync.catalog", inode, "delete entry");
    conn.execute("DELETE FROM entries WHERE inode = ?1", params![inode])
        .map_err(SyncError::storage)?;
    Ok(())
}

/// Delete an entry and every descendant in one recursive statement.
pub fn delete_entry_recursive(conn: &Connection, inode: u64) -> SyncResult<()> {
    tracing::debug!(target: "spacesync.catalog", inode, "delete entry subtree");
    conn.execute(
        "DELETE FROM entries WHERE inode IN (
            WITH RECURSIVE subtree(ino) AS (
                SELECT inode FROM entries WHERE inode = ?1
                UNION ALL
                SELECT e.inode FROM entries e JOIN subtree s ON e.parent_ino = s.ino
            )
            SELECT ino FROM subtree
        )",
        params![inode],
    )
    .map_err(SyncError::storage)?;
    Ok(())
}

/// Set `selected` on one inode and all descendants reachable through
/// `parent_ino`.
pub fn set_selected_subtree(conn: &Connection, inode: u64, selected: bool) -> SyncResult<()> {
    tracing::debug!(target: "spacesync.catalog", inode, selected, "set selected subtree");
    conn.execute(
        "WITH RECURSIVE subtree(ino) AS (
            SELECT inode FROM entries WHERE inode = ?1
            UNION ALL
            SELECT e.inode FROM entries e JOIN subtree s ON e.parent_ino = s.ino
        )
        UPDATE entries SET selected = ?2 WHERE inode IN (SELECT ino FROM subtree)",
        params![inode, selected],
    )
    .map_err(SyncError::storage)?;
    Ok(())
}

pub fn upsert_spaces_view(conn: &Connection, view: &SpacesView) -> SyncResult<()> {
    tracing::debug!(
        target: "spacesync.catalog",
        entry_ino = view.entry_ino,
        synced_mtime = view.synced_mtime,
        "upsert spaces view"
    );
    conn.execute(
        "INSERT INTO spaces_view (entry_ino, synced_mtime, checked_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(entry_ino) DO UPDATE SET
             synced_mtime = excluded.synced_mtime,
             checked_at   = excluded.checked_at",
        params![view.entry_ino, view.synced_mtime, view.checked_at],
    )
    .map_err(SyncError::storage)?;
    Ok(())
}

pub fn get_spaces_view(conn: &Connection, entry_ino: u64) -> SyncResult<Option<SpacesView>> {
    conn.query_row(
        "SELECT entry_ino, synced_mtime, checked_at FROM spaces_view WHERE entry_ino = ?1",
        params![entry_ino],
        |row| {
            Ok(SpacesView {
                entry_ino: row.get(0)?,
                synced_mtime: row.get(1)?,
                checked_at: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(SyncError::storage)
}

pub fn delete_spaces_view(conn: &Connection, entry_ino: u64) -> SyncResult<()> {
    tracing::debug!(target: "spacesync.catalog", entry_ino, "delete spaces view");
    conn.execute(
        "DELETE FROM spaces_view WHERE entry_ino = ?1",
        params![entry_ino],
    )
    .map_err(SyncError::storage)?;
    Ok(())
}
