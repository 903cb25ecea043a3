use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::path::PathBuf;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use spacesync_core::{Entry, SpacesView, SyncError, SyncResult};

use crate::{aggregate, entry, schema};

/// Catalog open parameters. The busy timeout bounds lock waits so a reader
/// on a second connection never deadlocks the pipeline worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogConfig {
    pub db_path: PathBuf,
    pub wal_mode: bool,
    pub busy_timeout_ms: u64,
}

impl CatalogConfig {
    #[must_use]
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            db_path: PathBuf::from(":memory:"),
            // WAL is meaningless for in-memory databases.
            wal_mode: false,
            ..Self::default()
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("sync.db"),
            wal_mode: true,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Handle over one SQLite connection. Not `Sync`: each thread that needs
/// catalog access opens its own `Catalog`; WAL mode plus the busy timeout
/// make concurrent readers safe against the single pipeline writer.
pub struct Catalog {
    conn: Connection,
    config: CatalogConfig,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("path", &self.config.db_path)
            .field("wal_mode", &self.config.wal_mode)
            .field("busy_timeout_ms", &self.config.busy_timeout_ms)
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// Open (or create) the catalog, apply pragmas and bring the schema up
    /// to the latest version.
    pub fn open(config: CatalogConfig) -> SyncResult<Self> {
        tracing::debug!(
            target: "spacesync.catalog",
            path = %config.db_path.display(),
            wal_mode = config.wal_mode,
            busy_timeout_ms = config.busy_timeout_ms,
            "opening catalog"
        );

        let conn = Connection::open(&config.db_path).map_err(SyncError::storage)?;
        let catalog = Self { conn, config };
        catalog.apply_pragmas()?;
        schema::bootstrap(&catalog.conn)?;
        Ok(catalog)
    }

    pub fn open_in_memory() -> SyncResult<Self> {
        Self::open(CatalogConfig::in_memory())
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    #[must_use]
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    fn apply_pragmas(&self) -> SyncResult<()> {
        self.conn
            .pragma_update(None, "foreign_keys", true)
            .map_err(SyncError::storage)?;
        if self.config.wal_mode {
            // journal_mode returns the resulting mode as a row.
            let mode: String = self
                .conn
                .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
                .map_err(SyncError::storage)?;
            tracing::trace!(target: "spacesync.catalog", journal_mode = %mode, "journal mode applied");
        }
        self.conn
            .pragma_update(None, "busy_timeout", self.config.busy_timeout_ms)
            .map_err(SyncError::storage)?;
        Ok(())
    }

    /// Run a closure inside a deferred transaction. Commits on `Ok`, rolls
    /// back on `Err` and on panic (the panic is resumed after rollback).
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> SyncResult<T>,
    ) -> SyncResult<T> {
        self.transaction_with("BEGIN;", f)
    }

    /// Run a closure inside a `BEGIN IMMEDIATE` transaction, taking the
    /// write lock up front. Required for serialized read-then-write updates
    /// so deferred lock promotion cannot deadlock against a reader.
    pub fn immediate_transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> SyncResult<T>,
    ) -> SyncResult<T> {
        self.transaction_with("BEGIN IMMEDIATE;", f)
    }

    fn transaction_with<T>(
        &self,
        begin_sql: &str,
        f: impl FnOnce(&Connection) -> SyncResult<T>,
    ) -> SyncResult<T> {
        self.conn
            .execute_batch(begin_sql)
            .map_err(SyncError::storage)?;

        let outcome = catch_unwind(AssertUnwindSafe(|| f(&self.conn)));

        match outcome {
            Ok(Ok(value)) => {
                self.conn.execute_batch("COMMIT;").map_err(|commit_err| {
                    let _ = self.conn.execute_batch("ROLLBACK;");
                    SyncError::storage(commit_err)
                })?;
                Ok(value)
            }
            Ok(Err(err)) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
            Err(payload) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                resume_unwind(payload);
            }
        }
    }

    // ── Entry persistence ───────────────────────────────────────────────

    /// Insert or update an entry keyed by `(parent_ino, name)`.
    ///
    /// When the path already carries a different inode (file replaced on
    /// disk), the stale row and its whole subtree are deleted first; the
    /// spaces views cascade away with them.
    pub fn upsert_entry(&self, e: &Entry) -> SyncResult<()> {
        self.immediate_transaction(|conn| entry::upsert_entry(conn, e))
    }

    /// Rename an entry in place. `(parent_ino, name)` conflicts must have
    /// been resolved by the caller.
    pub fn update_entry_name(&self, inode: u64, name: &str) -> SyncResult<()> {
        entry::update_entry_name(&self.conn, inode, name)
    }

    /// Refresh mtime and size only.
    pub fn update_entry_mtime(&self, inode: u64, mtime: i64, size: Option<i64>) -> SyncResult<()> {
        entry::update_entry_mtime(&self.conn, inode, mtime, size)
    }

    pub fn get_entry(&self, inode: u64) -> SyncResult<Option<Entry>> {
        entry::get_entry(&self.conn, inode)
    }

    pub fn get_entry_by_path(&self, parent_ino: u64, name: &str) -> SyncResult<Option<Entry>> {
        entry::get_entry_by_path(&self.conn, parent_ino, name)
    }

    /// Direct children of a parent: directories first, then names ascending.
    pub fn list_children(&self, parent_ino: u64) -> SyncResult<Vec<Entry>> {
        entry::list_children(&self.conn, parent_ino)
    }

    pub fn delete_entry(&self, inode: u64) -> SyncResult<()> {
        entry::delete_entry(&self.conn, inode)
    }

    /// Delete an entry and every descendant reachable through `parent_ino`.
    pub fn delete_entry_recursive(&self, inode: u64) -> SyncResult<()> {
        self.immediate_transaction(|conn| entry::delete_entry_recursive(conn, inode))
    }

    /// Set `selected` on each given inode and all of its descendants, in one
    /// transaction.
    pub fn set_selected(&self, inodes: &[u64], selected: bool) -> SyncResult<()> {
        self.immediate_transaction(|conn| {
            for &inode in inodes {
                entry::set_selected_subtree(conn, inode, selected)?;
            }
            Ok(())
        })
    }

    // ── SpacesView persistence ──────────────────────────────────────────

    pub fn upsert_spaces_view(&self, view: &SpacesView) -> SyncResult<()> {
        entry::upsert_spaces_view(&self.conn, view)
    }

    pub fn get_spaces_view(&self, entry_ino: u64) -> SyncResult<Option<SpacesView>> {
        entry::get_spaces_view(&self.conn, entry_ino)
    }

    pub fn delete_spaces_view(&self, entry_ino: u64) -> SyncResult<()> {
        entry::delete_spaces_view(&self.conn, entry_ino)
    }

    // ── Aggregations ────────────────────────────────────────────────────

    /// Total byte size of all file entries.
    pub fn aggregate_total_size(&self) -> SyncResult<i64> {
        aggregate::total_size(&self.conn)
    }

    /// Total byte size of file entries whose mirror view exists.
    pub fn aggregate_synced_size(&self) -> SyncResult<i64> {
        aggregate::synced_size(&self.conn)
    }

    /// `(total, synced)` bytes over a subtree, excluding directories.
    pub fn dir_size(&self, inode: u64) -> SyncResult<aggregate::DirSize> {
        aggregate::dir_size(&self.conn, inode)
    }

    /// `(total, selected, stable)` over the direct children of a parent.
    pub fn child_counts(&self, parent_ino: u64) -> SyncResult<aggregate::ChildCounts> {
        aggregate::child_counts(&self.conn, parent_ino)
    }

    /// Per-label entry counts approximated from `selected × view-present`.
    pub fn status_counts(&self) -> SyncResult<aggregate::StatusCounts> {
        aggregate::status_counts(&self.conn)
    }
}
