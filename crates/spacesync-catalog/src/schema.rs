//! Schema bootstrap and versioned migrations.
//!
//! Fresh databases are created directly at the latest version. Databases at
//! an older version run named, idempotent migrations; constraint changes
//! SQLite cannot apply in place are performed by table copy under a short
//! transaction with foreign-key enforcement temporarily disabled.

use rusqlite::Connection;
use spacesync_core::{SyncError, SyncResult};

pub const SCHEMA_VERSION: i64 = 2;

/// Canonical latest schema for brand-new databases.
const LATEST_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS entries (\
        inode      INTEGER PRIMARY KEY,\
        parent_ino INTEGER NOT NULL DEFAULT 0,\
        name       TEXT NOT NULL,\
        type       TEXT NOT NULL,\
        size       INTEGER,\
        mtime      INTEGER NOT NULL,\
        selected   INTEGER NOT NULL DEFAULT 0,\
        UNIQUE(parent_ino, name)\
    );",
    "CREATE TABLE IF NOT EXISTS spaces_view (\
        entry_ino    INTEGER PRIMARY KEY REFERENCES entries(inode) ON DELETE CASCADE,\
        synced_mtime INTEGER NOT NULL,\
        checked_at   INTEGER NOT NULL\
    );",
    "CREATE TABLE IF NOT EXISTS meta (\
        key   TEXT PRIMARY KEY,\
        value TEXT NOT NULL\
    );",
    "CREATE INDEX IF NOT EXISTS idx_entries_parent ON entries(parent_ino);",
];

/// Create missing tables and run any pending migrations.
pub fn bootstrap(conn: &Connection) -> SyncResult<()> {
    match read_version(conn) {
        Some(version) if version < SCHEMA_VERSION => {
            tracing::info!(
                target: "spacesync.catalog",
                from = version,
                to = SCHEMA_VERSION,
                "upgrading catalog schema"
            );
            if version < 2 {
                migrate_v1_to_v2(conn)?;
                tracing::info!(target: "spacesync.catalog", "migrated catalog schema v1 -> v2");
            }
            Ok(())
        }
        Some(version) => {
            tracing::debug!(target: "spacesync.catalog", version, "catalog schema up to date");
            Ok(())
        }
        None => {
            // Fresh database: create everything at the latest version.
            for statement in LATEST_SCHEMA {
                conn.execute_batch(statement).map_err(SyncError::storage)?;
            }
            conn.execute(
                "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [SCHEMA_VERSION.to_string()],
            )
            .map_err(SyncError::storage)?;
            tracing::info!(
                target: "spacesync.catalog",
                version = SCHEMA_VERSION,
                "catalog schema created"
            );
            Ok(())
        }
    }
}

/// Current `schema_version` from the meta table.
pub fn current_version(conn: &Connection) -> SyncResult<i64> {
    read_version(conn).ok_or_else(|| SyncError::not_found("schema_version"))
}

fn read_version(conn: &Connection) -> Option<i64> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = 'schema_version'",
        [],
        |row| row.get::<_, String>(0),
    )
    .ok()
    .and_then(|value| value.parse().ok())
}

/// v1 carried no delete cascade from entries into spaces_view, and early
/// runs could leave duplicate inode rows. Rebuild both tables.
fn migrate_v1_to_v2(conn: &Connection) -> SyncResult<()> {
    conn.pragma_update(None, "foreign_keys", false)
        .map_err(SyncError::storage)?;

    let result = conn.execute_batch(
        "BEGIN IMMEDIATE;
         DELETE FROM entries WHERE rowid NOT IN (SELECT MIN(rowid) FROM entries GROUP BY inode);
         CREATE TABLE entries_new (
             inode      INTEGER PRIMARY KEY,
             parent_ino INTEGER NOT NULL DEFAULT 0,
             name       TEXT NOT NULL,
             type       TEXT NOT NULL,
             size       INTEGER,
             mtime      INTEGER NOT NULL,
             selected   INTEGER NOT NULL DEFAULT 0,
             UNIQUE(parent_ino, name)
         );
         INSERT INTO entries_new (inode, parent_ino, name, type, size, mtime, selected)
             SELECT inode, COALESCE(parent_ino, 0), name, type, size, mtime, selected FROM entries;
         DROP TABLE entries;
         ALTER TABLE entries_new RENAME TO entries;
         CREATE TABLE spaces_view_new (
             entry_ino    INTEGER PRIMARY KEY REFERENCES entries(inode) ON DELETE CASCADE,
             synced_mtime INTEGER NOT NULL,
             checked_at   INTEGER NOT NULL
         );
         INSERT INTO spaces_view_new
             SELECT sv.entry_ino, sv.synced_mtime, sv.checked_at FROM spaces_view sv
             WHERE EXISTS (SELECT 1 FROM entries e WHERE e.inode = sv.entry_ino);
         DROP TABLE spaces_view;
         ALTER TABLE spaces_view_new RENAME TO spaces_view;
         CREATE INDEX IF NOT EXISTS idx_entries_parent ON entries(parent_ino);
         UPDATE meta SET value = '2' WHERE key = 'schema_version';
         COMMIT;",
    );
    if result.is_err() {
        let _ = conn.execute_batch("ROLLBACK;");
    }

    let restore = conn.pragma_update(None, "foreign_keys", true);
    result.map_err(SyncError::storage)?;
    restore.map_err(SyncError::storage)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The original schema, without the delete cascade.
    const V1_SCHEMA: &str = "
        CREATE TABLE entries (
            inode      INTEGER PRIMARY KEY,
            parent_ino INTEGER NOT NULL DEFAULT 0,
            name       TEXT NOT NULL,
            type       TEXT NOT NULL,
            size       INTEGER,
            mtime      INTEGER NOT NULL,
            selected   INTEGER NOT NULL DEFAULT 0,
            UNIQUE(parent_ino, name)
        );
        CREATE TABLE spaces_view (
            entry_ino    INTEGER PRIMARY KEY REFERENCES entries(inode),
            synced_mtime INTEGER NOT NULL,
            checked_at   INTEGER NOT NULL
        );
        CREATE TABLE meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
        INSERT INTO meta (key, value) VALUES ('schema_version', '1');
    ";

    #[test]
    fn bootstrap_is_idempotent() {
        let conn = Connection::open_in_memory().expect("connection");
        bootstrap(&conn).expect("first bootstrap");
        bootstrap(&conn).expect("second bootstrap");
        bootstrap(&conn).expect("third bootstrap");
        assert_eq!(current_version(&conn).expect("version"), SCHEMA_VERSION);
    }

    #[test]
    fn fresh_database_lands_at_latest_version() {
        let conn = Connection::open_in_memory().expect("connection");
        bootstrap(&conn).expect("bootstrap");
        assert_eq!(current_version(&conn).expect("version"), SCHEMA_VERSION);
    }

    #[test]
    fn v1_database_migrates_and_gains_cascade() {
        let conn = Connection::open_in_memory().expect("connection");
        conn.execute_batch(V1_SCHEMA).expect("v1 schema");
        conn.execute_batch(
            "INSERT INTO entries (inode, parent_ino, name, type, mtime) VALUES (7, 0, 'a.txt', 'text', 10);
             INSERT INTO spaces_view (entry_ino, synced_mtime, checked_at) VALUES (7, 10, 10);",
        )
        .expect("v1 rows");

        bootstrap(&conn).expect("migration");
        assert_eq!(current_version(&conn).expect("version"), SCHEMA_VERSION);

        // Data survived.
        let name: String = conn
            .query_row("SELECT name FROM entries WHERE inode = 7", [], |r| r.get(0))
            .expect("entry survives migration");
        assert_eq!(name, "a.txt");

        // Cascade is now active.
        conn.pragma_update(None, "foreign_keys", true).expect("fk on");
        conn.execute("DELETE FROM entries WHERE inode = 7", [])
            .expect("delete entry");
        let views: i64 = conn
            .query_row("SELECT COUNT(*) FROM spaces_view", [], |r| r.get(0))
            .expect("count views");
        assert_eq!(views, 0, "spaces_view should cascade with entries");
    }

    #[test]
    fn migration_drops_orphaned_views() {
        let conn = Connection::open_in_memory().expect("connection");
        conn.execute_batch(V1_SCHEMA).expect("v1 schema");
        // A view with no matching entry (possible under v1's weaker checks).
        conn.execute_batch(
            "PRAGMA foreign_keys=OFF;
             INSERT INTO spaces_view (entry_ino, synced_mtime, checked_at) VALUES (99, 1, 1);",
        )
        .expect("orphan view");

        bootstrap(&conn).expect("migration");
        let views: i64 = conn
            .query_row("SELECT COUNT(*) FROM spaces_view", [], |r| r.get(0))
            .expect("count views");
        assert_eq!(views, 0);
    }
}
