//! Schema migrations for [`super::sqlite::SqliteLogStore`], applied in
//! order and tracked via `PRAGMA user_version`.

use crate::store::StoreError;
use rusqlite::Connection;

const MIGRATIONS: &[&str] = &[r#"
CREATE TABLE phrase_counts (
    phrase TEXT PRIMARY KEY,
    count  INTEGER NOT NULL
);

CREATE TABLE query_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     TEXT,
    session_id  TEXT,
    phrase      TEXT NOT NULL,
    occurred_at TEXT NOT NULL
);
CREATE INDEX query_log_occurred_at_idx ON query_log (occurred_at);

CREATE TABLE filter_blocklist (
    phrase TEXT PRIMARY KEY
);
"#];

pub fn apply(conn: &Connection) -> Result<(), StoreError> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let current = current.max(0) as usize;

    for (i, migration) in MIGRATIONS.iter().enumerate().skip(current) {
        conn.execute_batch(migration)
            .map_err(|e| StoreError::Migration(format!("migration {}: {e}", i + 1)))?;
        conn.pragma_update(None, "user_version", (i + 1) as i64)?;
    }
    Ok(())
}
