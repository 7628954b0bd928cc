//! SQLite-backed [`LogStore`] and [`FilterSource`] (§6 reference
//! implementation). A single `Mutex<Connection>` serializes writers, mirroring
//! how the teacher's own storage layer wraps a single rusqlite connection
//! rather than pooling connections for a workload this size.

use crate::store::{FilterSource, LogStore, PhraseCount, QueryLogRecord, StoreError};
use crate::Phrase;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed store for durable phrase counts, the raw query log, and the
/// filter blocklist.
pub struct SqliteLogStore {
    conn: Mutex<Connection>,
}

impl SqliteLogStore {
    /// Open (creating if needed) the database at `path`, applying any
    /// pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        super::migrations::apply(&conn)?;
        Ok(SqliteLogStore { conn: Mutex::new(conn) })
    }

    /// Open a transient in-memory database. Used by tests and by callers
    /// that don't need the log to survive a restart.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        super::migrations::apply(&conn)?;
        Ok(SqliteLogStore { conn: Mutex::new(conn) })
    }

    /// Open at the platform's default data directory for this application.
    pub fn open_default() -> Result<Self, StoreError> {
        let dirs = directories::ProjectDirs::from("", "", "suggest-daemon").ok_or_else(|| {
            StoreError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no home directory for this platform"))
        })?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        Self::open(data_dir.join("suggest.db"))
    }
}

impl LogStore for SqliteLogStore {
    fn apply_batch(&self, deltas: &[(Phrase, i64)], log: &[QueryLogRecord]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let tx = conn.transaction()?;
        {
            let mut upsert = tx.prepare_cached(
                "INSERT INTO phrase_counts (phrase, count) VALUES (?1, ?2)
                 ON CONFLICT(phrase) DO UPDATE SET count = count + excluded.count",
            )?;
            for (phrase, delta) in deltas {
                upsert.execute(params![phrase.as_str(), delta])?;
            }
        }
        {
            let mut insert_log = tx.prepare_cached(
                "INSERT INTO query_log (user_id, session_id, phrase, occurred_at) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for record in log {
                insert_log.execute(params![
                    record.user_id,
                    record.session_id,
                    record.phrase.as_str(),
                    record.occurred_at.to_rfc3339()
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_all_counts(&self, limit: u64) -> Result<Vec<PhraseCount>, StoreError> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT phrase, count FROM phrase_counts WHERE count > 0 ORDER BY count DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let phrase: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((phrase, count))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (phrase, count) = row?;
            out.push(PhraseCount {
                phrase: Phrase::normalize_lookup(&phrase),
                count: count.max(0) as u64,
            });
        }
        Ok(out)
    }

    fn phrase_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM phrase_counts WHERE count > 0", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn count_of(&self, phrase: &Phrase) -> Result<u64, StoreError> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let count: Option<i64> = conn
            .query_row(
                "SELECT count FROM phrase_counts WHERE phrase = ?1",
                params![phrase.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }
}

impl FilterSource for SqliteLogStore {
    fn load_all(&self) -> Result<HashSet<Phrase>, StoreError> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut stmt = conn.prepare("SELECT phrase FROM filter_blocklist")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for row in rows {
            out.insert(Phrase::normalize_lookup(&row?));
        }
        Ok(out)
    }

    fn add(&self, phrase: &Phrase) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO filter_blocklist (phrase) VALUES (?1)",
            params![phrase.as_str()],
        )?;
        Ok(())
    }

    fn remove(&self, phrase: &Phrase) -> Result<bool, StoreError> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let changed = conn.execute("DELETE FROM filter_blocklist WHERE phrase = ?1", params![phrase.as_str()])?;
        Ok(changed > 0)
    }
}
