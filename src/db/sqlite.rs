//! SQLite credential store
//!
//! Transactions are driven with explicit `BEGIN`/`COMMIT`/`ROLLBACK`
//! statements rather than `rusqlite::Transaction`, because the writer keeps
//! a transaction open across many calls while owning the store by value.

use super::schema::{self, keys, INSERT_RECORD};
use super::CredentialStore;
use crate::error::{StoreError, StoreResult};
use crate::parser::Credential;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Credential store backed by a single SQLite connection
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
    in_transaction: bool,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            target: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        schema::configure(&conn)?;
        schema::set_ingest_info(&conn, keys::SCHEMA_VERSION, &schema::SCHEMA_VERSION.to_string())?;
        schema::set_ingest_info(&conn, keys::LOADER_VERSION, env!("CARGO_PKG_VERSION"))?;

        Ok(Self {
            conn,
            path,
            in_transaction: false,
        })
    }

    /// Database file path (None for in-memory)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Underlying connection, for queries outside the load path
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of committed records (plus those of an open transaction)
    pub fn count_records(&self) -> StoreResult<u64> {
        schema::count_records(&self.conn)
    }

    /// Whether a transaction is currently open
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

impl CredentialStore for SqliteStore {
    fn ensure_schema(&mut self) -> StoreResult<bool> {
        let created = schema::ensure_leak_table(&self.conn)?;
        if created {
            debug!("Created table {}", schema::LEAK_TABLE);
        }
        Ok(created)
    }

    fn begin(&mut self) -> StoreResult<()> {
        if self.in_transaction {
            return Err(StoreError::Transaction("transaction already open".into()));
        }
        self.conn.execute_batch("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn insert(&mut self, record: &Credential<'_>) -> StoreResult<()> {
        if !self.in_transaction {
            return Err(StoreError::Transaction("insert outside transaction".into()));
        }
        let mut stmt = self.conn.prepare_cached(INSERT_RECORD)?;
        stmt.execute(params![record.domain, record.user, record.secret])?;
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        if !self.in_transaction {
            return Err(StoreError::Transaction("no transaction to commit".into()));
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        // SQLite may already have rolled back on its own (e.g. SQLITE_FULL)
        self.in_transaction = false;
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn last_insert_id(&mut self) -> StoreResult<u64> {
        Ok(self.conn.last_insert_rowid().max(0) as u64)
    }

    fn record_run_info(&mut self, key: &str, value: &str) -> StoreResult<()> {
        schema::set_ingest_info(&self.conn, key, value)
    }

    fn finish(&mut self) -> StoreResult<()> {
        if self.in_transaction {
            self.rollback()?;
        }
        schema::create_indexes(&self.conn)?;
        schema::optimize_for_reads(&self.conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use tempfile::tempdir;

    fn store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert!(store.ensure_schema().unwrap());
        store
    }

    #[test]
    fn test_commit_persists() {
        let mut store = store();
        store.begin().unwrap();
        store.insert(&parse_line("alice@example.com;hunter2\n").unwrap()).unwrap();
        store.insert(&parse_line("bob:secret\r\n").unwrap()).unwrap();
        store.commit().unwrap();

        assert_eq!(store.count_records().unwrap(), 2);
        let (domain, user, password): (String, String, String) = store
            .connection()
            .query_row(
                "SELECT domain, user, password FROM leak WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(domain, "example.com");
        assert_eq!(user, "alice");
        assert_eq!(password, "hunter2");
        assert_eq!(store.last_insert_id().unwrap(), 2);
    }

    #[test]
    fn test_rollback_discards() {
        let mut store = store();
        store.begin().unwrap();
        store.insert(&parse_line("u;p").unwrap()).unwrap();
        store.rollback().unwrap();
        assert!(!store.in_transaction());
        assert_eq!(store.count_records().unwrap(), 0);

        // Rollback without a transaction is a no-op
        store.rollback().unwrap();
    }

    #[test]
    fn test_transaction_misuse() {
        let mut store = store();
        assert!(matches!(
            store.insert(&parse_line("u;p").unwrap()),
            Err(StoreError::Transaction(_))
        ));
        assert!(store.commit().is_err());
        store.begin().unwrap();
        assert!(store.begin().is_err());
        store.commit().unwrap();
    }

    #[test]
    fn test_reopen_keeps_schema_and_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("leak.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            assert!(store.ensure_schema().unwrap());
            store.begin().unwrap();
            store.insert(&parse_line("a@b;c").unwrap()).unwrap();
            store.commit().unwrap();
            store.record_run_info(keys::STATUS, "completed").unwrap();
            store.finish().unwrap();
        }

        let mut store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert!(!store.ensure_schema().unwrap());
        assert_eq!(store.count_records().unwrap(), 1);
        assert_eq!(
            schema::get_ingest_info(store.connection(), keys::STATUS).unwrap(),
            Some("completed".to_string())
        );
    }

    #[test]
    fn test_no_partitioning() {
        let store = store();
        assert!(!store.supports_partitioning());
    }
}
