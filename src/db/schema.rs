//! SQLite schema definitions and creation
//!
//! Defines the `leak` table that receives credential records and the
//! `ingest_info` key/value table holding run metadata.

use crate::error::StoreResult;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Name of the record table
pub const LEAK_TABLE: &str = "leak";

/// SQL to create the record table
/// Note: INTEGER PRIMARY KEY (without AUTOINCREMENT) is the rowid alias; keys
/// are still assigned in insertion order.
const CREATE_LEAK_TABLE: &str = r#"
CREATE TABLE leak (
    id INTEGER PRIMARY KEY,
    domain TEXT,
    user TEXT,
    password TEXT
)
"#;

/// SQL to create run metadata table
const CREATE_INGEST_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ingest_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// Insert statement, prepared once per connection and cached
pub const INSERT_RECORD: &str = "INSERT INTO leak (domain, user, password) VALUES (?1, ?2, ?3)";

/// Indexes for common post-load lookups
const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_leak_domain ON leak(domain)",
    "CREATE INDEX IF NOT EXISTS idx_leak_user ON leak(user)",
];

/// SQLite pragmas for bulk loading
const WRITE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -128000;     -- 128MB cache
PRAGMA temp_store = MEMORY;
PRAGMA mmap_size = 536870912;    -- 512MB mmap
PRAGMA wal_autocheckpoint = 10000;
"#;

/// SQLite pragmas applied once loading is done
const READ_PRAGMAS: &str = r#"
PRAGMA synchronous = FULL;
"#;

/// Apply write-optimized pragmas and create the metadata table
pub fn configure(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(WRITE_PRAGMAS)?;
    conn.execute(CREATE_INGEST_INFO_TABLE, [])?;
    Ok(())
}

/// Check whether the record table exists
pub fn leak_table_exists(conn: &Connection) -> StoreResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [LEAK_TABLE],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Create the record table if absent; returns true when it was created
pub fn ensure_leak_table(conn: &Connection) -> StoreResult<bool> {
    if leak_table_exists(conn)? {
        return Ok(false);
    }
    conn.execute(CREATE_LEAK_TABLE, [])?;
    Ok(true)
}

/// Create indexes (called after loading for better insert performance)
pub fn create_indexes(conn: &Connection) -> StoreResult<()> {
    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }
    Ok(())
}

/// Apply read-optimized settings
pub fn optimize_for_reads(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(READ_PRAGMAS)?;

    // Run ANALYZE to update statistics for query planner
    conn.execute("ANALYZE", [])?;

    Ok(())
}

/// Count stored records
pub fn count_records(conn: &Connection) -> StoreResult<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM leak", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// Store run metadata
pub fn set_ingest_info(conn: &Connection, key: &str, value: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO ingest_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get run metadata
pub fn get_ingest_info(conn: &Connection, key: &str) -> StoreResult<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM ingest_info WHERE key = ?1",
        [key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Metadata keys written for each run
pub mod keys {
    /// Archive path or directory root that was ingested
    pub const SOURCE: &str = "source";

    /// Timestamp when the run started (RFC 3339)
    pub const START_TIME: &str = "start_time";

    /// Timestamp when the run ended (RFC 3339)
    pub const END_TIME: &str = "end_time";

    /// Total duration in seconds
    pub const DURATION_SECS: &str = "duration_secs";

    /// Records committed during the run
    pub const RECORDS_COMMITTED: &str = "records_committed";

    /// Entries (files or archive members) processed
    pub const ENTRIES: &str = "entries";

    /// Entries that stopped early or could not be opened
    pub const FAILED_ENTRIES: &str = "failed_entries";

    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Loader version
    pub const LOADER_VERSION: &str = "loader_version";

    /// Run status: "running", "completed", "interrupted"
    pub const STATUS: &str = "status";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        configure(&conn).unwrap();
        conn
    }

    #[test]
    fn test_ensure_leak_table_once() {
        let conn = open();
        assert!(!leak_table_exists(&conn).unwrap());
        assert!(ensure_leak_table(&conn).unwrap());
        assert!(leak_table_exists(&conn).unwrap());
        assert!(!ensure_leak_table(&conn).unwrap());
    }

    #[test]
    fn test_surrogate_keys_follow_insert_order() {
        let conn = open();
        ensure_leak_table(&conn).unwrap();
        conn.execute(INSERT_RECORD, ["d1", "u1", "p1"]).unwrap();
        conn.execute(INSERT_RECORD, ["d2", "u2", "p2"]).unwrap();

        let ids: Vec<i64> = conn
            .prepare("SELECT id FROM leak ORDER BY user")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(count_records(&conn).unwrap(), 2);
    }

    #[test]
    fn test_ingest_info() {
        let conn = open();

        set_ingest_info(&conn, "test_key", "test_value").unwrap();
        let value = get_ingest_info(&conn, "test_key").unwrap();
        assert_eq!(value, Some("test_value".to_string()));

        set_ingest_info(&conn, "test_key", "new_value").unwrap();
        assert_eq!(
            get_ingest_info(&conn, "test_key").unwrap(),
            Some("new_value".to_string())
        );

        assert_eq!(get_ingest_info(&conn, "nonexistent").unwrap(), None);
    }

    #[test]
    fn test_create_indexes() {
        let conn = open();
        ensure_leak_table(&conn).unwrap();
        create_indexes(&conn).unwrap();
        optimize_for_reads(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name LIKE 'idx_leak_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }
}
