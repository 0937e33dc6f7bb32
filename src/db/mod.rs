//! Storage sinks and the batched transactional writer
//!
//! The relational engine sits behind [`CredentialStore`], a deliberately small
//! interface: begin, insert, commit, rollback, plus a schema check and an
//! optional partition-maintenance capability. [`BatchWriter`] drives it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │            InputEntry lines (one stream)            │
//! └─────────────────────────┬───────────────────────────┘
//!                           │ io::Result<String>
//!                           ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                    BatchWriter                      │
//! │  Idle ──first line──► Open{pending}                 │
//! │  Open ──pending == max──► commit ──► Idle           │
//! │  any error ──► rollback, stream stops               │
//! └─────────────────────────┬───────────────────────────┘
//!                           │ CredentialStore
//!                           ▼
//! ┌─────────────────────────────────────────────────────┐
//! │   SqliteStore (default)  /  MySqlStore (feature)    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Performance
//!
//! SQLite in WAL mode with one prepared insert per record and commits every
//! 1M records sustains well over 100K inserts/second on local disk.

#[cfg(feature = "mysql")]
pub mod mysql;
pub mod schema;
pub mod sqlite;
pub mod writer;

#[cfg(feature = "mysql")]
pub use self::mysql::MySqlStore;
pub use schema::keys;
pub use sqlite::SqliteStore;
pub use writer::{BatchConfig, BatchSummary, BatchWriter, WriterStats, MAX_RECORDS_PER_COMMIT};

use crate::error::StoreResult;
use crate::parser::Credential;

/// Key range a new storage partition should cover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionBoundary {
    /// Last surrogate key assigned before the batch (inclusive lower bound)
    pub lower: u64,

    /// Exclusive upper bound
    pub upper: u64,
}

impl PartitionBoundary {
    /// Partition covering the next `span` keys after `watermark`
    pub fn after(watermark: u64, span: u64) -> Self {
        Self {
            lower: watermark,
            upper: watermark.saturating_add(span),
        }
    }

    /// Partition name, derived from the lower bound
    pub fn name(&self) -> String {
        format!("p{}", self.lower)
    }
}

/// Transactional sink for credential records
///
/// Implementations hold a single connection; the writer owns the store
/// exclusively, so no other statement can interleave with an open
/// transaction.
pub trait CredentialStore {
    /// Create the `leak` table if absent; returns true when it was created
    fn ensure_schema(&mut self) -> StoreResult<bool>;

    /// Start a write transaction
    fn begin(&mut self) -> StoreResult<()>;

    /// Insert one record into the open transaction
    fn insert(&mut self, record: &Credential<'_>) -> StoreResult<()>;

    /// Commit the open transaction
    fn commit(&mut self) -> StoreResult<()>;

    /// Roll back the open transaction
    fn rollback(&mut self) -> StoreResult<()>;

    /// Whether [`CredentialStore::add_partition`] does anything
    fn supports_partitioning(&self) -> bool {
        false
    }

    /// Last surrogate key assigned by the store
    fn last_insert_id(&mut self) -> StoreResult<u64> {
        Ok(0)
    }

    /// Declare a new range partition
    fn add_partition(&mut self, _boundary: &PartitionBoundary) -> StoreResult<()> {
        Ok(())
    }

    /// Persist a run metadata value (source, timestamps, counters)
    fn record_run_info(&mut self, _key: &str, _value: &str) -> StoreResult<()> {
        Ok(())
    }

    /// Post-ingestion housekeeping (indexes, statistics)
    fn finish(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for Box<S> {
    fn ensure_schema(&mut self) -> StoreResult<bool> {
        (**self).ensure_schema()
    }

    fn begin(&mut self) -> StoreResult<()> {
        (**self).begin()
    }

    fn insert(&mut self, record: &Credential<'_>) -> StoreResult<()> {
        (**self).insert(record)
    }

    fn commit(&mut self) -> StoreResult<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> StoreResult<()> {
        (**self).rollback()
    }

    fn supports_partitioning(&self) -> bool {
        (**self).supports_partitioning()
    }

    fn last_insert_id(&mut self) -> StoreResult<u64> {
        (**self).last_insert_id()
    }

    fn add_partition(&mut self, boundary: &PartitionBoundary) -> StoreResult<()> {
        (**self).add_partition(boundary)
    }

    fn record_run_info(&mut self, key: &str, value: &str) -> StoreResult<()> {
        (**self).record_run_info(key, value)
    }

    fn finish(&mut self) -> StoreResult<()> {
        (**self).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_boundary() {
        let b = PartitionBoundary::after(42, 1_000_000);
        assert_eq!(b.lower, 42);
        assert_eq!(b.upper, 1_000_042);
        assert_eq!(b.name(), "p42");

        let edge = PartitionBoundary::after(u64::MAX - 1, 10);
        assert_eq!(edge.upper, u64::MAX);
    }
}
