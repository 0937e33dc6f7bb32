//! Batched transactional writer
//!
//! Consumes the lines of one stream, parses each into a [`Credential`] and
//! inserts it inside a transaction that is committed every
//! `max_records` records and at end-of-stream.
//!
//! # Batch lifecycle
//!
//! ```text
//!            first line                 pending == max
//!   Idle ─────────────────► Open{0} ──► ... ──► commit ──► Idle
//!    ▲   (partition hook,                                   │
//!    │    then BEGIN)                                       │ next line
//!    └───────────────────────────────────────────────────────┘
//!
//!   end of stream: Open{n} ──► commit
//!   any failure:   Open{n} ──► rollback, stream stops
//! ```
//!
//! A transaction never holds more than `max_records` records, and a batch is
//! either fully committed or fully rolled back.

use super::{CredentialStore, PartitionBoundary};
use crate::error::{StreamError, StreamFailure};
use crate::parser::parse_line;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of records per commit
pub const MAX_RECORDS_PER_COMMIT: usize = 1_000_000;

/// Batching policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Records per transaction
    pub max_records: usize,

    /// Declare a storage partition before each batch (if the store can)
    pub partition: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_records: MAX_RECORDS_PER_COMMIT,
            partition: false,
        }
    }
}

/// Statistics about write operations
#[derive(Debug, Default)]
pub struct WriterStats {
    /// Lines pulled from streams
    pub lines_read: AtomicU64,

    /// Records in committed transactions
    pub records_committed: AtomicU64,

    /// Total batches committed
    pub batches_committed: AtomicU64,

    /// Records discarded by rollbacks
    pub records_rolled_back: AtomicU64,

    /// Partition boundaries declared
    pub partitions_declared: AtomicU64,
}

impl WriterStats {
    /// Records committed so far
    pub fn records_committed(&self) -> u64 {
        self.records_committed.load(Ordering::Relaxed)
    }

    /// Batches committed so far
    pub fn batches_committed(&self) -> u64 {
        self.batches_committed.load(Ordering::Relaxed)
    }

    /// Records rolled back so far
    pub fn records_rolled_back(&self) -> u64 {
        self.records_rolled_back.load(Ordering::Relaxed)
    }

    /// Lines read so far
    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::Relaxed)
    }
}

/// Result of a fully ingested stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Records committed from the stream
    pub records: u64,

    /// Commits issued for the stream
    pub batches: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchState {
    /// No transaction open
    Idle,
    /// Transaction open holding `pending` uncommitted records
    Open { pending: usize },
}

/// Writer that owns a store and batches inserts into transactions
pub struct BatchWriter<S: CredentialStore> {
    store: S,
    config: BatchConfig,
    state: BatchState,
    stats: Arc<WriterStats>,
    shutdown: Option<Arc<AtomicBool>>,
    partition_warned: bool,
}

impl<S: CredentialStore> BatchWriter<S> {
    /// Create a writer over `store`
    ///
    /// A `max_records` of zero is treated as one.
    pub fn new(store: S, mut config: BatchConfig) -> Self {
        config.max_records = config.max_records.max(1);
        Self {
            store,
            config,
            state: BatchState::Idle,
            stats: Arc::new(WriterStats::default()),
            shutdown: None,
            partition_warned: false,
        }
    }

    /// Stop streams early once `flag` is set
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    /// Shared statistics handle
    pub fn stats(&self) -> Arc<WriterStats> {
        Arc::clone(&self.stats)
    }

    /// Batching policy in effect
    pub fn config(&self) -> BatchConfig {
        self.config
    }

    /// Borrow the store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutably borrow the store (only valid between streams)
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Give the store back
    pub fn into_store(self) -> S {
        self.store
    }

    /// Ingest one stream of raw lines
    ///
    /// On success every line is committed. On failure the open transaction is
    /// rolled back, the remaining lines are not read, and the returned
    /// [`StreamFailure`] tells how many records of this stream were already
    /// committed by earlier batches.
    ///
    /// Lines may carry any error convertible into [`StreamError`]: plain
    /// `io::Error` for raw readers, or `StreamError` itself from
    /// [`crate::source::EntryLines`].
    pub fn ingest<I, E>(&mut self, lines: I) -> Result<BatchSummary, StreamFailure>
    where
        I: IntoIterator<Item = Result<String, E>>,
        StreamError: From<E>,
    {
        let mut summary = BatchSummary::default();

        for line in lines {
            if self.is_shutdown() {
                return Err(self.abort(StreamError::Interrupted, &summary));
            }

            let line = match line {
                Ok(line) => line,
                Err(e) => return Err(self.abort(e.into(), &summary)),
            };
            self.stats.lines_read.fetch_add(1, Ordering::Relaxed);

            if let Err(e) = self.push(&line, &mut summary) {
                return Err(self.abort(e, &summary));
            }
        }

        if let BatchState::Open { pending } = self.state {
            if let Err(e) = self.commit(pending, &mut summary) {
                return Err(self.abort(e.into(), &summary));
            }
        }

        Ok(summary)
    }

    /// Handle one line: open a batch if needed, insert, commit at the limit
    fn push(&mut self, line: &str, summary: &mut BatchSummary) -> Result<(), StreamError> {
        let pending = match self.state {
            BatchState::Open { pending } => pending,
            BatchState::Idle => self.open_batch()?,
        };

        let record = parse_line(line)?;
        self.store.insert(&record)?;

        let pending = pending + 1;
        self.state = BatchState::Open { pending };

        if pending == self.config.max_records {
            self.commit(pending, summary)?;
        }

        Ok(())
    }

    /// Idle -> Open; returns the pending count of the new batch
    fn open_batch(&mut self) -> Result<usize, StreamError> {
        if self.config.partition {
            self.maintain_partitions();
        }
        self.store.begin()?;
        self.state = BatchState::Open { pending: 0 };
        Ok(0)
    }

    /// Open -> Idle via commit
    fn commit(
        &mut self,
        pending: usize,
        summary: &mut BatchSummary,
    ) -> Result<(), crate::error::StoreError> {
        self.store.commit()?;
        self.state = BatchState::Idle;

        summary.records += pending as u64;
        summary.batches += 1;
        self.stats
            .records_committed
            .fetch_add(pending as u64, Ordering::Relaxed);
        self.stats.batches_committed.fetch_add(1, Ordering::Relaxed);
        debug!(records = pending, "Committed batch");
        Ok(())
    }

    /// Roll back whatever is open and build the failure report
    fn abort(&mut self, error: StreamError, summary: &BatchSummary) -> StreamFailure {
        let discarded = match self.state {
            BatchState::Open { pending } => {
                if let Err(e) = self.store.rollback() {
                    warn!("Rollback failed: {}", e);
                }
                pending as u64
            }
            BatchState::Idle => 0,
        };
        self.state = BatchState::Idle;
        self.stats
            .records_rolled_back
            .fetch_add(discarded, Ordering::Relaxed);

        StreamFailure {
            error,
            committed: summary.records,
            discarded,
        }
    }

    /// Declare the partition the next batch will fill; failures are not fatal
    fn maintain_partitions(&mut self) {
        if !self.store.supports_partitioning() {
            if !self.partition_warned {
                warn!("Store does not support partitioning; --partition ignored");
                self.partition_warned = true;
            }
            return;
        }

        let result = self.store.last_insert_id().and_then(|watermark| {
            let boundary = PartitionBoundary::after(watermark, self.config.max_records as u64);
            self.store.add_partition(&boundary).map(|()| boundary)
        });

        match result {
            Ok(boundary) => {
                self.stats.partitions_declared.fetch_add(1, Ordering::Relaxed);
                debug!(
                    lower = boundary.lower,
                    upper = boundary.upper,
                    "Declared partition {}",
                    boundary.name()
                );
            }
            Err(e) => warn!("Partition maintenance failed: {}", e),
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
