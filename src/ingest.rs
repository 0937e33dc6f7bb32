//! Ingestion driver
//!
//! Feeds the entries of an archive or a directory tree, one at a time and in
//! enumeration order, into a [`BatchWriter`]. A stream that fails is rolled
//! back and logged, and ingestion moves on to the next entry. Only archive
//! open/traversal errors abort the run.

use crate::config::InputSource;
use crate::db::{BatchConfig, BatchWriter, CredentialStore, WriterStats};
use crate::error::{Result, StreamOutcome};
use crate::source::{ArchiveReader, DirectoryWalker, InputEntry};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Interval between progress callbacks
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Per-entry counters
#[derive(Debug, Default)]
pub struct IngestStats {
    /// Entries whose stream was fed to the writer
    pub entries_processed: AtomicU64,

    /// Entries whose stream stopped early
    pub entries_failed: AtomicU64,

    /// Entries that could not be opened
    pub entries_skipped: AtomicU64,

    /// Raw bytes of the lines read
    pub bytes_read: AtomicU64,
}

/// Point-in-time view of a running ingestion
#[derive(Debug, Clone, Default)]
pub struct IngestProgress {
    pub entries: u64,
    pub failed_entries: u64,
    pub skipped_entries: u64,
    pub lines: u64,
    pub records: u64,
    pub batches: u64,
    pub rolled_back: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl IngestProgress {
    fn capture(stats: &IngestStats, writer: &WriterStats, elapsed: Duration) -> Self {
        Self {
            entries: stats.entries_processed.load(Ordering::Relaxed),
            failed_entries: stats.entries_failed.load(Ordering::Relaxed),
            skipped_entries: stats.entries_skipped.load(Ordering::Relaxed),
            lines: writer.lines_read(),
            records: writer.records_committed(),
            batches: writer.batches_committed(),
            rolled_back: writer.records_rolled_back(),
            bytes: stats.bytes_read.load(Ordering::Relaxed),
            elapsed,
        }
    }

    /// Committed records per second
    pub fn records_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.records as f64 / secs
        } else {
            0.0
        }
    }
}

/// An entry that stopped early or was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEntry {
    pub name: String,
    pub reason: String,
}

/// Result of one ingestion run
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub entries: u64,
    pub failed_entries: u64,
    pub skipped_entries: u64,
    pub lines: u64,
    pub records: u64,
    pub batches: u64,
    pub rolled_back: u64,
    pub bytes: u64,
    pub duration: Duration,

    /// False when the run was interrupted
    pub completed: bool,

    /// Failed and skipped entries, in the order they were met
    pub failures: Vec<FailedEntry>,
}

impl IngestSummary {
    fn between(
        before: &IngestProgress,
        after: &IngestProgress,
        completed: bool,
        failures: Vec<FailedEntry>,
    ) -> Self {
        Self {
            entries: after.entries - before.entries,
            failed_entries: after.failed_entries - before.failed_entries,
            skipped_entries: after.skipped_entries - before.skipped_entries,
            lines: after.lines - before.lines,
            records: after.records - before.records,
            batches: after.batches - before.batches,
            rolled_back: after.rolled_back - before.rolled_back,
            bytes: after.bytes - before.bytes,
            duration: after.elapsed,
            completed,
            failures,
        }
    }

    /// True when every entry was fully ingested
    pub fn is_clean(&self) -> bool {
        self.completed && self.failed_entries == 0 && self.skipped_entries == 0
    }
}

/// Drives input sources into a store
pub struct Ingestor<S: CredentialStore> {
    writer: BatchWriter<S>,
    stats: Arc<IngestStats>,
    shutdown: Arc<AtomicBool>,
    failures: Vec<FailedEntry>,
}

impl<S: CredentialStore> Ingestor<S> {
    pub fn new(store: S, config: BatchConfig) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let writer = BatchWriter::new(store, config).with_shutdown(Arc::clone(&shutdown));
        Self {
            writer,
            stats: Arc::new(IngestStats::default()),
            shutdown,
            failures: Vec::new(),
        }
    }

    /// Flag that stops ingestion after the current line when set
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    pub fn writer_stats(&self) -> Arc<WriterStats> {
        self.writer.stats()
    }

    /// Current progress snapshot
    pub fn progress(&self, elapsed: Duration) -> IngestProgress {
        IngestProgress::capture(&self.stats, &self.writer.stats(), elapsed)
    }

    pub fn store(&self) -> &S {
        self.writer.store()
    }

    pub fn store_mut(&mut self) -> &mut S {
        self.writer.store_mut()
    }

    pub fn into_store(self) -> S {
        self.writer.into_store()
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Ingest whichever source was configured
    pub fn ingest_source(&mut self, source: &InputSource) -> Result<IngestSummary> {
        match source {
            InputSource::Archive(path) => self.ingest_archive(path),
            InputSource::Directory { root, exclude } => {
                let walker = DirectoryWalker::new(root).with_excludes(exclude.clone());
                self.ingest_directory(&walker)
            }
        }
    }

    /// Ingest every member of an archive
    ///
    /// Opening the archive or reading a member header is fatal; per-member
    /// stream failures are not.
    pub fn ingest_archive(&mut self, path: &Path) -> Result<IngestSummary> {
        let mut reader = ArchiveReader::open(path)?;
        info!("Ingesting {} archive {}", reader.format(), path.display());
        self.ingest_reader(&mut reader)
    }

    /// Ingest every member of an already opened archive
    pub fn ingest_reader(&mut self, reader: &mut ArchiveReader) -> Result<IngestSummary> {
        let start = Instant::now();
        let before = self.progress(Duration::ZERO);

        for entry in reader.entries()? {
            if self.is_shutdown() {
                break;
            }
            self.ingest_entry(entry?);
        }

        Ok(self.summarize(&before, start))
    }

    /// Ingest every regular file below the walker's root
    ///
    /// Files that cannot be opened are logged and skipped.
    pub fn ingest_directory(&mut self, walker: &DirectoryWalker) -> Result<IngestSummary> {
        let start = Instant::now();
        let before = self.progress(Duration::ZERO);
        info!("Ingesting directory {}", walker.root().display());

        for entry in walker.entries() {
            if self.is_shutdown() {
                break;
            }
            match entry {
                Ok(entry) => {
                    self.ingest_entry(entry);
                }
                Err(e) => {
                    let name = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| walker.root().display().to_string());
                    warn!("Skipping {}: {}", name, e);
                    self.stats.entries_skipped.fetch_add(1, Ordering::Relaxed);
                    self.failures.push(FailedEntry {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(self.summarize(&before, start))
    }

    /// Feed one entry to the writer
    pub fn ingest_entry(&mut self, entry: InputEntry<'_>) -> StreamOutcome {
        let (name, lines) = entry.into_lines();
        info!("Read {}", name);

        let bytes = Arc::clone(&self.stats);
        let lines = lines.inspect(move |line| {
            if let Ok(line) = line {
                bytes
                    .bytes_read
                    .fetch_add(line.len() as u64, Ordering::Relaxed);
            }
        });

        let result = self.writer.ingest(lines);
        self.stats.entries_processed.fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(summary) => {
                debug!(
                    records = summary.records,
                    batches = summary.batches,
                    "Finished {}",
                    name
                );
                StreamOutcome::Completed {
                    name,
                    records: summary.records,
                    batches: summary.batches,
                }
            }
            Err(failure) if failure.is_interrupted() => {
                info!("Interrupted while reading {}", name);
                StreamOutcome::Failed { name, failure }
            }
            Err(failure) => {
                warn!("Stopped reading {}: {}", name, failure);
                self.stats.entries_failed.fetch_add(1, Ordering::Relaxed);
                self.failures.push(FailedEntry {
                    name: name.clone(),
                    reason: failure.error.to_string(),
                });
                StreamOutcome::Failed { name, failure }
            }
        }
    }

    /// Ingest `source` while a background thread reports progress
    pub fn run_with_progress<F>(
        &mut self,
        source: &InputSource,
        progress_callback: F,
    ) -> Result<IngestSummary>
    where
        F: Fn(IngestProgress) + Send + 'static,
    {
        let start = Instant::now();
        let done = Arc::new(AtomicBool::new(false));
        let stats = Arc::clone(&self.stats);
        let writer_stats = self.writer.stats();

        let progress_handle = {
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    progress_callback(IngestProgress::capture(
                        &stats,
                        &writer_stats,
                        start.elapsed(),
                    ));
                    thread::sleep(PROGRESS_INTERVAL);
                }
            })
        };

        let result = self.ingest_source(source);

        done.store(true, Ordering::SeqCst);
        let _ = progress_handle.join();

        result
    }

    fn summarize(&mut self, before: &IngestProgress, start: Instant) -> IngestSummary {
        let after = self.progress(start.elapsed());
        let failures = std::mem::take(&mut self.failures);
        IngestSummary::between(before, &after, !self.is_shutdown(), failures)
    }
}
