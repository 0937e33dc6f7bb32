//! Error types for leak-loader
//!
//! This module defines the error hierarchy for the ingestion pipeline:
//! - Configuration and CLI errors (always fatal, raised before any work)
//! - Archive errors (fatal for the run)
//! - Directory source errors (logged and skipped per entry)
//! - Parse and store errors (stop the current stream only)
//!
//! Library code uses thiserror; the binary wraps everything in anyhow.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the leak-loader application
#[derive(Error, Debug)]
pub enum LeakError {
    /// Archive open/traversal errors
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Storage errors
    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while opening or walking a tar-based archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// File extension does not map to a known archive format
    #[error("Extension not recognized: '{extension}' ({path})")]
    UnrecognizedExtension { path: PathBuf, extension: String },

    /// Archive file could not be opened
    #[error("Failed to open archive '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Compression layer header is missing or invalid
    #[error("Invalid {format} stream in '{path}': {reason}")]
    Decompress {
        path: PathBuf,
        format: &'static str,
        reason: String,
    },

    /// Tar stream is corrupt or truncated
    #[error("Corrupt archive '{path}': {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Per-entry errors from the directory walker
#[derive(Error, Debug)]
pub enum SourceError {
    /// A file could not be opened (permissions, races)
    #[error("Cannot open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A directory could not be read
    #[error("Cannot walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

impl SourceError {
    /// Path associated with this error, if known
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            SourceError::Open { path, .. } => Some(path),
            SourceError::Walk(e) => e.path(),
        }
    }
}

/// Record parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// None of the recognized delimiters occurs in the line
    #[error("Separator not found in {line:?}")]
    NoSeparator { line: String },

    /// The line is not valid UTF-8; `line` shows it with the bad bytes replaced
    #[error("Invalid UTF-8 at byte {offset} in {line:?}")]
    InvalidEncoding { line: String, offset: usize },
}

/// Storage sink errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// MySQL error
    #[cfg(feature = "mysql")]
    #[error("MySQL error: {0}")]
    MySql(#[from] mysql::Error),

    /// Failed to open or create the database
    #[error("Failed to open database '{target}': {reason}")]
    OpenFailed { target: String, reason: String },

    /// Transaction lifecycle misuse or failure
    #[error("Transaction failed: {0}")]
    Transaction(String),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Neither an archive nor a directory was given
    #[error("Please use -T or -D flag")]
    MissingInput,

    /// Both an archive and a directory were given
    #[error("Flags -T and -D are mutually exclusive")]
    ConflictingInputs,

    /// Connection parameter absent from both flags and environment
    #[error("Parameter or environment variable was not passed: {flag} / {env}")]
    MissingParameter {
        flag: &'static str,
        env: &'static str,
    },

    /// Invalid batch size
    #[error("Invalid batch size {size}: must be at least {min}")]
    InvalidBatchSize { size: usize, min: usize },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Archive path has an unknown extension
    #[error("Extension not recognized: '{extension}' ({path})")]
    UnrecognizedExtension { path: PathBuf, extension: String },

    /// Input path does not exist or has the wrong kind
    #[error("Invalid input path '{path}': {reason}")]
    InvalidInputPath { path: PathBuf, reason: String },

    /// Backend not compiled into this binary
    #[error("Backend '{0}' is not available in this build (enable the '{0}' feature)")]
    BackendUnavailable(&'static str),
}

/// Why a single stream (archive entry or file) stopped early
#[derive(Error, Debug)]
pub enum StreamError {
    /// A line had no recognized delimiter or was not UTF-8
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The store rejected begin/insert/commit
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reading or decompressing the stream failed
    #[error("Read failed: {0}")]
    Read(#[from] io::Error),

    /// Shutdown was requested mid-stream
    #[error("Interrupted")]
    Interrupted,
}

/// A stream that stopped early, with what survived of it
#[derive(Error, Debug)]
#[error("{error} ({committed} records committed, {discarded} rolled back)")]
pub struct StreamFailure {
    /// Cause of the failure
    #[source]
    pub error: StreamError,

    /// Records from this stream committed before the failure (durable)
    pub committed: u64,

    /// Records of the open transaction that were rolled back
    pub discarded: u64,
}

impl StreamFailure {
    /// True when the stream stopped because of a shutdown request
    pub fn is_interrupted(&self) -> bool {
        matches!(self.error, StreamError::Interrupted)
    }
}

/// Result type alias for LeakError
pub type Result<T> = std::result::Result<T, LeakError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Represents the outcome of ingesting a single stream
#[derive(Debug)]
pub enum StreamOutcome {
    /// Every line was stored
    Completed {
        name: String,
        records: u64,
        batches: u64,
    },

    /// Stopped early; earlier batches remain committed
    Failed { name: String, failure: StreamFailure },
}

impl StreamOutcome {
    /// Returns true if this outcome represents success
    pub fn is_success(&self) -> bool {
        matches!(self, StreamOutcome::Completed { .. })
    }

    /// Returns the entry name associated with this outcome
    pub fn name(&self) -> &str {
        match self {
            StreamOutcome::Completed { name, .. } => name,
            StreamOutcome::Failed { name, .. } => name,
        }
    }

    /// Records durably committed from this stream
    pub fn committed(&self) -> u64 {
        match self {
            StreamOutcome::Completed { records, .. } => *records,
            StreamOutcome::Failed { failure, .. } => failure.committed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let cfg = ConfigError::MissingInput;
        let top: LeakError = cfg.into();
        assert!(matches!(top, LeakError::Config(_)));

        let parse = ParseError::NoSeparator {
            line: "nodupe".into(),
        };
        let stream: StreamError = parse.into();
        assert!(matches!(stream, StreamError::Parse(_)));
    }

    #[test]
    fn test_parse_error_names_line() {
        let err = ParseError::NoSeparator {
            line: "nodupe\n".into(),
        };
        assert_eq!(err.to_string(), r#"Separator not found in "nodupe\n""#);
    }

    #[test]
    fn test_invalid_encoding_names_offset() {
        let err = ParseError::InvalidEncoding {
            line: "j\u{FFFD}r;pw\n".into(),
            offset: 1,
        };
        assert!(err.to_string().starts_with("Invalid UTF-8 at byte 1 in \"j"));
        let stream: StreamError = err.into();
        assert!(matches!(stream, StreamError::Parse(_)));
    }

    #[test]
    fn test_stream_failure_display() {
        let failure = StreamFailure {
            error: StreamError::Interrupted,
            committed: 10,
            discarded: 3,
        };
        assert!(failure.is_interrupted());
        assert_eq!(
            failure.to_string(),
            "Interrupted (10 records committed, 3 rolled back)"
        );
    }

    #[test]
    fn test_stream_outcome_accessors() {
        let ok = StreamOutcome::Completed {
            name: "a.txt".into(),
            records: 5,
            batches: 1,
        };
        assert!(ok.is_success());
        assert_eq!(ok.name(), "a.txt");
        assert_eq!(ok.committed(), 5);

        let failed = StreamOutcome::Failed {
            name: "b.txt".into(),
            failure: StreamFailure {
                error: StreamError::Interrupted,
                committed: 2,
                discarded: 1,
            },
        };
        assert!(!failed.is_success());
        assert_eq!(failed.committed(), 2);
    }
}
