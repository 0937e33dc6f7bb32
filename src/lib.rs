//! leak-loader - Bulk Loader for Leaked Credential Dumps
//!
//! A tool for loading large corpora of credential dumps, delivered as
//! compressed tar archives or plain directory trees, into a relational
//! database. Designed to stream billions of lines with bounded memory.
//!
//! # Features
//!
//! - **Transparent Decompression**: `.tar`, `.tar.gz` and `.tar.xz` archives
//!   are read as a single stream, member by member, without extraction.
//!
//! - **Tolerant Parsing**: lines are split on the first of `;` `,` `:` `|`
//!   that occurs; `user@domain` identities are split on `@`.
//!
//! - **Batched Transactions**: records are committed every million inserts
//!   (configurable), bounding both memory and lock duration.
//!
//! - **Failure Isolation**: a malformed line rolls back only the open batch
//!   of its own file; earlier batches and other files are kept.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │  dump.tar / .gz / .xz    │      │      dumps/ (walkdir)    │
//! │  ArchiveReader           │      │      DirectoryWalker     │
//! └────────────┬─────────────┘      └────────────┬─────────────┘
//!              │  InputEntry (name + bytes)      │
//!              └───────────────┬─────────────────┘
//!                              ▼
//!               ┌──────────────────────────────┐
//!               │  Ingestor                    │
//!               │  - one entry at a time       │
//!               │  - per-entry failure policy  │
//!               └──────────────┬───────────────┘
//!                              │ lines
//!                              ▼
//!               ┌──────────────────────────────┐
//!               │  BatchWriter                 │
//!               │  - parse_line per line       │
//!               │  - commit every N records    │
//!               │  - optional partition hook   │
//!               └──────────────┬───────────────┘
//!                              │ CredentialStore
//!                              ▼
//!                    ┌──────────────────┐
//!                    │  SQLite / MySQL  │
//!                    │  (leak table)    │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Load an archive
//! leak-loader -T dump.tar.xz -d leaks.db
//!
//! # Load a directory with smaller batches
//! leak-loader -D ./dumps -d leaks.db -b 100000
//!
//! # Query results
//! sqlite3 leaks.db "SELECT user, password FROM leak WHERE domain = 'example.com'"
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod parser;
pub mod progress;
pub mod source;

pub use config::{Backend, CliArgs, ConnectionParams, IngestConfig, InputSource};
pub use db::{BatchConfig, BatchWriter, CredentialStore, SqliteStore};
pub use error::{LeakError, Result};
pub use ingest::{IngestSummary, Ingestor};
pub use parser::{parse_line, Credential};
