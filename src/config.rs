//! Configuration types for leak-loader
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros, with environment fallback
//!   for the connection parameters
//! - Runtime configuration with validation

use crate::db::{BatchConfig, MAX_RECORDS_PER_COMMIT};
use crate::error::ConfigError;
use crate::source::ArchiveFormat;
use clap::Parser;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;

/// Smallest accepted batch size
const MIN_BATCH_SIZE: usize = 1;

/// Bulk loader for leaked credential dumps
#[derive(Parser, Debug, Clone)]
#[command(
    name = "leak-loader",
    version,
    about = "Load leaked credential dumps into a relational database",
    long_about = "Reads a tar archive (.tar, .tar.gz, .tar.xz) or a directory tree of dump \
                  files, splits each line into user, domain and password, and inserts the \
                  records in large transactions.",
    after_help = "EXAMPLES:\n    \
        leak-loader -T dump.tar.xz -d leaks.db\n    \
        leak-loader -D ./dumps --exclude '\\.md$' -d leaks.db -b 500000\n    \
        DBUSER=loader DBPASSWORD=... leak-loader --backend mysql -T dump.tar.gz -d leaks -H /run/mysqld/mysqld.sock -P"
)]
pub struct CliArgs {
    /// Archive to ingest (.tar, .gz, .xz)
    #[arg(short = 'T', long = "tarfile", value_name = "FILE")]
    pub tarfile: Option<PathBuf>,

    /// Directory to ingest recursively
    #[arg(short = 'D', long = "directory", value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Database name (file path for SQLite)
    #[arg(short = 'd', long = "db", env = "DATABASE", value_name = "NAME")]
    pub database: Option<String>,

    /// Database user
    #[arg(short = 'u', long = "user", env = "DBUSER", value_name = "USER")]
    pub user: Option<String>,

    /// Database password
    #[arg(
        short = 'W',
        long = "password",
        env = "DBPASSWORD",
        hide_env_values = true,
        value_name = "PASSWORD"
    )]
    pub password: Option<String>,

    /// Database host, or unix socket path when it starts with '/'
    #[arg(short = 'H', long = "host", env = "DBHOST", value_name = "HOST")]
    pub host: Option<String>,

    /// Declare a range partition before each batch
    #[arg(short = 'P', long)]
    pub partition: bool,

    /// Records per transaction
    #[arg(
        short = 'b',
        long,
        default_value_t = MAX_RECORDS_PER_COMMIT,
        value_name = "NUM"
    )]
    pub batch_size: usize,

    /// Storage backend
    #[arg(long, value_enum, default_value_t = Backend::Sqlite)]
    pub backend: Backend,

    /// Skip paths matching pattern in directory mode (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Storage backend
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Embedded SQLite database file
    Sqlite,
    /// MySQL server (requires the `mysql` feature)
    #[value(name = "mysql")]
    MySql,
}

impl Backend {
    /// Whether this backend was compiled in
    pub fn is_available(self) -> bool {
        match self {
            Backend::Sqlite => true,
            Backend::MySql => cfg!(feature = "mysql"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::MySql => "mysql",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved database connection parameters
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
}

// Keep the password out of logs
impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("host", &self.host)
            .finish()
    }
}

/// What to ingest
#[derive(Debug, Clone)]
pub enum InputSource {
    /// A tar-based archive
    Archive(PathBuf),

    /// A directory tree, minus excluded paths
    Directory { root: PathBuf, exclude: Vec<Regex> },
}

impl InputSource {
    /// Path for display and run metadata
    pub fn display_path(&self) -> String {
        match self {
            InputSource::Archive(path) => path.display().to_string(),
            InputSource::Directory { root, .. } => root.display().to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InputSource::Archive(_) => "archive",
            InputSource::Directory { .. } => "directory",
        }
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Archive or directory to read
    pub source: InputSource,

    /// Storage backend
    pub backend: Backend,

    /// Connection parameters for the backend
    pub connection: ConnectionParams,

    /// Batching policy
    pub batch: BatchConfig,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl IngestConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let source = match (args.tarfile, args.directory) {
            (None, None) => return Err(ConfigError::MissingInput),
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingInputs),
            (Some(path), None) => {
                if let ArchiveFormat::Unrecognized(extension) = ArchiveFormat::from_path(&path) {
                    return Err(ConfigError::UnrecognizedExtension { path, extension });
                }
                if !path.is_file() {
                    return Err(ConfigError::InvalidInputPath {
                        path,
                        reason: "Archive does not exist or is not a file".to_string(),
                    });
                }
                InputSource::Archive(path)
            }
            (None, Some(root)) => {
                if !root.is_dir() {
                    return Err(ConfigError::InvalidInputPath {
                        path: root,
                        reason: "Directory does not exist".to_string(),
                    });
                }
                let exclude = compile_excludes(&args.exclude_patterns)?;
                InputSource::Directory { root, exclude }
            }
        };

        // Validate batch size
        if args.batch_size < MIN_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize {
                size: args.batch_size,
                min: MIN_BATCH_SIZE,
            });
        }

        if !args.backend.is_available() {
            return Err(ConfigError::BackendUnavailable(args.backend.name()));
        }

        let database = require(args.database, "--db", "DATABASE")?;
        let connection = match args.backend {
            Backend::Sqlite => ConnectionParams {
                database,
                user: args.user,
                password: args.password,
                host: args.host,
            },
            Backend::MySql => ConnectionParams {
                database,
                user: Some(require(args.user, "--user", "DBUSER")?),
                password: Some(require(args.password, "--password", "DBPASSWORD")?),
                host: Some(require(args.host, "--host", "DBHOST")?),
            },
        };

        Ok(Self {
            source,
            backend: args.backend,
            connection,
            batch: BatchConfig {
                max_records: args.batch_size,
                partition: args.partition,
            },
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }
}

fn require(
    value: Option<String>,
    flag: &'static str,
    env: &'static str,
) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingParameter { flag, env })
}

fn compile_excludes(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                pattern: p.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    /// Arguments built by hand so DATABASE/DBUSER in the test environment can't leak in
    fn args() -> CliArgs {
        CliArgs {
            tarfile: None,
            directory: None,
            database: Some("leaks.db".into()),
            user: None,
            password: None,
            host: None,
            partition: false,
            batch_size: MAX_RECORDS_PER_COMMIT,
            backend: Backend::Sqlite,
            exclude_patterns: Vec::new(),
            quiet: false,
            verbose: false,
        }
    }

    #[test]
    fn test_flags_parse() {
        let args = CliArgs::try_parse_from([
            "leak-loader",
            "-T",
            "dump.tar.gz",
            "-d",
            "out.db",
            "-u",
            "root",
            "-W",
            "pw",
            "-H",
            "localhost",
            "-P",
            "-b",
            "500",
            "--backend",
            "mysql",
            "--exclude",
            "a",
            "--exclude",
            "b",
        ])
        .unwrap();

        assert_eq!(args.tarfile, Some(PathBuf::from("dump.tar.gz")));
        assert_eq!(args.database.as_deref(), Some("out.db"));
        assert_eq!(args.user.as_deref(), Some("root"));
        assert_eq!(args.password.as_deref(), Some("pw"));
        assert_eq!(args.host.as_deref(), Some("localhost"));
        assert!(args.partition);
        assert_eq!(args.batch_size, 500);
        assert_eq!(args.backend, Backend::MySql);
        assert_eq!(args.exclude_patterns, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_and_conflicting_input() {
        assert!(matches!(
            IngestConfig::from_args(args()),
            Err(ConfigError::MissingInput)
        ));

        let mut a = args();
        a.tarfile = Some("x.tar".into());
        a.directory = Some(".".into());
        let err = IngestConfig::from_args(a).unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingInputs));
        assert_eq!(err.to_string(), "Flags -T and -D are mutually exclusive");
    }

    #[test]
    fn test_unrecognized_extension() {
        let mut a = args();
        a.tarfile = Some("dump.zip".into());
        match IngestConfig::from_args(a) {
            Err(ConfigError::UnrecognizedExtension { extension, .. }) => {
                assert_eq!(extension, "zip")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_archive_must_exist() {
        let mut a = args();
        a.tarfile = Some("/nonexistent/dump.tar".into());
        assert!(matches!(
            IngestConfig::from_args(a),
            Err(ConfigError::InvalidInputPath { .. })
        ));
    }

    #[test]
    fn test_directory_config() {
        let dir = tempdir().unwrap();
        let mut a = args();
        a.directory = Some(dir.path().to_path_buf());
        a.exclude_patterns = vec![r"\.snapshot".into()];
        a.batch_size = 10;
        a.partition = true;
        a.quiet = true;

        let config = IngestConfig::from_args(a).unwrap();
        match &config.source {
            InputSource::Directory { root, exclude } => {
                assert_eq!(root, dir.path());
                assert!(exclude[0].is_match("/data/.snapshot/hourly.0"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(config.source.kind(), "directory");
        assert_eq!(
            config.batch,
            BatchConfig {
                max_records: 10,
                partition: true
            }
        );
        assert!(!config.show_progress);
        assert_eq!(config.connection.database, "leaks.db");
    }

    #[test]
    fn test_invalid_exclude_and_batch_size() {
        let dir = tempdir().unwrap();

        let mut a = args();
        a.directory = Some(dir.path().to_path_buf());
        a.exclude_patterns = vec!["(".into()];
        assert!(matches!(
            IngestConfig::from_args(a),
            Err(ConfigError::InvalidExcludePattern { .. })
        ));

        let mut a = args();
        a.directory = Some(dir.path().to_path_buf());
        a.batch_size = 0;
        assert!(matches!(
            IngestConfig::from_args(a),
            Err(ConfigError::InvalidBatchSize { size: 0, min: 1 })
        ));
    }

    #[test]
    fn test_missing_database() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("dump.tar");
        fs::write(&archive, b"").unwrap();

        let mut a = args();
        a.tarfile = Some(archive);
        a.database = None;
        match IngestConfig::from_args(a) {
            Err(ConfigError::MissingParameter { flag, env }) => {
                assert_eq!(flag, "--db");
                assert_eq!(env, "DATABASE");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[cfg(feature = "mysql")]
    #[test]
    fn test_mysql_requires_all_params() {
        let dir = tempdir().unwrap();
        let mut a = args();
        a.directory = Some(dir.path().to_path_buf());
        a.backend = Backend::MySql;
        a.user = Some("root".into());
        a.host = Some("localhost".into());
        match IngestConfig::from_args(a) {
            Err(ConfigError::MissingParameter { env, .. }) => assert_eq!(env, "DBPASSWORD"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[cfg(not(feature = "mysql"))]
    #[test]
    fn test_mysql_unavailable() {
        let dir = tempdir().unwrap();
        let mut a = args();
        a.directory = Some(dir.path().to_path_buf());
        a.backend = Backend::MySql;
        assert!(matches!(
            IngestConfig::from_args(a),
            Err(ConfigError::BackendUnavailable("mysql"))
        ));
    }

    #[test]
    fn test_password_hidden_in_debug() {
        let params = ConnectionParams {
            database: "leaks".into(),
            user: Some("root".into()),
            password: Some("hunter2".into()),
            host: None,
        };
        let debug = format!("{:?}", params);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }
}
