//! # Configuration
//!
//! Runtime settings for a [`Tablesmith`](crate::Tablesmith) handle.
//!
//! | Setting | Environment variable | Default |
//! |---------|----------------------|---------|
//! | `database_path` | `TABLESMITH_DB` | `tablesmith.db` |
//! | `pool_size` | `TABLESMITH_POOL_SIZE` | `10` |
//! | `busy_timeout` | `TABLESMITH_BUSY_TIMEOUT_MS` | `5000` ms |
//! | `ingest_mode` | `TABLESMITH_INGEST_MODE` | `atomic` |
//! | `max_identifier_len` | `TABLESMITH_MAX_IDENTIFIER_LEN` | `64` |

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::ident::DEFAULT_MAX_IDENTIFIER_LEN;
use crate::ingest::IngestMode;

/// Default number of pooled connections.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default time a connection waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ENV_DB: &str = "TABLESMITH_DB";
const ENV_POOL_SIZE: &str = "TABLESMITH_POOL_SIZE";
const ENV_BUSY_TIMEOUT_MS: &str = "TABLESMITH_BUSY_TIMEOUT_MS";
const ENV_INGEST_MODE: &str = "TABLESMITH_INGEST_MODE";
const ENV_MAX_IDENTIFIER_LEN: &str = "TABLESMITH_MAX_IDENTIFIER_LEN";

/// Settings for opening a store.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite database file. Created if missing.
    pub database_path: PathBuf,
    /// Upper bound on concurrently checked-out connections.
    pub pool_size: usize,
    /// SQLite busy timeout applied to every pooled connection.
    pub busy_timeout: Duration,
    /// How spreadsheet ingestion commits.
    pub ingest_mode: IngestMode,
    /// Longest table name the resolver accepts.
    pub max_identifier_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("tablesmith.db"),
            pool_size: DEFAULT_POOL_SIZE,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            ingest_mode: IngestMode::default(),
            max_identifier_len: DEFAULT_MAX_IDENTIFIER_LEN,
        }
    }
}

impl Config {
    /// Defaults with a specific database file.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from `TABLESMITH_*` environment variables, falling
    /// back to defaults for anything unset.
    ///
    /// # Errors
    ///
    /// `Error::Config` if a variable is set but unparseable, or the result
    /// fails [`Config::validate`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let database_path = lookup(ENV_DB)
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);
        let pool_size = parse_usize(lookup(ENV_POOL_SIZE), ENV_POOL_SIZE, defaults.pool_size)?;
        let busy_timeout = match lookup(ENV_BUSY_TIMEOUT_MS) {
            Some(raw) => Duration::from_millis(raw.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("invalid {ENV_BUSY_TIMEOUT_MS} '{raw}': {e}"))
            })?),
            None => defaults.busy_timeout,
        };
        let ingest_mode = match lookup(ENV_INGEST_MODE) {
            Some(raw) => raw.parse()?,
            None => defaults.ingest_mode,
        };
        let max_identifier_len = parse_usize(
            lookup(ENV_MAX_IDENTIFIER_LEN),
            ENV_MAX_IDENTIFIER_LEN,
            defaults.max_identifier_len,
        )?;

        let config = Self {
            database_path,
            pool_size,
            busy_timeout,
            ingest_mode,
            max_identifier_len,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that parsing alone can't express.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::Config("pool_size must be at least 1".to_string()));
        }
        if self.max_identifier_len == 0 {
            return Err(Error::Config(
                "max_identifier_len must be at least 1".to_string(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("database_path is empty".to_string()));
        }
        Ok(())
    }
}

fn parse_usize(raw: Option<String>, name: &str, default: usize) -> Result<usize> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|e| Error::Config(format!("invalid {name} '{raw}': {e}"))),
        None => Ok(default),
    }
}

// =============================================================================
// Tests
// =============================================================================
