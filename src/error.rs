//! # Error Handling for Tablesmith
//!
//! This module defines the error type used throughout Tablesmith. A single
//! error enum ([`Error`]) covers every failure mode so callers can match on one
//! type regardless of which component produced it.
//!
//! ## Rust Pattern: thiserror
//!
//! We use the `thiserror` crate to derive `std::error::Error` implementations:
//! - `Display` comes from the `#[error(...)]` attributes
//! - `From` conversions come from `#[from]`
//! - Source chaining comes from `#[source]`
//!
//! ## Error Categories
//!
//! | Category | Examples | Typical Response |
//! |----------|----------|------------------|
//! | Rejected input | `InvalidIdentifier`, `Validation` | Fix the request |
//! | Outcome | `NotFound` | Report "not found", not a failure |
//! | Store failure | `ProvisioningFailed`, `CloneFailed`, `TransactionAborted` | Caller decides whether to retry |
//! | Partial write | `IngestionRowFailed` | Re-run the whole ingestion |
//!
//! No component retries on its own. Retry policy belongs to the caller.

use thiserror::Error;

use crate::orders::OrderStage;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in Tablesmith operations.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Rejected Input
    // =========================================================================

    /// A table key token is unsafe to interpolate into statement text.
    ///
    /// # When This Happens
    ///
    /// Table names are composed from user-supplied tokens. SQLite cannot bind
    /// identifiers as parameters, so every token must pass the allow-list
    /// (`[A-Za-z0-9_]`, non-empty, bounded length) before it reaches a statement.
    #[error("invalid identifier '{token}': {reason}")]
    InvalidIdentifier {
        /// The rejected token, verbatim
        token: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// The request is structurally unusable (no key, empty payload, empty batch).
    #[error("validation error: {0}")]
    Validation(String),

    // =========================================================================
    // Outcomes
    // =========================================================================

    /// A keyed update or delete matched zero rows.
    ///
    /// This is a normal outcome, signalled distinctly from store failures.
    /// Use [`Error::is_not_found`] to branch on it.
    #[error("no row in '{table}' with {key_column} = '{key}'")]
    NotFound {
        /// Table that was searched
        table: String,
        /// Natural key column used to address the row
        key_column: String,
        /// Key value that matched nothing
        key: String,
    },

    // =========================================================================
    // Component Failures
    // =========================================================================

    /// Creating a family table or recording its catalog entry failed.
    #[error("failed to provision table '{table}': {source}")]
    ProvisioningFailed {
        /// Table being provisioned
        table: String,
        /// Underlying store error
        #[source]
        source: rusqlite::Error,
    },

    /// One data row of a per-row ingestion failed to insert.
    ///
    /// # Partial State
    ///
    /// Rows before `row` are already committed and the prior contents are
    /// already deleted. The table is partially replaced until the caller
    /// re-runs the ingestion.
    #[error("ingestion failed at data row {row}: {source}")]
    IngestionRowFailed {
        /// 1-based index of the failing data row (the header is row 0)
        row: usize,
        /// Underlying store error
        #[source]
        source: rusqlite::Error,
    },

    /// An atomic ingestion failed; the table still holds its prior contents.
    #[error("ingestion into '{table}' rolled back: {source}")]
    IngestionAborted {
        /// Target table
        table: String,
        /// Underlying store error
        #[source]
        source: rusqlite::Error,
    },

    /// Copying a master table into a derived table failed.
    #[error("failed to clone '{source_table}' into '{dest_table}': {source}")]
    CloneFailed {
        /// Table being copied
        source_table: String,
        /// Table being created
        dest_table: String,
        /// Underlying store error
        #[source]
        source: rusqlite::Error,
    },

    /// A step of the order dual-write failed and the whole transaction was
    /// rolled back. No partial order state is retained.
    #[error("order transaction aborted during {stage}: {source}")]
    TransactionAborted {
        /// The step that failed
        stage: OrderStage,
        /// Underlying store error
        #[source]
        source: rusqlite::Error,
    },

    // =========================================================================
    // Collaborators and Infrastructure
    // =========================================================================

    /// The spreadsheet collaborator could not produce a grid.
    #[error("spreadsheet error: {0}")]
    Grid(String),

    /// The connection pool is closed or a pooled worker failed.
    #[error("pool error: {0}")]
    Pool(String),

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),

    /// Schema version mismatch in an existing database file.
    #[error("schema error: {0}")]
    Schema(String),

    /// Any other SQLite failure.
    ///
    /// # Rust Pattern: #[from]
    ///
    /// `#[from]` generates `impl From<rusqlite::Error> for Error`, which lets
    /// `?` convert store errors automatically where no richer variant applies.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Returns true for the non-exceptional "zero rows matched" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub(crate) fn invalid_identifier(token: &str, reason: &'static str) -> Self {
        Error::InvalidIdentifier {
            token: token.to_string(),
            reason,
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let invalid = Error::invalid_identifier("a;b", "only [A-Za-z0-9_] is allowed");
        assert_eq!(
            invalid.to_string(),
            "invalid identifier 'a;b': only [A-Za-z0-9_] is allowed"
        );

        let not_found = Error::NotFound {
            table: "baseDeDatos_abc".to_string(),
            key_column: "rank".to_string(),
            key: "7".to_string(),
        };
        assert_eq!(
            not_found.to_string(),
            "no row in 'baseDeDatos_abc' with rank = '7'"
        );
        assert!(not_found.is_not_found());

        let row_failed = Error::IngestionRowFailed {
            row: 3,
            source: rusqlite::Error::InvalidColumnName("nope".to_string()),
        };
        assert!(row_failed.to_string().starts_with("ingestion failed at data row 3"));
        assert!(!row_failed.is_not_found());
    }

    #[test]
    fn test_transaction_aborted_names_stage() {
        let err = Error::TransactionAborted {
            stage: OrderStage::ClearMirror,
            source: rusqlite::Error::InvalidQuery,
        };
        assert!(err.to_string().contains("clear-mirror"));
    }

    /// `?` on a rusqlite result lands in `Error::Sqlite`.
    #[test]
    fn test_sqlite_error_conversion() {
        let sqlite_err = rusqlite::Error::InvalidParameterName("test".to_string());
        let our_err: Error = sqlite_err.into();

        assert!(matches!(our_err, Error::Sqlite(_)));
        assert!(our_err.to_string().contains("sqlite error"));
    }
}
