//! Store Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    /// Beginning, committing or rolling back a transaction failed.
    #[display("database transaction error")]
    Transaction,
    #[display("database migration error")]
    Migration,
    /// Could not create the directory holding the database file.
    #[display("cannot prepare database location")]
    Location,
    /// A value could not be converted between its row and model form.
    #[display("invalid store data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// SQLite reports lock contention (`SQLITE_BUSY`) through the same paths
    /// as every other database failure, so those are all worth another try.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database | Self::Transaction)
    }
}
