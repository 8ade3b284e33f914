//! Configuration Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An explicitly requested configuration file does not exist.
    #[display("configuration file not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The file extension doesn't name a format we can read.
    #[display("unsupported configuration format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// Sources could not be merged into a configuration (syntax errors, wrong
    /// types, unknown collecting mode).
    #[display("invalid configuration")]
    Parse,
    /// Configuration parsed fine but a value is unusable.
    #[display("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ErrorKind {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }

    /// Configuration problems are fixed by a human, never by retrying.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
