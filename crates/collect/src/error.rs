//! Collection Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A collection error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for collection operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The search provider could not be reached or answered garbage.
    #[display("search provider error")]
    Provider,
    /// The search provider answered with an error payload.
    #[display("search provider rejected request: {_0}")]
    Rejected(#[error(not(source))] String),
    /// Downloading an image failed.
    #[display("download failed: {_0}")]
    Download(#[error(not(source))] String),
    /// Writing a downloaded image to disk failed.
    #[display("cannot save image")]
    Io,
    /// The collecting mode is not one we know how to run.
    #[display("unknown collecting mode: {_0}")]
    Configuration(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// A rejection carries the provider's verdict (bad key, quota exceeded),
    /// which another attempt a few seconds later won't change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider | Self::Download(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Provider.is_retryable());
        assert!(ErrorKind::Download("https://example.com/a.jpg".to_string()).is_retryable());
        assert!(!ErrorKind::Rejected("dailyLimitExceeded".to_string()).is_retryable());
        assert!(!ErrorKind::Configuration("ftp".to_string()).is_retryable());
    }
}
