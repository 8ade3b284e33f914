//! Watcher Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A watcher error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies what failed, from the engine's point of view.
///
/// ### Dependency errors
/// - [`ErrorKind::Cache`]
/// - [`ErrorKind::Provider`]
/// - [`ErrorKind::Persistence`]
///
/// ### Surfaced to callers
/// - [`ErrorKind::Unavailable`]: the only error retrieval ever returns.
/// - [`ErrorKind::Reconcile`]: one or more categories failed a sync pass.
/// - [`ErrorKind::Configuration`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The cache backend failed for a reason other than a miss.
    #[display("cache error")]
    Cache,
    /// Collecting new images failed (search or download).
    #[display("image provider error")]
    Provider,
    /// A durable store operation failed.
    #[display("persistence error")]
    Persistence,
    /// Neither the cache nor the durable store could supply an image.
    #[display("no image available for category: {_0}")]
    Unavailable(#[error(not(source))] String),
    /// The categories whose reconciliation failed during one pass.
    #[display("reconciliation failed for: {}", _0.join(", "))]
    Reconcile(#[error(not(source))] Vec<String>),
    #[display("invalid watcher configuration: {_0}")]
    Configuration(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache | Self::Provider | Self::Persistence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::Unavailable("cats".to_string()).to_string(), "no image available for category: cats");
        assert_eq!(
            ErrorKind::Reconcile(vec!["cats".to_string(), "dogs".to_string()]).to_string(),
            "reconciliation failed for: cats, dogs"
        );
    }
}
