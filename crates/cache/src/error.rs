//! Cache Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Nothing is cached for the category at all.
    #[display("no cached images for category: {_0}")]
    EmptyCategory(#[error(not(source))] String),
    /// The category exists but the image doesn't.
    #[display("image not cached: ({category}, {id})")]
    NotFound { category: String, id: String },
    /// Could not reach the cache server.
    #[display("cache connection error")]
    Connection,
    /// The backend rejected or failed a command.
    #[display("backend error: {_0}")]
    Backend(#[error(not(source))] String),
    /// A cached value could not be decoded.
    #[display("invalid cache data")]
    InvalidData,
}

impl ErrorKind {
    /// Returns `true` for plain misses, which callers recover from by asking
    /// the durable store instead.
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::EmptyCategory(_) | Self::NotFound { .. })
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection | Self::Backend(_))
    }

    pub(crate) fn not_found(category: &str, id: &str) -> Self {
        Self::NotFound { category: category.to_string(), id: id.to_string() }
    }
}
