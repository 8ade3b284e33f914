//! Volatile cache tier of the image inventory.
//!
//! Consumers are served from here, and the watcher measures per-category
//! occupancy here, without touching the durable store. Two interchangeable
//! backends implement [`CacheBackend`]: [`MemoryCache`](backend::MemoryCache)
//! for a single process, and `RedisCache` (feature `redis`) for an inventory
//! shared between processes.

pub mod backend;
pub mod error;

pub use crate::backend::CacheBackend;
use std::sync::Arc;

pub type CacheHandle = Arc<dyn CacheBackend + Send + Sync>;

/// Pick a backend from configuration.
///
/// No address and database `0` means "no shared cache": the in-process
/// backend is used. Otherwise Redis is tried, and the in-process backend is
/// the fallback if the server can't be reached (or Redis support wasn't
/// compiled in). The choice is made once, here.
pub async fn select(address: Option<&str>, db: i64) -> CacheHandle {
    let address = address.map(str::trim).filter(|a| !a.is_empty());
    if address.is_none() && db == 0 {
        tracing::warn!("Using in-memory cache");
        return Arc::new(backend::MemoryCache::default());
    }
    let address = address.unwrap_or("127.0.0.1:6379");
    connect_shared(address, db).await.unwrap_or_else(|| {
        tracing::warn!("Shared cache unavailable, falling back to in-memory cache");
        Arc::new(backend::MemoryCache::default())
    })
}

#[cfg(feature = "redis")]
async fn connect_shared(address: &str, db: i64) -> Option<CacheHandle> {
    match backend::RedisCache::connect(address, db).await {
        Ok(cache) => {
            tracing::warn!(address, db, "Using Redis cache");
            Some(Arc::new(cache))
        },
        Err(err) => {
            tracing::error!(address, db, error = ?err, "Failed initializing Redis cache");
            None
        },
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_shared(address: &str, db: i64) -> Option<CacheHandle> {
    tracing::error!(address, db, "Redis cache configured but support is not compiled in (enable the `redis` feature)");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_select_defaults_to_memory() {
        assert_eq!(select(None, 0).await.name(), "memory");
        assert_eq!(select(Some("  "), 0).await.name(), "memory");
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn test_select_falls_back_without_redis_support() {
        assert_eq!(select(Some("127.0.0.1:6379"), 1).await.name(), "memory");
    }
}
