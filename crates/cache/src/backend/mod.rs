//! Cache backend trait and implementations.
//!
//! This module defines the `CacheBackend` trait: one set of semantics for
//! usage-ranked image lookups, implemented both in-process and on top of a
//! shared Redis server.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use self::memory::MemoryCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;
use crate::error::Result;
use async_trait::async_trait;
use imgstock_record::ImgInfo;

/// Unified interface for cache backends.
///
/// Entries are keyed by `(category, id)` and carry a score mirroring the
/// record's usage counter. The score is what every ranking query looks at,
/// and is the only thing that changes on reads.
///
/// # Misses
/// Lookups that find nothing return
/// [`EmptyCategory`](crate::error::ErrorKind::EmptyCategory) or
/// [`NotFound`](crate::error::ErrorKind::NotFound). Enumerations
/// ([`all_ids`](Self::all_ids), [`ids_in_range`](Self::ids_in_range)) return
/// an empty list instead.
///
/// # Examples
///
/// ```
/// use imgstock_cache::backend::{CacheBackend, MemoryCache};
/// use imgstock_record::ImgInfo;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = MemoryCache::default();
/// let img = ImgInfo::new("cats", "https://example.com/cat.jpg", 640, 480);
/// cache.set("cats", &img).await?;
///
/// let id = cache.actual_id("cats").await?;
/// let seen = cache.get("cats", &id, true).await?;
/// assert_eq!(seen.uses, 1);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Name of the backend, used for logging only.
    fn name(&self) -> &str;

    /// Id of the least used image in the category (ties broken arbitrarily).
    async fn actual_id(&self, category: &str) -> Result<String>;

    /// Id of a uniformly chosen image in the category.
    async fn random_id(&self, category: &str) -> Result<String>;

    /// Fetch one image.
    ///
    /// With `increment` set, the score is bumped by one atomically with the
    /// read, and the change is visible to rank queries straight away. The
    /// returned record's `uses` is the score after this read.
    async fn get(&self, category: &str, id: &str, increment: bool) -> Result<ImgInfo>;

    /// Every id cached for the category.
    async fn all_ids(&self, category: &str) -> Result<Vec<String>>;

    /// Current usage score of one image.
    async fn score(&self, category: &str, id: &str) -> Result<u64>;

    /// Ids whose score lies within `lo..=hi`.
    async fn ids_in_range(&self, category: &str, lo: u64, hi: u64) -> Result<Vec<String>>;

    /// Insert or replace an image, its score initialized from `img.uses`.
    async fn set(&self, category: &str, img: &ImgInfo) -> Result<()>;

    /// Number of images still below the usage ceiling.
    ///
    /// This is the occupancy signal driving replenishment.
    async fn available(&self, category: &str, maximum_uses: u64) -> Result<usize> {
        match maximum_uses.checked_sub(1) {
            Some(hi) => Ok(self.ids_in_range(category, 0, hi).await?.len()),
            None => Ok(0),
        }
    }
}
