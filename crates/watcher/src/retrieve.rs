//! Handing images out to consumers.
//!
//! Every lookup asks the cache first and falls back to the durable store on
//! any cache failure. A record found in the store is copied back into the
//! cache so the next lookup is served from there. Whatever goes wrong, callers
//! only ever see [`ErrorKind::Unavailable`].

use crate::ImgWatcher;
use crate::error::{ErrorKind, Result};
use imgstock_record::ImgInfo;
use std::future::Future;
use std::path::PathBuf;

type CacheResult<T> = imgstock_cache::error::Result<T>;
type StoreResult<T> = imgstock_store::error::Result<T>;

impl ImgWatcher {
    /// The least used image of a category. With `increment`, the read counts
    /// as a use.
    pub async fn get_actual_img(&self, category: &str, increment: bool) -> Result<ImgInfo> {
        let cached = self.cached_actual(category, increment).await;
        self.resolve(category, cached, self.store.least_used(category)).await
    }

    /// A uniformly random image of a category.
    pub async fn get_random_img(&self, category: &str, increment: bool) -> Result<ImgInfo> {
        let cached = self.cached_random(category, increment).await;
        self.resolve(category, cached, self.store.random(category)).await
    }

    pub async fn get_img_by_id(&self, category: &str, id: &str, increment: bool) -> Result<ImgInfo> {
        let cached = self.cache.get(category, id, increment).await;
        self.resolve(category, cached, self.store.by_id(category, id)).await
    }

    /// Where the downloaded file of an image lives. Images collected as bare
    /// URLs, or whose download never completed, have none.
    pub async fn get_local_img(&self, category: &str, id: &str) -> Result<PathBuf> {
        let img = self.get_img_by_id(category, id, false).await?;
        local_file(img).ok_or_else(|| ErrorKind::Unavailable(category.to_string()).into())
    }

    /// The file of a random downloaded image of a category.
    ///
    /// Files are only known to the durable store, so this never touches the
    /// cache.
    pub async fn get_random_local_img(&self, category: &str) -> Result<PathBuf> {
        let path = match self.store.random_local(category).await {
            Ok(img) => img.and_then(local_file),
            Err(err) => {
                tracing::error!(category, error = ?err, "Store lookup failed");
                None
            },
        };
        path.ok_or_else(|| ErrorKind::Unavailable(category.to_string()).into())
    }

    async fn cached_actual(&self, category: &str, increment: bool) -> CacheResult<ImgInfo> {
        let id = self.cache.actual_id(category).await?;
        self.cache.get(category, &id, increment).await
    }

    async fn cached_random(&self, category: &str, increment: bool) -> CacheResult<ImgInfo> {
        let id = self.cache.random_id(category).await?;
        self.cache.get(category, &id, increment).await
    }

    /// Return the cached image, or run the store lookup and repopulate the
    /// cache from it. The store lookup is not polled on a cache hit.
    async fn resolve(
        &self,
        category: &str,
        cached: CacheResult<ImgInfo>,
        fallback: impl Future<Output = StoreResult<Option<ImgInfo>>>,
    ) -> Result<ImgInfo> {
        match cached {
            Ok(img) => return Ok(img),
            Err(err) if err.is_miss() => tracing::debug!(category, "Cache miss, asking the store"),
            Err(err) => tracing::warn!(category, error = ?err, "Cache lookup failed, asking the store"),
        }
        let img = match fallback.await {
            Ok(Some(img)) => img,
            Ok(None) => exn::bail!(ErrorKind::Unavailable(category.to_string())),
            Err(err) => {
                tracing::error!(category, error = ?err, "Store lookup failed");
                exn::bail!(ErrorKind::Unavailable(category.to_string()));
            },
        };
        match self.cache.set(category, &img).await {
            Ok(()) => tracing::debug!(category, id = %img.id, "Cache updated from store"),
            Err(err) => tracing::debug!(category, id = %img.id, error = ?err, "Cache update from store failed"),
        }
        Ok(img)
    }
}

fn local_file(img: ImgInfo) -> Option<PathBuf> {
    let downloaded = img.file_size > 0;
    img.path.filter(|_| downloaded)
}
