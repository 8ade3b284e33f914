//! In-process doubles shared by the unit tests.

use crate::{ImgWatcher, Settings};
use async_trait::async_trait;
use imgstock_cache::backend::MemoryCache;
use imgstock_cache::error::{ErrorKind as CacheErrorKind, Result as CacheResult};
use imgstock_cache::{CacheBackend, CacheHandle};
use imgstock_collect::error::{ErrorKind as CollectErrorKind, Result as CollectResult};
use imgstock_collect::{Collect, CollectingMode};
use imgstock_record::ImgInfo;
use imgstock_store::{Database, Repository};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Remembers every `need` it was asked for and hands out that many fresh
/// images. Records come back with a stale usage count and no category, which
/// the engine is expected to overwrite.
#[derive(Default)]
pub struct Recorder {
    requests: Mutex<Vec<usize>>,
    serial: AtomicUsize,
    fail: AtomicBool,
}

impl Recorder {
    pub fn requests(&self) -> Vec<usize> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Make the next call fail with a provider error.
    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Collect for Recorder {
    async fn collect(&self, category: &str, need: usize) -> CollectResult<Vec<ImgInfo>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(need);
        }
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(exn::Exn::from(CollectErrorKind::Provider));
        }
        Ok((0..need)
            .map(|_| {
                let n = self.serial.fetch_add(1, Ordering::SeqCst);
                let mut img = ImgInfo::new("", format!("https://example.com/{category}/collected-{n}.jpg"), 1, 1);
                img.uses = 9;
                img
            })
            .collect())
    }
}

/// An in-memory cache whose enumeration breaks for one category.
pub struct BrokenCategory {
    pub inner: MemoryCache,
    pub broken: &'static str,
}

#[async_trait]
impl CacheBackend for BrokenCategory {
    fn name(&self) -> &str {
        "broken"
    }

    async fn actual_id(&self, category: &str) -> CacheResult<String> {
        self.inner.actual_id(category).await
    }

    async fn random_id(&self, category: &str) -> CacheResult<String> {
        self.inner.random_id(category).await
    }

    async fn get(&self, category: &str, id: &str, increment: bool) -> CacheResult<ImgInfo> {
        self.inner.get(category, id, increment).await
    }

    async fn all_ids(&self, category: &str) -> CacheResult<Vec<String>> {
        if category == self.broken {
            return Err(exn::Exn::from(CacheErrorKind::Backend("connection reset".to_string())));
        }
        self.inner.all_ids(category).await
    }

    async fn score(&self, category: &str, id: &str) -> CacheResult<u64> {
        self.inner.score(category, id).await
    }

    async fn ids_in_range(&self, category: &str, lo: u64, hi: u64) -> CacheResult<Vec<String>> {
        self.inner.ids_in_range(category, lo, hi).await
    }

    async fn set(&self, category: &str, img: &ImgInfo) -> CacheResult<()> {
        self.inner.set(category, img).await
    }
}

pub fn settings(minimal_available: u64, maximum_uses: u64) -> Settings {
    Settings {
        minimal_available,
        maximum_uses,
        check_interval: Duration::from_millis(20),
        collecting_mode: CollectingMode::Urls,
    }
}

pub async fn engine(minimal_available: u64, maximum_uses: u64) -> (ImgWatcher, Arc<Recorder>) {
    engine_with(Arc::new(MemoryCache::default()), minimal_available, maximum_uses).await
}

pub async fn engine_with(cache: CacheHandle, minimal_available: u64, maximum_uses: u64) -> (ImgWatcher, Arc<Recorder>) {
    let db = Database::connect_in_memory().await.unwrap();
    let store = Repository::from(&db);
    let recorder = Arc::new(Recorder::default());
    let settings = settings(minimal_available, maximum_uses);
    let watcher = ImgWatcher::new(store, cache, recorder.clone(), settings).await.unwrap();
    (watcher, recorder)
}
