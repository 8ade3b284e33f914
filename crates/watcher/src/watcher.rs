use crate::error::{ErrorKind, Result};
use crate::registry::{ImgDb, Registry};
use exn::ResultExt;
use imgstock_asyncutils::{Retry, retry};
use imgstock_cache::CacheHandle;
use imgstock_collect::{CollectingMode, CollectorHandle};
use imgstock_record::ImgInfo;
use imgstock_store::Repository;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const SYNC_ATTEMPTS: usize = 3;
const SYNC_BACKOFF: Duration = Duration::from_millis(200);

/// Tunables of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Replenish a category once fewer images than this are available.
    pub minimal_available: u64,
    /// An image is available while it has been used fewer times than this.
    pub maximum_uses: u64,
    /// Period of the reconciliation loop. Replenishment runs every other
    /// period.
    pub check_interval: Duration,
    pub collecting_mode: CollectingMode,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.maximum_uses == 0 {
            exn::bail!(ErrorKind::Configuration("maximum uses must be positive"));
        }
        if self.check_interval.is_zero() {
            exn::bail!(ErrorKind::Configuration("check interval must be positive"));
        }
        Ok(())
    }
}

/// The inventory engine.
///
/// Owns the category registry and the handles to both storage tiers. Cheap to
/// clone; every clone drives the same engine, which is how the spawned loops
/// get their own handle.
#[derive(Clone)]
pub struct ImgWatcher {
    pub(crate) cache: CacheHandle,
    pub(crate) store: Repository,
    collector: CollectorHandle,
    pub(crate) settings: Settings,
    registry: Arc<Registry>,
    syncing: Arc<AtomicBool>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl ImgWatcher {
    /// Build the engine and load every durable record into the cache.
    ///
    /// Nothing is spawned yet; see [`spawn_watch`](Self::spawn_watch) and
    /// [`spawn_sync`](Self::spawn_sync).
    pub async fn new(store: Repository, cache: CacheHandle, collector: CollectorHandle, settings: Settings) -> Result<Self> {
        settings.validate()?;
        let watcher = Self {
            cache,
            store,
            collector,
            settings,
            registry: Arc::new(Registry::default()),
            syncing: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        };
        watcher.seed().await?;
        Ok(watcher)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Copy every durable record into the cache.
    ///
    /// Only failing to read the store at all is fatal. Rows that can't be
    /// decoded or cached are logged and left out.
    async fn seed(&self) -> Result<()> {
        tracing::info!(cache = self.cache.name(), "Initializing cache from store");
        let rows = self.store.list_all().await.or_raise(|| ErrorKind::Persistence)?;
        let total = rows.len();
        let mut loaded = 0usize;
        for row in rows {
            let img = match row {
                Ok(img) => img,
                Err(err) => {
                    tracing::warn!(error = ?err, "Skipping unreadable store record");
                    continue;
                },
            };
            match self.cache.set(&img.category, &img).await {
                Ok(()) => loaded += 1,
                Err(err) => tracing::warn!(category = %img.category, id = %img.id, error = ?err, "Cannot seed cache entry"),
            }
        }
        tracing::info!(loaded, total, "Cache initialized");
        Ok(())
    }

    // =========================================================================
    // Replenishment
    // =========================================================================

    /// Register `prefix` and start keeping it stocked.
    ///
    /// Returns `false` when the category is already being watched.
    pub async fn spawn_watch(&self, prefix: impl Into<String>) -> bool {
        let db = ImgDb::new(prefix, self.collector.clone());
        let prefix = db.prefix.clone();
        if !self.registry.register(db.clone()).await {
            tracing::warn!(%prefix, "Category is already watched");
            return false;
        }
        let watcher = self.clone();
        self.tasks.spawn(async move { watcher.watch(db).await });
        tracing::info!(%prefix, "Watcher started");
        true
    }

    async fn watch(self, db: ImgDb) {
        let period = self.settings.check_interval.saturating_mul(2);
        loop {
            match self.replenish(&db).await {
                Ok(0) => {},
                Ok(requested) => tracing::debug!(prefix = %db.prefix, requested, "Replenished category"),
                Err(err) => tracing::warn!(prefix = %db.prefix, error = ?err, "Replenishment skipped"),
            }
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(period) => {},
            }
        }
        tracing::info!(prefix = %db.prefix, "Watcher stopped");
    }

    /// Run a single replenishment check for a category.
    ///
    /// Uses the category's registered collector, or the engine's collector if
    /// the category isn't watched. Returns how many images were requested from
    /// the collector (zero when the category is sufficiently stocked).
    pub async fn replenish_once(&self, prefix: &str) -> Result<usize> {
        let db = match self.registry.get(prefix).await {
            Some(db) => db,
            None => ImgDb::new(prefix, self.collector.clone()),
        };
        self.replenish(&db).await
    }

    async fn replenish(&self, db: &ImgDb) -> Result<usize> {
        let prefix = db.prefix.as_str();
        let available = self
            .cache
            .available(prefix, self.settings.maximum_uses)
            .await
            .or_raise(|| ErrorKind::Cache)?;
        let available = u64::try_from(available).unwrap_or(u64::MAX);
        tracing::trace!(prefix, available, "Explored available images");
        if available >= self.settings.minimal_available {
            return Ok(0);
        }
        let need = usize::try_from(self.settings.minimal_available - available).unwrap_or(usize::MAX);
        tracing::debug!(prefix, available, expected = self.settings.minimal_available, need, "Collecting images");
        let collected = db.collector.collect(prefix, need).await.or_raise(|| ErrorKind::Provider)?;
        tracing::debug!(prefix, collected = collected.len(), "Collected new images");
        for img in collected {
            let img = ImgInfo { category: prefix.to_string(), uses: 0, ..img };
            if let Err(err) = self.cache.set(prefix, &img).await {
                tracing::warn!(prefix, id = %img.id, error = ?err, "Cannot cache collected image");
            }
        }
        Ok(need)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Start the periodic cache-to-store reconciliation.
    ///
    /// There is only ever one reconciliation loop per engine: returns `false`
    /// when it is already running.
    pub fn spawn_sync(&self) -> bool {
        if self.syncing.swap(true, Ordering::SeqCst) {
            tracing::warn!("Store sync is already running");
            return false;
        }
        let watcher = self.clone();
        self.tasks.spawn(async move { watcher.sync_loop().await });
        tracing::info!(interval = ?self.settings.check_interval, "Store sync started");
        true
    }

    async fn sync_loop(self) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(self.settings.check_interval) => {},
            }
            if let Err(err) = self.sync().await {
                tracing::error!(error = ?err, "Store sync failed");
            }
        }
        tracing::info!("Store sync stopped");
    }

    /// Persist the cached state of every watched category.
    ///
    /// Each category is written in its own transaction. A failing category
    /// doesn't stop the pass; the error returned at the end names every
    /// category that failed. Returns the number of rows written.
    pub async fn sync(&self) -> Result<usize> {
        tracing::debug!("Syncing store");
        // Registrations wait until the pass is over.
        let registry = self.registry.read().await;
        let prefixes: Vec<String> = registry.keys().cloned().collect();
        let mut written = 0;
        let mut failed = Vec::new();
        for prefix in prefixes {
            match self.sync_category(&prefix).await {
                Ok(rows) => written += rows,
                Err(err) => {
                    tracing::error!(%prefix, error = ?err, "Category sync failed");
                    failed.push(prefix);
                },
            }
        }
        drop(registry);
        if !failed.is_empty() {
            failed.sort();
            exn::bail!(ErrorKind::Reconcile(failed));
        }
        tracing::debug!(written, "Store synced");
        Ok(written)
    }

    #[tracing::instrument("Syncing category", skip(self), level = "trace")]
    async fn sync_category(&self, prefix: &str) -> Result<usize> {
        let ids = self.cache.all_ids(prefix).await.or_raise(|| ErrorKind::Cache)?;
        let mut batch = Vec::with_capacity(ids.len());
        for id in ids {
            match self.cache.get(prefix, &id, false).await {
                Ok(img) => {
                    let uses = img.uses;
                    batch.push((img, uses));
                },
                Err(err) if err.is_miss() => tracing::debug!(prefix, %id, "Cached image vanished during sync"),
                Err(err) => return Err(err).or_raise(|| ErrorKind::Cache),
            }
        }
        let store = &self.store;
        let batch = batch.as_slice();
        retry(SYNC_ATTEMPTS, SYNC_BACKOFF, || async move {
            store.sync(prefix, batch).await.map_err(|err| {
                let retryable = err.is_retryable();
                Retry::when(err, retryable)
            })
        })
        .await
        .or_raise(|| ErrorKind::Persistence)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Delete durable records whose download never completed.
    ///
    /// Only meaningful in files mode; in urls mode nothing has a path and the
    /// sweep is skipped.
    pub async fn purge_empty(&self) -> Result<u64> {
        if self.settings.collecting_mode != CollectingMode::Files {
            tracing::info!(mode = %self.settings.collecting_mode, "Nothing to purge in this collecting mode");
            return Ok(0);
        }
        let removed = self.store.purge_empty().await.or_raise(|| ErrorKind::Persistence)?;
        tracing::warn!(removed, "Removed records without files from store");
        Ok(removed)
    }

    /// Stop every loop, wait for them to finish, then persist the cache one
    /// last time.
    pub async fn shutdown(&self) -> Result<usize> {
        tracing::info!("Shutting down watchers");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.sync().await
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
