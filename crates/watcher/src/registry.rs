use imgstock_collect::CollectorHandle;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::{RwLock, RwLockReadGuard};

/// A watched category and the collector that restocks it.
#[derive(Clone)]
pub struct ImgDb {
    pub prefix: String,
    pub collector: CollectorHandle,
}

impl ImgDb {
    pub fn new(prefix: impl Into<String>, collector: CollectorHandle) -> Self {
        Self { prefix: prefix.into(), collector }
    }
}

impl fmt::Debug for ImgDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImgDb").field("prefix", &self.prefix).finish_non_exhaustive()
    }
}

/// Categories with a running replenishment loop.
///
/// Entries are only ever added. Registration takes the write lock; a
/// reconciliation pass holds the read lock for its whole duration, so a
/// category registered mid-pass is picked up by the next one.
#[derive(Debug, Default)]
pub struct Registry {
    categories: RwLock<HashMap<String, ImgDb>>,
}

impl Registry {
    /// Returns `false` (and leaves the existing entry alone) when the prefix is
    /// already registered.
    pub async fn register(&self, db: ImgDb) -> bool {
        let mut categories = self.categories.write().await;
        if categories.contains_key(&db.prefix) {
            return false;
        }
        categories.insert(db.prefix.clone(), db);
        true
    }

    pub async fn get(&self, prefix: &str) -> Option<ImgDb> {
        self.categories.read().await.get(prefix).cloned()
    }

    /// Registered prefixes, sorted.
    pub async fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<_> = self.categories.read().await.keys().cloned().collect();
        prefixes.sort();
        prefixes
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ImgDb>> {
        self.categories.read().await
    }
}
