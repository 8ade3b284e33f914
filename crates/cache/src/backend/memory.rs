//! In-process cache backend.

use crate::CacheBackend;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use imgstock_record::ImgInfo;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use tokio::sync::RwLock;

/// All cached images of one category.
///
/// `ranks` orders ids by score for rank and range queries, `order` gives
/// random selection in constant time. Entries are never removed, so `order`
/// only ever grows.
#[derive(Debug, Default)]
struct Shelf {
    entries: HashMap<String, ImgInfo>,
    ranks: BTreeSet<(u64, String)>,
    order: Vec<String>,
}

impl Shelf {
    fn upsert(&mut self, img: ImgInfo) {
        match self.entries.get(&img.id) {
            Some(old) => {
                self.ranks.remove(&(old.uses, old.id.clone()));
            },
            None => self.order.push(img.id.clone()),
        }
        self.ranks.insert((img.uses, img.id.clone()));
        self.entries.insert(img.id.clone(), img);
    }

    fn bump(&mut self, id: &str) -> Option<&ImgInfo> {
        let entry = self.entries.get_mut(id)?;
        self.ranks.remove(&(entry.uses, entry.id.clone()));
        entry.uses += 1;
        self.ranks.insert((entry.uses, entry.id.clone()));
        Some(entry)
    }

    fn in_range(&self, lo: u64, hi: u64) -> Vec<String> {
        self.ranks
            .range((Bound::Included((lo, String::new())), Bound::Unbounded))
            .take_while(|(score, _)| *score <= hi)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

/// In-process cache backend.
///
/// Categories are kept in a `HashMap` behind a [`RwLock`], so all trait
/// methods operate on `&self`. Reads that increment the score take the write
/// lock, which is what makes increment-on-read atomic.
///
/// Contents are lost when the process exits; the durable store is what
/// survives restarts.
pub struct MemoryCache {
    shelves: RwLock<HashMap<String, Shelf>>,
}

impl MemoryCache {
    /// Create a cache pre-populated with images, each filed under its own
    /// `category`.
    ///
    /// ```
    /// use imgstock_cache::backend::MemoryCache;
    /// use imgstock_record::ImgInfo;
    ///
    /// let cache = MemoryCache::with_images([
    ///     ImgInfo::new("cats", "https://example.com/1.jpg", 10, 10),
    ///     ImgInfo::new("dogs", "https://example.com/2.jpg", 10, 10),
    /// ]);
    /// ```
    pub fn with_images(images: impl IntoIterator<Item = ImgInfo>) -> Self {
        let mut shelves: HashMap<String, Shelf> = HashMap::new();
        for img in images {
            shelves.entry(img.category.clone()).or_default().upsert(img);
        }
        Self { shelves: RwLock::new(shelves) }
    }
}
impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_images([])
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn actual_id(&self, category: &str) -> Result<String> {
        let guard = self.shelves.read().await;
        guard
            .get(category)
            .and_then(|shelf| shelf.ranks.first())
            .map(|(_, id)| id.clone())
            .ok_or_else(|| exn::Exn::from(ErrorKind::EmptyCategory(category.to_string())))
    }

    async fn random_id(&self, category: &str) -> Result<String> {
        let guard = self.shelves.read().await;
        let order = match guard.get(category) {
            Some(shelf) if !shelf.order.is_empty() => &shelf.order,
            _ => exn::bail!(ErrorKind::EmptyCategory(category.to_string())),
        };
        let index = rand::rng().random_range(0..order.len());
        Ok(order[index].clone())
    }

    async fn get(&self, category: &str, id: &str, increment: bool) -> Result<ImgInfo> {
        let found = match increment {
            true => self.shelves.write().await.get_mut(category).and_then(|shelf| shelf.bump(id).cloned()),
            false => self.shelves.read().await.get(category).and_then(|shelf| shelf.entries.get(id).cloned()),
        };
        found.ok_or_else(|| exn::Exn::from(ErrorKind::not_found(category, id)))
    }

    async fn all_ids(&self, category: &str) -> Result<Vec<String>> {
        let guard = self.shelves.read().await;
        Ok(guard.get(category).map(|shelf| shelf.order.clone()).unwrap_or_default())
    }

    async fn score(&self, category: &str, id: &str) -> Result<u64> {
        let guard = self.shelves.read().await;
        guard
            .get(category)
            .and_then(|shelf| shelf.entries.get(id))
            .map(|img| img.uses)
            .ok_or_else(|| exn::Exn::from(ErrorKind::not_found(category, id)))
    }

    async fn ids_in_range(&self, category: &str, lo: u64, hi: u64) -> Result<Vec<String>> {
        let guard = self.shelves.read().await;
        Ok(guard.get(category).map(|shelf| shelf.in_range(lo, hi)).unwrap_or_default())
    }

    async fn set(&self, category: &str, img: &ImgInfo) -> Result<()> {
        let mut img = img.clone();
        img.category = category.to_string();
        self.shelves.write().await.entry(category.to_string()).or_default().upsert(img);
        Ok(())
    }
}
