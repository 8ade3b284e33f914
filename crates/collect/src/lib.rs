//! Replenishment side of the inventory: finding new images for a category
//! and, in files mode, downloading them.

mod collector;
pub mod error;
mod saver;
mod search;

pub use crate::collector::{Collect, CollectingMode, CollectorHandle, FileCollector, UrlCollector, collector_for};
pub use crate::saver::{ImageSaver, LocalSaver, SaverHandle};
pub use crate::search::{GoogleSearch, ImageCandidate, SearchWindow, Searcher, SearcherHandle};
