//! The inventory engine.
//!
//! [`ImgWatcher`] keeps every registered category stocked with images that
//! still have uses left, periodically persists usage counts from the cache to
//! the durable store, and serves lookups from whichever tier has the answer.
//!
//! ```text
//!   collector ──► cache ◄──── retrieval (increment on read)
//!                   │  ▲
//!      sync (loop)  ▼  │  seed (startup) / fallback (on miss)
//!                 store
//! ```

pub mod error;
mod registry;
mod retrieve;
#[cfg(test)]
mod testing;
mod watcher;

pub use crate::registry::{ImgDb, Registry};
pub use crate::watcher::{ImgWatcher, Settings};
