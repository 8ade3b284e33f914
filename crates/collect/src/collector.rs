//! Collectors turn a category name into fresh inventory records.

use crate::error::{ErrorKind, Result};
use crate::saver::SaverHandle;
use crate::search::{ImageCandidate, SearchWindow, SearcherHandle};
use async_trait::async_trait;
use imgstock_asyncutils::{Retry, retry};
use imgstock_record::ImgInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub type CollectorHandle = Arc<dyn Collect + Send + Sync>;

const SEARCH_ATTEMPTS: usize = 3;
const SEARCH_BACKOFF: Duration = Duration::from_secs(1);

/// Produce up to `need` new records for a category.
///
/// Returning fewer than requested is not an error. Every returned record has
/// `uses == 0` and `category` set to the requested category.
#[async_trait]
pub trait Collect: Send + Sync {
    async fn collect(&self, category: &str, need: usize) -> Result<Vec<ImgInfo>>;
}

/// How collected images are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum CollectingMode {
    /// Remember the origin URL only.
    #[default]
    #[display("urls")]
    Urls,
    /// Download every image to local storage.
    #[display("files")]
    Files,
}

impl FromStr for CollectingMode {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "urls" => Ok(Self::Urls),
            "files" => Ok(Self::Files),
            other => Err(exn::Exn::from(ErrorKind::Configuration(other.to_string()))),
        }
    }
}

/// Build the collector matching `mode`.
pub fn collector_for(mode: CollectingMode, searcher: SearcherHandle, saver: SaverHandle) -> CollectorHandle {
    match mode {
        CollectingMode::Urls => Arc::new(UrlCollector::new(searcher)),
        CollectingMode::Files => Arc::new(FileCollector::new(searcher, saver)),
    }
}

/// Collects URL-only records straight from search results.
#[derive(Clone)]
pub struct UrlCollector {
    searcher: SearcherHandle,
    attempts: usize,
    backoff: Duration,
}

impl UrlCollector {
    pub fn new(searcher: SearcherHandle) -> Self {
        Self { searcher, attempts: SEARCH_ATTEMPTS, backoff: SEARCH_BACKOFF }
    }

    pub fn with_retry(mut self, attempts: usize, backoff: Duration) -> Self {
        self.attempts = attempts;
        self.backoff = backoff;
        self
    }

    async fn search_window(&self, category: &str) -> Result<Vec<ImageCandidate>> {
        let searcher = &self.searcher;
        retry(self.attempts, self.backoff, || async move {
            searcher.search(category, SearchWindow::random()).await.map_err(|err| {
                let retryable = err.is_retryable();
                Retry::when(err, retryable)
            })
        })
        .await
    }

    /// Search until `need` distinct candidates are found or the round budget
    /// runs out. One round per window; every round asks for a fresh random
    /// window, so the budget is generous.
    async fn gather(&self, category: &str, need: usize) -> Result<Vec<ImageCandidate>> {
        let rounds = need.div_ceil(SearchWindow::SIZE as usize) * 2;
        let mut seen = HashSet::new();
        let mut found = Vec::with_capacity(need);
        let mut last_error = None;
        for round in 0..rounds {
            if found.len() >= need {
                break;
            }
            match self.search_window(category).await {
                Ok(candidates) => {
                    tracing::trace!(category, round, count = candidates.len(), "Search round finished");
                    for candidate in candidates {
                        if seen.insert(candidate.origin.clone()) {
                            found.push(candidate);
                        }
                    }
                },
                Err(err) => {
                    tracing::warn!(category, round, error = ?err, "Search round failed");
                    last_error = Some(err);
                },
            }
        }
        match (found.is_empty(), last_error) {
            (true, Some(err)) => Err(err),
            (false, Some(_)) => {
                tracing::warn!(category, found = found.len(), need, "Keeping partial search results");
                found.truncate(need);
                Ok(found)
            },
            (_, None) => {
                found.truncate(need);
                Ok(found)
            },
        }
    }
}

#[async_trait]
impl Collect for UrlCollector {
    #[tracing::instrument("Collecting image URLs", skip(self), level = "debug")]
    async fn collect(&self, category: &str, need: usize) -> Result<Vec<ImgInfo>> {
        if need == 0 {
            return Ok(Vec::new());
        }
        let candidates = self.gather(category, need).await?;
        Ok(candidates
            .into_iter()
            .map(|c| ImgInfo::new(category, c.origin, c.width, c.height))
            .collect())
    }
}

/// Collects records backed by downloaded files.
#[derive(Clone)]
pub struct FileCollector {
    urls: UrlCollector,
    saver: SaverHandle,
}

impl FileCollector {
    pub fn new(searcher: SearcherHandle, saver: SaverHandle) -> Self {
        Self { urls: UrlCollector::new(searcher), saver }
    }

    pub fn with_retry(mut self, attempts: usize, backoff: Duration) -> Self {
        self.urls = self.urls.with_retry(attempts, backoff);
        self
    }
}

#[async_trait]
impl Collect for FileCollector {
    #[tracing::instrument("Collecting image files", skip(self), level = "debug")]
    async fn collect(&self, category: &str, need: usize) -> Result<Vec<ImgInfo>> {
        if need == 0 {
            return Ok(Vec::new());
        }
        let candidates = self.urls.gather(category, need).await?;
        let requested = candidates.len();
        let saved = self.saver.save_all(category, candidates).await?;
        if saved.len() < requested {
            tracing::info!(category, requested, saved = saved.len(), "Some images could not be saved");
        }
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saver::ImageSaver;
    use crate::search::Searcher;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out `per_call` new candidates each call, failing the first
    /// `failures` calls with `kind`.
    struct FakeSearch {
        calls: AtomicUsize,
        per_call: usize,
        failures: usize,
        kind: fn() -> ErrorKind,
        repeat: bool,
    }

    impl FakeSearch {
        fn new(per_call: usize) -> Self {
            Self { calls: AtomicUsize::new(0), per_call, failures: 0, kind: || ErrorKind::Provider, repeat: false }
        }

        fn failing(mut self, failures: usize, kind: fn() -> ErrorKind) -> Self {
            self.failures = failures;
            self.kind = kind;
            self
        }

        /// Always return the same page of results.
        fn repeating(mut self) -> Self {
            self.repeat = true;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Searcher for FakeSearch {
        async fn search(&self, query: &str, _window: SearchWindow) -> Result<Vec<ImageCandidate>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(exn::Exn::from((self.kind)()));
            }
            let page = if self.repeat { 0 } else { call };
            Ok((0..self.per_call)
                .map(|i| ImageCandidate {
                    origin: format!("https://example.com/{query}/{page}-{i}.jpg"),
                    width: 100,
                    height: 100,
                })
                .collect())
        }
    }

    /// Pretends to save every other candidate.
    struct FakeSaver;

    #[async_trait]
    impl ImageSaver for FakeSaver {
        async fn save_all(&self, category: &str, candidates: Vec<ImageCandidate>) -> Result<Vec<ImgInfo>> {
            Ok(candidates
                .into_iter()
                .step_by(2)
                .map(|c| {
                    let img = ImgInfo::new(category, c.origin, c.width, c.height);
                    let path = format!("/tmp/{category}/{}.jpg", img.id);
                    img.with_file(path, 42)
                })
                .collect())
        }
    }

    fn urls(searcher: Arc<FakeSearch>) -> UrlCollector {
        UrlCollector::new(searcher).with_retry(3, Duration::from_millis(1))
    }

    #[rstest]
    #[case(1)]
    #[case(5)]
    #[case(12)]
    #[tokio::test]
    async fn test_collects_exactly_need(#[case] need: usize) {
        let searcher = Arc::new(FakeSearch::new(5));
        let images = urls(searcher).collect("cats", need).await.unwrap();
        assert_eq!(images.len(), need);
        assert!(images.iter().all(|img| img.uses == 0 && img.category == "cats"));
        let ids: HashSet<_> = images.iter().map(|img| img.id.clone()).collect();
        assert_eq!(ids.len(), need);
    }

    #[tokio::test]
    async fn test_zero_need_skips_search() {
        let searcher = Arc::new(FakeSearch::new(5));
        assert!(urls(searcher.clone()).collect("cats", 0).await.unwrap().is_empty());
        assert_eq!(searcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicates_are_dropped() {
        let searcher = Arc::new(FakeSearch::new(3).repeating());
        let images = urls(searcher.clone()).collect("cats", 5).await.unwrap();
        // Same three results every round; the round budget caps the searching.
        assert_eq!(images.len(), 3);
        assert_eq!(searcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let searcher = Arc::new(FakeSearch::new(5).failing(2, || ErrorKind::Provider));
        let images = urls(searcher.clone()).collect("cats", 5).await.unwrap();
        assert_eq!(images.len(), 5);
        assert_eq!(searcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let searcher = Arc::new(FakeSearch::new(5).failing(usize::MAX, || ErrorKind::Rejected("keyInvalid".to_string())));
        let err = urls(searcher.clone()).collect("cats", 5).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Rejected(_)));
        // One call per round, no retries within a round.
        assert_eq!(searcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_partial_results_are_kept() {
        // First round exhausts its three attempts, later rounds keep finding
        // the same page.
        let searcher = Arc::new(FakeSearch::new(5).failing(3, || ErrorKind::Provider).repeating());
        let images = urls(searcher.clone()).collect("cats", 10).await.unwrap();
        assert_eq!(images.len(), 5);
        assert_eq!(searcher.calls(), 6);
    }

    #[tokio::test]
    async fn test_file_collector_returns_saved_only() {
        let searcher = Arc::new(FakeSearch::new(5));
        let collector = FileCollector::new(searcher, Arc::new(FakeSaver)).with_retry(1, Duration::from_millis(1));
        let images = collector.collect("dogs", 4).await.unwrap();
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|img| !img.is_empty_file()));
    }

    #[rstest]
    #[case("urls", CollectingMode::Urls)]
    #[case("files", CollectingMode::Files)]
    #[case(" Files ", CollectingMode::Files)]
    fn test_mode_from_str(#[case] input: &str, #[case] expected: CollectingMode) {
        assert_eq!(input.parse::<CollectingMode>().unwrap(), expected);
        assert_eq!(expected.to_string(), input.trim().to_ascii_lowercase());
    }

    #[test]
    fn test_unknown_mode() {
        let err = "ftp".parse::<CollectingMode>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Configuration(mode) if mode == "ftp"));
    }
}
