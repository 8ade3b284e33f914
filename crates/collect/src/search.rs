//! Image search providers.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;

pub type SearcherHandle = Arc<dyn Searcher + Send + Sync>;

const GOOGLE_API_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// An image the search provider knows about, not downloaded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub origin: String,
    pub width: u32,
    pub height: u32,
}

/// Which slice of the provider's result list to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    /// Zero-based index of the first result.
    pub offset: u32,
    pub size: u32,
}

impl SearchWindow {
    pub const SIZE: u32 = 5;
    /// Results deeper than this are rarely relevant to the query any more.
    pub const MAX_END: u32 = 20;

    /// A window of [`SIZE`](Self::SIZE) results at a random depth, so that
    /// repeated searches for the same category don't keep returning the same
    /// first page.
    pub fn random() -> Self {
        let end = rand::rng().random_range(Self::SIZE..Self::MAX_END);
        Self { offset: end - Self::SIZE, size: Self::SIZE }
    }
}

/// Anything that turns a text query into image candidates.
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, query: &str, window: SearchWindow) -> Result<Vec<ImageCandidate>>;
}

/// Google Custom Search JSON API, restricted to image results.
#[derive(Debug, Clone)]
pub struct GoogleSearch {
    client: reqwest::Client,
    key: String,
    cx: String,
}

impl GoogleSearch {
    pub fn new(key: impl Into<String>, cx: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            key: key.into(),
            cx: cx.into(),
        }
    }
}

#[async_trait]
impl Searcher for GoogleSearch {
    async fn search(&self, query: &str, window: SearchWindow) -> Result<Vec<ImageCandidate>> {
        tracing::trace!(query, offset = window.offset, size = window.size, "Sending image search");
        // The API counts results from 1.
        let start = (window.offset + 1).to_string();
        let num = window.size.to_string();
        let response = self
            .client
            .get(GOOGLE_API_URL)
            .query(&[
                ("key", self.key.as_str()),
                ("cx", self.cx.as_str()),
                ("searchType", "image"),
                ("filter", "1"),
                ("q", query),
                ("start", start.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .or_raise(|| ErrorKind::Provider)?;
        tracing::trace!(status = response.status().as_u16(), "Image search responded");
        let body = response.text().await.or_raise(|| ErrorKind::Provider)?;
        parse_response(&body)
    }
}

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
    error: Option<GoogleError>,
}

#[derive(Deserialize)]
struct GoogleItem {
    link: String,
    #[serde(default)]
    image: GoogleImage,
}

#[derive(Default, Deserialize)]
struct GoogleImage {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<GoogleErrorDetail>,
}

#[derive(Deserialize)]
struct GoogleErrorDetail {
    reason: String,
}

fn parse_response(body: &str) -> Result<Vec<ImageCandidate>> {
    let response: GoogleResponse = serde_json::from_str(body).or_raise(|| ErrorKind::Provider)?;
    if let Some(error) = response.error {
        let reason = error.errors.into_iter().next().map(|e| e.reason).unwrap_or(error.message);
        tracing::info!(%reason, "Image search returned an error");
        exn::bail!(ErrorKind::Rejected(reason));
    }
    Ok(response
        .items
        .into_iter()
        .map(|item| ImageCandidate { origin: item.link, width: item.image.width, height: item.image.height })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_items() {
        let body = r#"{
            "kind": "customsearch#search",
            "items": [
                {"link": "https://example.com/a.jpg", "image": {"width": 640, "height": 480, "byteSize": 1234}},
                {"link": "https://example.com/b.png", "image": {"width": 10, "height": 20}},
                {"link": "https://example.com/c.gif"}
            ]
        }"#;
        let candidates = parse_response(body).unwrap();
        assert_eq!(candidates.len(), 3);
        assert_eq!(
            candidates[0],
            ImageCandidate { origin: "https://example.com/a.jpg".to_string(), width: 640, height: 480 }
        );
        assert_eq!(candidates[2].width, 0);
    }

    #[test]
    fn test_parse_no_results() {
        assert!(parse_response(r#"{"kind": "customsearch#search"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_error_payload() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded", "errors": [{"reason": "rateLimitExceeded", "domain": "usageLimits"}]}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Rejected(reason) if reason == "rateLimitExceeded"));
        let body = r#"{"error": {"code": 400, "message": "Bad key"}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Rejected(reason) if reason == "Bad key"));
    }

    #[test]
    fn test_parse_garbage() {
        let err = parse_response("<html>502</html>").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Provider));
    }

    #[test]
    fn test_random_window_bounds() {
        for _ in 0..100 {
            let window = SearchWindow::random();
            assert_eq!(window.size, SearchWindow::SIZE);
            assert!(window.offset + window.size < SearchWindow::MAX_END);
        }
    }
}
