//! Persisting downloaded images to local files.

use crate::error::{ErrorKind, Result};
use crate::search::ImageCandidate;
use async_trait::async_trait;
use exn::ResultExt;
use imgstock_asyncutils::{Retry, retry};
use imgstock_record::ImgInfo;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub type SaverHandle = Arc<dyn ImageSaver + Send + Sync>;

const DEFAULT_EXTENSION: &str = "jpg";
const DOWNLOAD_ATTEMPTS: usize = 3;
const DOWNLOAD_BACKOFF: Duration = Duration::from_millis(500);

/// Turns candidates into records backed by local files.
///
/// Implementations skip candidates they fail to save rather than failing the
/// whole batch; the returned list may be shorter than the input.
#[async_trait]
pub trait ImageSaver: Send + Sync {
    async fn save_all(&self, category: &str, candidates: Vec<ImageCandidate>) -> Result<Vec<ImgInfo>>;
}

/// Downloads images over HTTP into `{root}/{category}/{id}.{ext}`.
#[derive(Debug, Clone)]
pub struct LocalSaver {
    client: reqwest::Client,
    root: PathBuf,
    attempts: usize,
}

impl LocalSaver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            root: root.into(),
            attempts: DOWNLOAD_ATTEMPTS,
        }
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    fn target(&self, category: &str, img: &ImgInfo) -> PathBuf {
        self.root.join(category).join(file_name(&img.id, &img.origin))
    }

    async fn download(&self, origin: &str) -> Result<Vec<u8>> {
        let client = &self.client;
        retry(self.attempts, DOWNLOAD_BACKOFF, || async move {
            let response = client
                .get(origin)
                .send()
                .await
                .or_raise(|| ErrorKind::Download(origin.to_string()))?;
            let status = response.status();
            if status.is_client_error() {
                // 404s and 403s won't fix themselves.
                return Err(Retry::stop(exn::Exn::from(ErrorKind::Download(format!("{origin} ({status})")))));
            }
            let response = response.error_for_status().or_raise(|| ErrorKind::Download(origin.to_string()))?;
            let bytes = response.bytes().await.or_raise(|| ErrorKind::Download(origin.to_string()))?;
            Ok(bytes.to_vec())
        })
        .await
    }

    async fn save_one(&self, category: &str, candidate: ImageCandidate) -> Result<ImgInfo> {
        let img = ImgInfo::new(category, candidate.origin, candidate.width, candidate.height);
        let data = self.download(&img.origin).await?;
        if data.is_empty() {
            exn::bail!(ErrorKind::Download(format!("{} (empty body)", img.origin)));
        }
        let path = self.target(category, &img);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Io)?;
        }
        tokio::fs::write(&path, &data).await.or_raise(|| ErrorKind::Io)?;
        Ok(img.with_file(path, data.len() as u64))
    }
}

#[async_trait]
impl ImageSaver for LocalSaver {
    async fn save_all(&self, category: &str, candidates: Vec<ImageCandidate>) -> Result<Vec<ImgInfo>> {
        tracing::debug!(category, count = candidates.len(), root = %self.root.display(), "Saving images");
        let mut saved = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let origin = candidate.origin.clone();
            match self.save_one(category, candidate).await {
                Ok(img) => saved.push(img),
                Err(err) => tracing::warn!(category, origin, error = ?err, "Skipping image that could not be saved"),
            }
        }
        Ok(saved)
    }
}

/// `{id}.{ext}`, with the extension taken from the URL path when it looks
/// like one.
fn file_name(id: &str, origin: &str) -> String {
    let path = origin.split(['?', '#']).next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    let extension = Path::new(last)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    format!("{id}.{extension}")
}
