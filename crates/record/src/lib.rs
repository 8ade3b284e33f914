//! The unit of inventory.
//!
//! An [`ImgInfo`] is created by a collector, lands in the volatile cache,
//! gets flushed to the durable store, and is read (and counted) many times
//! after that. It carries no behaviour beyond identity derivation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single image known to the inventory.
///
/// `(id, category)` is unique, and a record never changes category. `uses` is
/// both the ranking key for least-used selection and the availability gate
/// (a record is available while `uses < maximum_uses`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImgInfo {
    /// BLAKE3 hash (hex) of the origin URL, see [`ImgInfo::id_for`].
    pub id: String,
    /// Category key, e.g. "cats".
    pub category: String,
    /// Source URL the image was found at.
    pub origin: String,
    /// Local file, only set when the collector persisted the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    /// Size in bytes of the local file (0 when not downloaded).
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub uses: u64,
}

impl ImgInfo {
    /// Create a fresh, never used record for an image found at `origin`.
    pub fn new(category: impl Into<String>, origin: impl Into<String>, width: u32, height: u32) -> Self {
        let origin = origin.into();
        Self {
            id: Self::id_for(&origin),
            category: category.into(),
            origin,
            path: None,
            width,
            height,
            file_size: 0,
            uses: 0,
        }
    }

    /// Derive the stable identifier of an image from its origin URL.
    pub fn id_for(origin: impl AsRef<str>) -> String {
        blake3::hash(origin.as_ref().as_bytes()).to_hex().to_string()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, file_size: u64) -> Self {
        self.path = Some(path.into());
        self.file_size = file_size;
        self
    }

    pub fn with_uses(mut self, uses: u64) -> Self {
        self.uses = uses;
        self
    }

    /// Whether this record can still be handed out under the given ceiling.
    pub fn is_available(&self, maximum_uses: u64) -> bool {
        self.uses < maximum_uses
    }

    /// Records collected in "files" mode whose download never completed.
    pub fn is_empty_file(&self) -> bool {
        self.path.as_ref().is_none_or(|p| p.as_os_str().is_empty()) || self.file_size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_id_is_stable_and_hex() {
        let a = ImgInfo::id_for("https://example.com/cat.jpg");
        let b = ImgInfo::id_for("https://example.com/cat.jpg");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, ImgInfo::id_for("https://example.com/dog.jpg"));
    }

    #[test]
    fn test_new_record_is_unused() {
        let img = ImgInfo::new("cats", "https://example.com/cat.jpg", 640, 480);
        assert_eq!(img.uses, 0);
        assert_eq!(img.category, "cats");
        assert_eq!(img.id, ImgInfo::id_for("https://example.com/cat.jpg"));
        assert!(img.path.is_none());
    }

    #[rstest]
    #[case(0, 3, true)]
    #[case(2, 3, true)]
    #[case(3, 3, false)]
    #[case(7, 3, false)]
    #[case(0, 0, false)]
    fn test_availability(#[case] uses: u64, #[case] maximum: u64, #[case] expected: bool) {
        let img = ImgInfo::new("cats", "https://example.com/cat.jpg", 1, 1).with_uses(uses);
        assert_eq!(img.is_available(maximum), expected);
    }

    #[rstest]
    #[case(None, 0, true)]
    #[case(Some(""), 100, true)]
    #[case(Some("cats/a.jpg"), 0, true)]
    #[case(Some("cats/a.jpg"), 100, false)]
    fn test_empty_file(#[case] path: Option<&str>, #[case] size: u64, #[case] expected: bool) {
        let mut img = ImgInfo::new("cats", "https://example.com/cat.jpg", 1, 1);
        img.path = path.map(PathBuf::from);
        img.file_size = size;
        assert_eq!(img.is_empty_file(), expected);
    }

    #[test]
    fn test_url_record_omits_path_in_json() {
        let img = ImgInfo::new("cats", "https://example.com/cat.jpg", 10, 20);
        let json = serde_json::to_string(&img).unwrap();
        assert!(!json.contains("\"path\""));
        let back: ImgInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, img);
    }
}
