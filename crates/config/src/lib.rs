//! Layered configuration for the imgstock daemon.
//!
//! Sources, later ones winning:
//!
//! 1. built-in defaults,
//! 2. a configuration file (TOML, YAML or JSON, picked by extension),
//! 3. `IMGSTOCK_`-prefixed environment variables, with `__` separating nested
//!    keys (`IMGSTOCK_WATCHER__MAXIMUM_USES=5`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use imgstock_collect::CollectingMode;

const ENV_PREFIX: &str = "IMGSTOCK_";
const APPLICATION: &str = "imgstock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file backing the durable store.
    pub database: PathBuf,
    /// Where downloaded images go in files mode.
    pub root: PathBuf,
    /// Categories to keep stocked.
    pub categories: Vec<String>,
    /// Default `tracing` filter, overridden by `RUST_LOG`.
    pub log_level: String,
    pub watcher: WatcherConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub minimal_available: u64,
    pub maximum_uses: u64,
    pub collecting_mode: CollectingMode,
    /// Seconds between reconciliation passes. Replenishment runs at half
    /// that rate.
    pub check_interval: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// `host:port` of a Redis server. Empty (with `db = 0`) keeps the cache
    /// in-process.
    pub address: String,
    pub db: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Custom Search API key.
    pub key: String,
    /// Custom Search engine id.
    pub cx: String,
}

impl Default for Config {
    fn default() -> Self {
        let data = project_dirs().map(|dirs| dirs.data_dir().to_path_buf()).unwrap_or_default();
        Self {
            database: data.join("imgstock.db"),
            root: data.join("images"),
            categories: Vec::new(),
            log_level: "info".to_string(),
            watcher: WatcherConfig::default(),
            cache: CacheConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            minimal_available: 20,
            maximum_uses: 3,
            collecting_mode: CollectingMode::Urls,
            check_interval: 30,
        }
    }
}

impl WatcherConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }
}

impl CacheConfig {
    pub fn address(&self) -> Option<&str> {
        Some(self.address.trim()).filter(|a| !a.is_empty())
    }
}

impl Config {
    /// Load and validate configuration.
    ///
    /// An explicit `path` must exist. Without one, the per-user default
    /// location is read if present (see [`Config::default_path`]).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.display().to_string())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|p| p.is_file()),
        };
        let config = Self::figment(file.as_deref())?
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract::<Self>()
            .or_raise(|| ErrorKind::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// `{config dir}/imgstock.toml` for the current user.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(format!("{APPLICATION}.toml")))
    }

    /// Defaults merged with the file, environment not applied.
    fn figment(file: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let Some(file) = file else {
            return Ok(figment);
        };
        let extension = file
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        Ok(match extension.as_str() {
            "toml" => figment.merge(Toml::file(file)),
            "yaml" | "yml" => figment.merge(Yaml::file(file)),
            "json" => figment.merge(Json::file(file)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(file.display().to_string())),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            exn::bail!(ErrorKind::invalid("database", "must not be empty"));
        }
        if self.watcher.maximum_uses == 0 {
            exn::bail!(ErrorKind::invalid("watcher.maximum_uses", "must be > 0"));
        }
        if self.watcher.check_interval == 0 {
            exn::bail!(ErrorKind::invalid("watcher.check_interval", "must be > 0"));
        }
        if self.watcher.collecting_mode == CollectingMode::Files && self.root.as_os_str().is_empty() {
            exn::bail!(ErrorKind::invalid("root", "required in files mode"));
        }
        if self.search.key.trim().is_empty() || self.search.cx.trim().is_empty() {
            exn::bail!(ErrorKind::invalid("search", "key and cx must be provided"));
        }
        if self.categories.iter().any(|c| c.trim().is_empty()) {
            exn::bail!(ErrorKind::invalid("categories", "must not contain empty names"));
        }
        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APPLICATION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(&format!(".{extension}")).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn from_file(file: &Path) -> Result<Config> {
        let config: Config = Config::figment(Some(file))?.extract().or_raise(|| ErrorKind::Parse)?;
        config.validate()?;
        Ok(config)
    }

    const TOML: &str = r#"
        database = "/srv/imgstock/db.sqlite"
        categories = ["cats", "dogs"]

        [watcher]
        minimal_available = 5
        collecting_mode = "files"

        [search]
        key = "k"
        cx = "c"
    "#;

    #[test]
    fn test_toml_overrides_defaults() {
        let file = write_config("toml", TOML);
        let config = from_file(file.path()).unwrap();
        assert_eq!(config.database, PathBuf::from("/srv/imgstock/db.sqlite"));
        assert_eq!(config.categories, ["cats", "dogs"]);
        assert_eq!(config.watcher.minimal_available, 5);
        assert_eq!(config.watcher.collecting_mode, CollectingMode::Files);
        // Untouched keys keep their defaults.
        assert_eq!(config.watcher.maximum_uses, 3);
        assert_eq!(config.watcher.check_interval(), Duration::from_secs(30));
        assert_eq!(config.cache.address(), None);
        assert_eq!(config.log_level, "info");
    }

    #[rstest]
    #[case("yaml", "categories: [birds]\nsearch:\n  key: k\n  cx: c\n")]
    #[case("yml", "categories: [birds]\nsearch:\n  key: k\n  cx: c\n")]
    #[case("json", r#"{"categories": ["birds"], "search": {"key": "k", "cx": "c"}}"#)]
    fn test_other_formats(#[case] extension: &str, #[case] contents: &str) {
        let file = write_config(extension, contents);
        let config = from_file(file.path()).unwrap();
        assert_eq!(config.categories, ["birds"]);
        assert_eq!(config.search.key, "k");
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let file = write_config("toml", "[watcher]\ncollecting_mode = \"ftp\"\n[search]\nkey = \"k\"\ncx = \"c\"\n");
        let err = from_file(file.path()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Parse));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_config("ini", "key = value");
        let err = Config::figment(Some(file.path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    fn valid() -> Config {
        Config {
            search: SearchConfig { key: "k".to_string(), cx: "c".to_string() },
            ..Config::default()
        }
    }

    #[rstest]
    #[case::zero_uses(|c: &mut Config| c.watcher.maximum_uses = 0, "watcher.maximum_uses")]
    #[case::zero_interval(|c: &mut Config| c.watcher.check_interval = 0, "watcher.check_interval")]
    #[case::no_key(|c: &mut Config| c.search.key.clear(), "search")]
    #[case::blank_category(|c: &mut Config| c.categories.push(" ".to_string()), "categories")]
    #[case::no_database(|c: &mut Config| c.database = PathBuf::new(), "database")]
    fn test_validation(#[case] mutate: fn(&mut Config), #[case] expected: &str) {
        let mut config = valid();
        assert!(config.validate().is_ok());
        mutate(&mut config);
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid { field, .. } if *field == expected));
    }

    #[test]
    fn test_cache_address() {
        let cache = CacheConfig { address: " 10.0.0.1:6379 ".to_string(), db: 2 };
        assert_eq!(cache.address(), Some("10.0.0.1:6379"));
    }
}
