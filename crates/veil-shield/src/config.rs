//! Shield Configuration
//!
//! One explicit structure for everything the engine can be tuned with.
//! Every field has a default, so a config file only needs the keys it
//! changes. Loadable from TOML or JSON.

use crate::cosmetic::DEFAULT_MAX_SELECTOR_LEN;
use crate::scripts::DEFAULT_MAX_POPUPS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Peter Lowe's list: small and fast, used for the cold-start fetch
const PETER_LOWE_HOSTS: &str =
    "https://pgl.yoyo.org/adservers/serverlist.php?hostformat=hosts&showintro=0&mimetype=plaintext";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
}

/// A remote filter list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterListSource {
    /// Short name used in logs
    pub name: String,
    /// HTTP(S) location
    pub url: String,
}

impl FilterListSource {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// On-disk rule cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache file location
    pub path: PathBuf,
    /// Age after which the cache is ignored (seconds)
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Filter list downloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Whole-request timeout per source (seconds)
    pub timeout_secs: u64,
    /// Maximum accepted body size
    pub max_body_bytes: usize,
    /// User-Agent sent with list requests
    pub user_agent: String,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_body_bytes: 32 * 1024 * 1024,
            user_agent: format!("veil-shield/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Cosmetic injection limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CosmeticConfig {
    /// Selectors longer than this are dropped from stylesheets
    pub max_selector_len: usize,
    /// `window.open` calls allowed per page
    pub max_popups: u32,
}

impl Default for CosmeticConfig {
    fn default() -> Self {
        Self {
            max_selector_len: DEFAULT_MAX_SELECTOR_LEN,
            max_popups: DEFAULT_MAX_POPUPS,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    /// Lists fetched in the background on every start
    pub filter_lists: Vec<FilterListSource>,
    /// List fetched before `initialize()` returns when no cache is usable
    pub quick_source: Option<String>,
    /// Load the built-in tracker domains before anything else
    pub seed_builtin_domains: bool,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub cosmetic: CosmeticConfig,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            filter_lists: default_filter_lists(),
            quick_source: Some(PETER_LOWE_HOSTS.to_string()),
            seed_builtin_domains: true,
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            cosmetic: CosmeticConfig::default(),
        }
    }
}

impl ShieldConfig {
    /// Load from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a `.toml` or `.json` file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Configuration with no remote sources and the cache at `cache_path`
    pub fn offline(cache_path: PathBuf) -> Self {
        Self {
            filter_lists: Vec::new(),
            quick_source: None,
            cache: CacheConfig {
                path: cache_path,
                ..CacheConfig::default()
            },
            ..Self::default()
        }
    }
}

fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("cache"))
        .join("veil")
        .join("adblock-domains.json")
}

fn default_filter_lists() -> Vec<FilterListSource> {
    vec![
        FilterListSource::new("easylist", "https://easylist.to/easylist/easylist.txt"),
        FilterListSource::new("easyprivacy", "https://easylist.to/easylist/easyprivacy.txt"),
        FilterListSource::new("peter-lowe", PETER_LOWE_HOSTS),
        FilterListSource::new(
            "stevenblack",
            "https://raw.githubusercontent.com/StevenBlack/hosts/master/hosts",
        ),
        FilterListSource::new(
            "adguard-base",
            "https://raw.githubusercontent.com/AdguardTeam/FiltersRegistry/master/filters/filter_2_Base/filter.txt",
        ),
        FilterListSource::new(
            "adguard-tracking",
            "https://raw.githubusercontent.com/AdguardTeam/FiltersRegistry/master/filters/filter_3_Spyware/filter.txt",
        ),
        FilterListSource::new("fanboy-annoyance", "https://easylist.to/easylist/fanboy-annoyance.txt"),
        FilterListSource::new("urlhaus", "https://urlhaus.abuse.ch/downloads/hostfile/"),
    ]
}
