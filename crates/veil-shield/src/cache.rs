//! Persistent Rule Cache
//!
//! One JSON document holding the domain set, the list pattern sources and
//! the cosmetic rules. Loading a fresh cache makes the engine ready on
//! restart without waiting for the network.
//!
//! A cache is ignored (never deleted) when it is missing, corrupt, written
//! by another schema version, or older than the TTL by either its file
//! modification time or its recorded timestamp. The next successful
//! refresh overwrites it.

use crate::rule_store::RuleStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Schema version written by this build
pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Error)]
enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema version {0} (expected {})", CACHE_VERSION)]
    VersionMismatch(u32),

    #[error("cache is {0:?} old")]
    Stale(Duration),
}

/// Result of a cache load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Merged into the store; counts of entries read
    Loaded {
        domains: usize,
        patterns: usize,
        selectors: usize,
    },
    Missing,
    Stale,
    Corrupt,
}

impl CacheStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheRecord {
    #[serde(default)]
    version: u32,
    /// Milliseconds since the Unix epoch
    timestamp: u64,
    #[serde(default)]
    domains: Vec<String>,
    #[serde(default)]
    pattern_sources: Vec<String>,
    #[serde(default)]
    cosmetic: CosmeticRecord,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CosmeticRecord {
    #[serde(default)]
    global: Vec<String>,
    #[serde(default)]
    domains: BTreeMap<String, Vec<String>>,
}

/// Rule cache at a fixed path
#[derive(Debug, Clone)]
pub struct PersistentCache {
    path: PathBuf,
    ttl: Duration,
}

impl PersistentCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the store to disk. Failures are logged and reported as `false`.
    pub async fn save(&self, store: &RuleStore) -> bool {
        let record = CacheRecord {
            version: CACHE_VERSION,
            timestamp: now_millis(),
            domains: store.domains.snapshot(),
            pattern_sources: store.patterns.sources(),
            cosmetic: CosmeticRecord {
                global: store.cosmetic.global_snapshot(),
                domains: store.cosmetic.domain_snapshot().into_iter().collect(),
            },
        };

        match self.write_record(&record).await {
            Ok(bytes) => {
                info!(
                    "Rule cache saved: {} domains, {} patterns ({} bytes) to {}",
                    record.domains.len(),
                    record.pattern_sources.len(),
                    bytes,
                    self.path.display()
                );
                true
            }
            Err(e) => {
                warn!("Failed to save rule cache {}: {}", self.path.display(), e);
                false
            }
        }
    }

    /// Merge a fresh cache into `store`
    pub async fn load(&self, store: &RuleStore) -> CacheStatus {
        let record = match self.read_record().await {
            Ok(record) => record,
            Err(CacheError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                debug!("No rule cache at {}", self.path.display());
                return CacheStatus::Missing;
            }
            Err(e @ (CacheError::Stale(_) | CacheError::VersionMismatch(_))) => {
                info!("Ignoring rule cache {}: {}", self.path.display(), e);
                return CacheStatus::Stale;
            }
            Err(e) => {
                warn!("Ignoring unreadable rule cache {}: {}", self.path.display(), e);
                return CacheStatus::Corrupt;
            }
        };

        store.domains.extend(record.domains.iter());
        store.patterns.extend(record.pattern_sources.iter());

        let mut selectors = 0usize;
        for selector in &record.cosmetic.global {
            store.cosmetic.insert_global(selector);
            selectors += 1;
        }
        for (domain, domain_selectors) in &record.cosmetic.domains {
            for selector in domain_selectors {
                store.cosmetic.insert_for_domain(domain, selector);
                selectors += 1;
            }
        }

        let status = CacheStatus::Loaded {
            domains: record.domains.len(),
            patterns: record.pattern_sources.len(),
            selectors,
        };
        info!("Rule cache loaded from {}: {:?}", self.path.display(), status);
        status
    }

    async fn read_record(&self) -> Result<CacheRecord, CacheError> {
        let metadata = tokio::fs::metadata(&self.path).await?;
        if let Ok(modified) = metadata.modified() {
            let age = SystemTime::now().duration_since(modified).unwrap_or_default();
            if age > self.ttl {
                return Err(CacheError::Stale(age));
            }
        }

        let bytes = tokio::fs::read(&self.path).await?;
        let record: CacheRecord = serde_json::from_slice(&bytes)?;

        if record.version != CACHE_VERSION {
            return Err(CacheError::VersionMismatch(record.version));
        }
        let age = Duration::from_millis(now_millis().saturating_sub(record.timestamp));
        if age > self.ttl {
            return Err(CacheError::Stale(age));
        }

        Ok(record)
    }

    async fn write_record(&self, record: &CacheRecord) -> Result<usize, CacheError> {
        let bytes = serde_json::to_vec(record)?;
        let len = bytes.len();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| CacheError::Io(std::io::Error::other(e)))??;
        Ok(len)
    }
}

/// Write through a uniquely named temp file in the target directory, then rename
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn populated_store() -> RuleStore {
        let store = RuleStore::new();
        store.domains.insert("ads.example.com");
        store.domains.insert("tracker.example.net");
        store.patterns.insert(r"^https?://[a-z]{8}\.xyz/");
        store.cosmetic.insert_global(".sponsored");
        store.cosmetic.insert_for_domain("news.example", "#promo");
        store
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::new(dir.path().join("nested/rules.json"), DAY);

        assert!(cache.save(&populated_store()).await);
        let entries = std::fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(entries, 1);

        let fresh = RuleStore::new();
        let status = cache.load(&fresh).await;
        assert_eq!(
            status,
            CacheStatus::Loaded {
                domains: 2,
                patterns: 1,
                selectors: 2
            }
        );
        assert!(fresh.domains.contains("ads.example.com"));
        assert!(fresh.domains.contains("tracker.example.net"));
        assert!(fresh.patterns.is_match("https://abcdefgh.xyz/script.js"));
        assert!(fresh.cosmetic.selectors_for("www.news.example").contains("#promo"));
        assert!(fresh.cosmetic.selectors_for("other.example").contains(".sponsored"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::new(dir.path().join("rules.json"), DAY);
        let store = std::sync::Arc::new(populated_store());

        let mut saves = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let (cache, store) = (cache.clone(), store.clone());
            saves.spawn(async move { cache.save(&store).await });
        }
        while let Some(saved) = saves.join_next().await {
            assert!(saved.unwrap());
        }

        assert!(cache.load(&RuleStore::new()).await.is_loaded());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::new(dir.path().join("none.json"), DAY);
        assert_eq!(cache.load(&RuleStore::new()).await, CacheStatus::Missing);
    }

    #[tokio::test]
    async fn test_stale_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        let old = now_millis() - 25 * 60 * 60 * 1000;
        std::fs::write(
            &path,
            format!(r#"{{"version":1,"timestamp":{old},"domains":["ads.example.com"],"patternSources":[]}}"#),
        )
        .unwrap();

        let store = RuleStore::new();
        assert_eq!(PersistentCache::new(&path, DAY).load(&store).await, CacheStatus::Stale);
        assert!(store.domains.is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_stale_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::new(dir.path().join("rules.json"), DAY);
        assert!(cache.save(&populated_store()).await);

        let file = std::fs::File::options().write(true).open(cache.path()).unwrap();
        file.set_modified(SystemTime::now() - 2 * DAY).unwrap();
        drop(file);

        assert_eq!(cache.load(&RuleStore::new()).await, CacheStatus::Stale);
    }

    #[tokio::test]
    async fn test_version_mismatch_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        let now = now_millis();

        std::fs::write(&path, format!(r#"{{"timestamp":{now},"domains":["a.example"],"patternSources":[]}}"#)).unwrap();
        assert_eq!(PersistentCache::new(&path, DAY).load(&RuleStore::new()).await, CacheStatus::Stale);

        std::fs::write(&path, format!(r#"{{"version":2,"timestamp":{now},"domains":[]}}"#)).unwrap();
        assert_eq!(PersistentCache::new(&path, DAY).load(&RuleStore::new()).await, CacheStatus::Stale);
    }

    #[tokio::test]
    async fn test_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, b"{\"version\":1,\"timestamp\":").unwrap();

        let store = RuleStore::new();
        assert_eq!(PersistentCache::new(&path, DAY).load(&store).await, CacheStatus::Corrupt);
        assert!(store.domains.is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let cache = PersistentCache::new(blocker.join("rules.json"), DAY);
        assert!(!cache.save(&populated_store()).await);
    }
}
