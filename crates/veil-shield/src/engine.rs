//! Shield Engine
//!
//! The facade a host shell talks to. Owns the rule store and wires the
//! classifier, cosmetic injector, ingestor and cache around it.
//!
//! Startup (`initialize`):
//! 1. Seed the built-in tracker domains
//! 2. Merge the on-disk cache if it is fresh
//! 3. Start refreshing every configured list in the background
//! 4. Without a usable cache, fetch one small list before returning
//! 5. Report aggregate counts
//!
//! `should_block` and `cosmetic_css_for` never fail and never do I/O.

use crate::cache::{CacheStatus, PersistentCache};
use crate::classifier::{Classifier, Verdict};
use crate::client::HttpClient;
use crate::config::ShieldConfig;
use crate::cosmetic::compile_stylesheet;
use crate::filter_list::default_tracking_domains;
use crate::ingest::{IngestSummary, Ingestor};
use crate::rule_store::{RuleCounts, RuleStore};
use crate::scripts;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// What the synchronous cold-start fetch did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickFetch {
    /// A fresh cache was loaded, or no quick source is configured
    Skipped,
    Added(usize),
    Failed(String),
}

/// Summary of `initialize()`, for logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitReport {
    /// Built-in domains that were new to the store
    pub seeded: usize,
    pub cache: CacheStatus,
    pub quick_fetch: QuickFetch,
    /// Whether a background refresh was started
    pub refresh_started: bool,
    pub rules: RuleCounts,
    pub elapsed_ms: u64,
}

/// Control-surface snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShieldStats {
    pub enabled: bool,
    pub initialized: bool,
    pub rules: RuleCounts,
    pub blocked: u64,
    pub checked: u64,
    pub avg_check_time_ns: u64,
    pub whitelisted: usize,
}

/// Ad and tracker blocking engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Shield {
    inner: Arc<ShieldInner>,
}

struct ShieldInner {
    config: ShieldConfig,
    store: Arc<RuleStore>,
    classifier: Classifier,
    ingestor: Ingestor,
    cache: PersistentCache,
    initialized: AtomicBool,
    init: Mutex<Option<InitReport>>,
    refresh: Mutex<Option<JoinHandle<IngestSummary>>>,
}

impl ShieldInner {
    async fn refresh(&self) -> IngestSummary {
        let summary = self.ingestor.fetch_all(&self.config.filter_lists).await;

        if summary.any_succeeded() {
            self.cache.save(&self.store).await;
        } else if !self.config.filter_lists.is_empty() {
            warn!("No filter list could be fetched; cache left untouched");
        }
        summary
    }
}

impl Shield {
    pub fn new(config: ShieldConfig) -> Self {
        let store = Arc::new(RuleStore::new());
        let client = HttpClient::new((&config.fetch).into());
        let cache = PersistentCache::new(config.cache.path.clone(), config.cache.ttl());

        Self {
            inner: Arc::new(ShieldInner {
                classifier: Classifier::new(store.clone()),
                ingestor: Ingestor::new(client, store.clone()),
                cache,
                store,
                config,
                initialized: AtomicBool::new(false),
                init: Mutex::new(None),
                refresh: Mutex::new(None),
            }),
        }
    }

    /// Bring the engine up. Calling it again returns the first report.
    pub async fn initialize(&self) -> InitReport {
        let mut init = self.inner.init.lock().await;
        if let Some(report) = init.as_ref() {
            return report.clone();
        }

        let start = Instant::now();
        let inner = &self.inner;

        let seeded = if inner.config.seed_builtin_domains {
            inner.store.domains.extend(default_tracking_domains())
        } else {
            0
        };

        let cache = inner.cache.load(&inner.store).await;

        let refresh_started = !inner.config.filter_lists.is_empty();
        if refresh_started {
            let background = inner.clone();
            let handle = tokio::spawn(async move { background.refresh().await });
            *inner.refresh.lock().await = Some(handle);
        }

        let quick_fetch = match (&inner.config.quick_source, cache.is_loaded()) {
            (Some(url), false) => match inner.ingestor.fetch_list(url).await {
                Ok(added) => QuickFetch::Added(added),
                Err(e) => {
                    warn!("Quick filter list failed: {}", e);
                    QuickFetch::Failed(e.to_string())
                }
            },
            _ => QuickFetch::Skipped,
        };

        let report = InitReport {
            seeded,
            cache,
            quick_fetch,
            refresh_started,
            rules: inner.store.counts(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Shield ready: {} domains, {} patterns, {} cosmetic selectors in {}ms (cache: {:?})",
            report.rules.domains,
            report.rules.patterns,
            report.rules.cosmetic_selectors,
            report.elapsed_ms,
            report.cache
        );

        *init = Some(report.clone());
        inner.initialized.store(true, Ordering::Release);
        report
    }

    /// Fetch every configured list now and save the cache if any succeeded
    pub async fn refresh(&self) -> IngestSummary {
        self.inner.refresh().await
    }

    /// Wait for the background refresh started by `initialize()`.
    ///
    /// `None` if no refresh is pending or it was already awaited.
    pub async fn wait_for_refresh(&self) -> Option<IngestSummary> {
        let handle = self.inner.refresh.lock().await.take()?;
        match handle.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Background refresh did not complete: {}", e);
                None
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Whether the request should be cancelled
    #[inline]
    pub fn should_block(&self, url: &str) -> bool {
        self.inner.classifier.should_block(url)
    }

    /// Verdict with the rule responsible
    pub fn classify(&self, url: &str) -> Verdict {
        self.inner.classifier.classify(url)
    }

    /// Hiding stylesheet for a page on `hostname`; empty when nothing applies
    pub fn cosmetic_css_for(&self, hostname: &str) -> String {
        if !self.is_enabled() {
            return String::new();
        }
        compile_stylesheet(
            &self.inner.store.cosmetic,
            hostname,
            self.inner.config.cosmetic.max_selector_len,
        )
    }

    /// Site-specific ad script for `hostname`, if there is one
    pub fn behavioral_script_for(&self, hostname: &str) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        scripts::behavioral_script_for(hostname, self.inner.config.cosmetic.max_popups)
    }

    /// Generic ad-node cleanup for every page
    pub fn page_cleanup_script(&self) -> Option<String> {
        self.is_enabled()
            .then(|| scripts::page_cleanup_script(self.inner.config.cosmetic.max_popups))
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.classifier.set_enabled(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.classifier.is_enabled()
    }

    pub fn blocked_count(&self) -> u64 {
        self.inner.classifier.blocked_count()
    }

    pub fn reset_count(&self) {
        self.inner.classifier.reset_count();
    }

    /// Never block requests to `host`. Returns `true` if newly added.
    pub fn add_whitelist(&self, host: &str) -> bool {
        self.inner.classifier.add_whitelist(host)
    }

    pub fn remove_whitelist(&self, host: &str) -> bool {
        self.inner.classifier.remove_whitelist(host)
    }

    pub fn stats(&self) -> ShieldStats {
        let classifier = &self.inner.classifier;
        let counters = classifier.stats();

        ShieldStats {
            enabled: classifier.is_enabled(),
            initialized: self.is_initialized(),
            rules: self.inner.store.counts(),
            blocked: counters.blocked,
            checked: counters.checked,
            avg_check_time_ns: classifier.avg_check_time_ns(),
            whitelisted: classifier.whitelist_len(),
        }
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.inner.store
    }
}

impl std::fmt::Debug for Shield {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shield")
            .field("enabled", &self.is_enabled())
            .field("rules", &self.inner.store.counts())
            .finish_non_exhaustive()
    }
}
