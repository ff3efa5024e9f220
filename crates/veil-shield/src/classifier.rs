//! Request Classifier
//!
//! Decides block/allow for every outgoing request. This is the hot path:
//! no I/O, only set lookups and a bounded number of regex evaluations.
//!
//! Precedence:
//! 1. Disabled engine → allow
//! 2. Unparseable URL → allow (fail open)
//! 3. Loopback, user whitelist, essential domains → allow
//! 4. Exact domain → block
//! 5. Parent domain (label-aligned suffix) → block
//! 6. Built-in path patterns on `path + query` → block
//! 7. Ingested list patterns on the full lowercase URL → block
//! 8. Otherwise allow

use crate::allowlist::essential_match;
use crate::patterns::match_path_pattern;
use crate::rule_store::RuleStore;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{info, trace};
use url::{Host, Url};

/// Outcome of classifying one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Request may proceed
    Allow(AllowReason),
    /// Request should be cancelled by the caller
    Block(BlockReason),
}

impl Verdict {
    /// Whether the request should be cancelled
    #[inline]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Block(_))
    }
}

/// Why a request was allowed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AllowReason {
    /// Blocking is switched off
    Disabled,
    /// URL did not parse or has no host
    MalformedUrl,
    /// localhost / loopback address
    Loopback,
    /// Host was whitelisted by the user
    UserWhitelist,
    /// Host is covered by an essential-domain entry
    Essential(&'static str),
    /// No rule matched
    NoMatch,
}

/// Why a request was blocked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BlockReason {
    /// Host is in the domain set
    Domain(String),
    /// A parent of the host is in the domain set
    ParentDomain(String),
    /// Built-in path pattern
    PathPattern(String),
    /// Pattern ingested from a filter list
    ListPattern(String),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Domain(d) => write!(f, "domain: {}", d),
            Self::ParentDomain(d) => write!(f, "parent domain: {}", d),
            Self::PathPattern(p) => write!(f, "path pattern: {}", p),
            Self::ListPattern(p) => write!(f, "list pattern: {}", p),
        }
    }
}

/// Classification counters
#[derive(Debug, Default)]
struct ClassifierCounters {
    checked: AtomicU64,
    blocked: AtomicU64,
    total_check_time_ns: AtomicU64,
}

/// Snapshot of classification counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifierStats {
    pub checked: u64,
    pub blocked: u64,
    pub total_check_time_ns: u64,
}

/// Request classifier owning the enabled flag, block counter and user whitelist
pub struct Classifier {
    store: Arc<RuleStore>,
    enabled: AtomicBool,
    whitelist: RwLock<HashSet<String>>,
    counters: ClassifierCounters,
}

impl Classifier {
    /// Create an enabled classifier reading from `store`
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self {
            store,
            enabled: AtomicBool::new(true),
            whitelist: RwLock::new(HashSet::new()),
            counters: ClassifierCounters::default(),
        }
    }

    /// Classify a request URL. Never fails; malformed input is allowed.
    pub fn classify(&self, url: &str) -> Verdict {
        if !self.is_enabled() {
            return Verdict::Allow(AllowReason::Disabled);
        }

        let start = Instant::now();
        self.counters.checked.fetch_add(1, Ordering::Relaxed);

        let verdict = self.evaluate(url);

        let elapsed = start.elapsed().as_nanos() as u64;
        self.counters.total_check_time_ns.fetch_add(elapsed, Ordering::Relaxed);

        if let Verdict::Block(reason) = &verdict {
            self.counters.blocked.fetch_add(1, Ordering::Relaxed);
            trace!("Blocked [{}] {} ({} ns)", reason, url, elapsed);
        }
        verdict
    }

    /// Whether the request should be cancelled
    #[inline]
    pub fn should_block(&self, url: &str) -> bool {
        self.classify(url).is_blocked()
    }

    fn evaluate(&self, url: &str) -> Verdict {
        let Ok(parsed) = Url::parse(url) else {
            return Verdict::Allow(AllowReason::MalformedUrl);
        };
        let Some(host) = parsed.host_str() else {
            return Verdict::Allow(AllowReason::MalformedUrl);
        };
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return Verdict::Allow(AllowReason::MalformedUrl);
        }

        if is_loopback(&parsed) {
            return Verdict::Allow(AllowReason::Loopback);
        }
        if self.is_whitelisted(&host) {
            return Verdict::Allow(AllowReason::UserWhitelist);
        }
        if let Some(entry) = essential_match(&host) {
            return Verdict::Allow(AllowReason::Essential(entry));
        }

        if self.store.domains.contains(&host) {
            return Verdict::Block(BlockReason::Domain(host));
        }
        if let Some(parent) = self.store.domains.parent_match(&host) {
            return Verdict::Block(BlockReason::ParentDomain(parent.to_string()));
        }

        let path_and_query = match parsed.query() {
            Some(query) if !query.is_empty() => format!("{}?{}", parsed.path(), query),
            _ => parsed.path().to_string(),
        };
        if let Some(rule) = match_path_pattern(&path_and_query) {
            return Verdict::Block(BlockReason::PathPattern(rule.source().to_string()));
        }

        let full_url = parsed.as_str().to_lowercase();
        if let Some(source) = self.store.patterns.first_match(&full_url) {
            return Verdict::Block(BlockReason::ListPattern(source));
        }

        Verdict::Allow(AllowReason::NoMatch)
    }

    /// Enable or disable blocking
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        info!("Blocking {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Whether blocking is enabled
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Requests blocked since start (or since the last reset)
    pub fn blocked_count(&self) -> u64 {
        self.counters.blocked.load(Ordering::Relaxed)
    }

    /// Reset the block counter
    pub fn reset_count(&self) {
        self.counters.blocked.store(0, Ordering::Relaxed);
    }

    /// Whitelist a hostname. Returns `true` if it was not already present.
    pub fn add_whitelist(&self, host: &str) -> bool {
        let host = host.trim().to_ascii_lowercase();
        if host.is_empty() {
            return false;
        }
        self.whitelist
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host)
    }

    /// Remove a whitelisted hostname. Returns `true` if it was present.
    pub fn remove_whitelist(&self, host: &str) -> bool {
        self.whitelist
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&host.trim().to_ascii_lowercase())
    }

    /// Whether `host` (lowercase) was whitelisted by the user
    pub fn is_whitelisted(&self, host: &str) -> bool {
        self.whitelist
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(host)
    }

    /// Number of whitelisted hostnames
    pub fn whitelist_len(&self) -> usize {
        self.whitelist.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Counter snapshot
    pub fn stats(&self) -> ClassifierStats {
        ClassifierStats {
            checked: self.counters.checked.load(Ordering::Relaxed),
            blocked: self.counters.blocked.load(Ordering::Relaxed),
            total_check_time_ns: self.counters.total_check_time_ns.load(Ordering::Relaxed),
        }
    }

    /// Average classification time in nanoseconds
    pub fn avg_check_time_ns(&self) -> u64 {
        let stats = self.stats();
        if stats.checked == 0 {
            return 0;
        }
        stats.total_check_time_ns / stats.checked
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}
