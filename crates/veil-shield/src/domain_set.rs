//! Domain Rule Set
//!
//! Exact-match set of blocked domains with a Bloom filter in front of it.
//! A hostname matches an entry when it equals the entry or when the entry
//! is a label-aligned suffix of it:
//!
//! ```text
//! a.b.example.com → b.example.com → example.com
//! ```
//!
//! Key properties:
//! - Entries are lowercase, never empty, never start with a dot
//! - The Bloom filter has no false negatives, so a miss skips the set probe
//! - Insertion is a monotonic union; nothing is removed while ingesting

use bloomfilter::Bloom;
use std::collections::HashSet;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// Default false positive rate for the prefilter
const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.001;

/// Default expected number of domains (merged hosts + ABP lists land around 200k)
const DEFAULT_EXPECTED_ITEMS: usize = 250_000;

/// Entries inserted per write-lock acquisition in `extend`
const EXTEND_CHUNK: usize = 4096;

/// Configuration for the Bloom prefilter
#[derive(Debug, Clone)]
pub struct BloomConfig {
    /// Expected number of blocked domains
    pub expected_items: usize,
    /// Acceptable false positive rate (0.0 - 1.0)
    pub false_positive_rate: f64,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            expected_items: DEFAULT_EXPECTED_ITEMS,
            false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE,
        }
    }
}

struct DomainIndex {
    exact: HashSet<String>,
    bloom: Bloom<[u8]>,
}

impl DomainIndex {
    #[inline]
    fn contains(&self, domain: &str) -> bool {
        self.bloom.check(domain.as_bytes()) && self.exact.contains(domain)
    }
}

/// Set of blocked domains, safe for concurrent insertion and lookup
pub struct DomainRuleSet {
    index: RwLock<DomainIndex>,
}

impl DomainRuleSet {
    /// Create an empty set with the default prefilter size
    pub fn new() -> Self {
        Self::with_config(BloomConfig::default())
    }

    /// Create an empty set with a custom prefilter size
    pub fn with_config(config: BloomConfig) -> Self {
        let bloom = Bloom::new_for_fp_rate(config.expected_items, config.false_positive_rate);

        debug!(
            "Domain prefilter sized for {} items at {:.2}% FP (~{} KB)",
            config.expected_items,
            config.false_positive_rate * 100.0,
            bloom.bitmap().len() / 8 / 1024
        );

        Self {
            index: RwLock::new(DomainIndex {
                exact: HashSet::with_capacity(config.expected_items),
                bloom,
            }),
        }
    }

    /// Add a domain. Returns `true` if it was not already present.
    ///
    /// Input is normalized first; anything that is not a plausible domain
    /// (empty, contains a path, port or whitespace) is rejected.
    pub fn insert(&self, domain: &str) -> bool {
        let Some(normalized) = normalize_domain(domain) else {
            return false;
        };

        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        if index.exact.contains(&normalized) {
            return false;
        }
        index.bloom.set(normalized.as_bytes());
        index.exact.insert(normalized)
    }

    /// Add many domains. Returns how many were new.
    ///
    /// Entries are normalized outside the lock and inserted in chunks, so
    /// lookups are only held up for one chunk at a time.
    pub fn extend<I, S>(&self, domains: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        let mut chunk = Vec::with_capacity(EXTEND_CHUNK);

        for domain in domains {
            if let Some(normalized) = normalize_domain(domain.as_ref()) {
                chunk.push(normalized);
            }
            if chunk.len() == EXTEND_CHUNK {
                added += self.insert_chunk(&mut chunk);
            }
        }
        added += self.insert_chunk(&mut chunk);

        if added > 0 {
            info!("Added {} blocked domains ({} total)", added, self.len());
        }
        added
    }

    fn insert_chunk(&self, chunk: &mut Vec<String>) -> usize {
        if chunk.is_empty() {
            return 0;
        }

        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for normalized in chunk.drain(..) {
            if index.exact.contains(&normalized) {
                continue;
            }
            index.bloom.set(normalized.as_bytes());
            index.exact.insert(normalized);
            added += 1;
        }
        added
    }

    /// Exact membership test. `domain` must already be lowercase.
    #[inline]
    pub fn contains(&self, domain: &str) -> bool {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(domain)
    }

    /// Find the first parent of `host` that is in the set.
    ///
    /// The full hostname and the bare TLD are not tested; callers check the
    /// full hostname with [`contains`](Self::contains) first.
    pub fn parent_match<'a>(&self, host: &'a str) -> Option<&'a str> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        parent_domains(host).find(|parent| index.contains(parent))
    }

    /// `true` if `host` or any of its parents is in the set
    pub fn matches(&self, host: &str) -> bool {
        self.contains(host) || self.parent_match(host).is_some()
    }

    /// Number of domains
    pub fn len(&self) -> usize {
        self.index.read().unwrap_or_else(PoisonError::into_inner).exact.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of every entry (used when persisting)
    pub fn snapshot(&self) -> Vec<String> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        let mut domains: Vec<String> = index.exact.iter().cloned().collect();
        domains.sort_unstable();
        domains
    }
}

impl Default for DomainRuleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DomainRuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainRuleSet")
            .field("len", &self.len())
            .finish()
    }
}

/// Normalize a domain for storage: trimmed, lowercase, no leading/trailing dots.
pub fn normalize_domain(domain: &str) -> Option<String> {
    let trimmed = domain.trim().trim_start_matches('.').trim_end_matches('.');

    if trimmed.is_empty()
        || trimmed.contains("..")
        || trimmed
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | ':' | '?' | '#' | '*' | '^'))
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

/// Parents of `host` formed by dropping leading labels, excluding the bare TLD.
///
/// `a.b.example.com` yields `b.example.com`, `example.com`.
pub fn parent_domains(host: &str) -> impl Iterator<Item = &str> {
    host.match_indices('.')
        .map(move |(i, _)| &host[i + 1..])
        .filter(|suffix| suffix.contains('.'))
}

/// `host` itself followed by its parents, excluding the bare TLD.
///
/// Single-label hosts (`localhost`) yield nothing.
pub fn domain_suffixes(host: &str) -> impl Iterator<Item = &str> {
    std::iter::once(host)
        .filter(|h| h.contains('.'))
        .chain(parent_domains(host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_parent_match() {
        let set = DomainRuleSet::new();
        set.insert("doubleclick.net");

        assert!(set.contains("doubleclick.net"));
        assert!(set.matches("ad.doubleclick.net"));
        assert_eq!(set.parent_match("a.b.doubleclick.net"), Some("doubleclick.net"));

        assert!(!set.matches("doubleclick.net.example.com"));
        assert!(!set.matches("notdoubleclick.net"));
    }

    #[test]
    fn test_parent_walk_skips_tld() {
        let set = DomainRuleSet::new();
        // A bare TLD entry can be inserted but must never match by suffix
        set.insert("com");
        assert!(set.parent_match("example.com").is_none());
        assert!(set.parent_match("a.example.com").is_none());
    }

    #[test]
    fn test_insert_normalizes() {
        let set = DomainRuleSet::new();
        assert!(set.insert("  .Tracker.Example. "));
        assert!(set.contains("tracker.example"));
        assert!(!set.insert("tracker.example"));

        assert!(!set.insert(""));
        assert!(!set.insert("facebook.com/tr"));
        assert!(!set.insert("host.com:8080"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_extend_counts_new_entries() {
        let set = DomainRuleSet::new();
        let added = set.extend(["a.com", "b.com", "a.com", "", "B.COM"]);
        assert_eq!(added, 2);
        assert_eq!(set.snapshot(), vec!["a.com".to_string(), "b.com".to_string()]);
    }

    #[test]
    fn test_extend_across_chunks() {
        let set = DomainRuleSet::new();
        let domains: Vec<String> = (0..EXTEND_CHUNK * 2 + 7).map(|i| format!("host{}.example", i)).collect();

        assert_eq!(set.extend(&domains), domains.len());
        assert_eq!(set.extend(&domains), 0);
        assert!(set.contains("host0.example"));
        assert!(set.contains(&format!("host{}.example", EXTEND_CHUNK * 2 + 6)));
    }

    #[test]
    fn test_lookups_not_starved_by_large_extend() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::{Arc, Barrier};
        use std::time::{Duration, Instant};

        let set = Arc::new(DomainRuleSet::new());
        set.insert("doubleclick.net");

        let done = Arc::new(AtomicBool::new(false));
        let ready = Arc::new(Barrier::new(2));

        let reader = {
            let (set, done, ready) = (set.clone(), done.clone(), ready.clone());
            std::thread::spawn(move || {
                assert!(set.matches("ad.doubleclick.net"));
                ready.wait();

                let mut worst = Duration::ZERO;
                while !done.load(Ordering::Acquire) {
                    let start = Instant::now();
                    assert!(set.matches("ad.doubleclick.net"));
                    worst = worst.max(start.elapsed());
                }
                worst
            })
        };

        let domains: Vec<String> = (0..200_000).map(|i| format!("ads{}.tracker{}.net", i, i % 97)).collect();
        ready.wait();
        let start = Instant::now();
        assert_eq!(set.extend(&domains), domains.len());
        let total = start.elapsed();
        done.store(true, Ordering::Release);

        let worst = reader.join().unwrap();
        println!("Worst lookup during extend: {:?} (extend took {:?})", worst, total);
        assert!(worst < total / 4, "lookup held for {:?} of a {:?} extend", worst, total);
    }

    #[test]
    fn test_suffix_iterators() {
        let parents: Vec<&str> = parent_domains("a.b.example.com").collect();
        assert_eq!(parents, vec!["b.example.com", "example.com"]);

        let all: Vec<&str> = domain_suffixes("sub.example.com").collect();
        assert_eq!(all, vec!["sub.example.com", "example.com"]);

        assert_eq!(domain_suffixes("localhost").count(), 0);
    }

    #[test]
    fn test_concurrent_insert() {
        use std::sync::Arc;

        let set = Arc::new(DomainRuleSet::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let set = Arc::clone(&set);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        set.insert(&format!("host{}.shard{}.com", i, t));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(set.len(), 1000);
    }
}
