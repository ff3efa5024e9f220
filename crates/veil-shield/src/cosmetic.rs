//! Cosmetic Filtering
//!
//! Element-hiding selectors keyed by domain, plus the stylesheet compiler
//! used on every navigation. Nothing is cached per hostname: each call
//! walks the current rule map, which is cheap at navigation frequency.

use crate::domain_set::{domain_suffixes, normalize_domain};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::trace;

/// Declarations applied to every hidden selector
const HIDE_DECLARATIONS: &str =
    "display:none!important; visibility:hidden!important; height:0!important; overflow:hidden!important;";

/// Default upper bound on selector length
pub const DEFAULT_MAX_SELECTOR_LEN: usize = 200;

/// Extended-syntax markers that are not plain CSS
const NON_CSS_MARKERS: &[&str] = &[
    "+js(",
    ":has-text(",
    ":-abp-",
    ":style(",
    ":remove(",
    ":xpath(",
    ":upward(",
    ":matches-css",
    ":matches-path(",
    ":min-text-length(",
    ":watch-attr(",
];

/// Selectors hidden on every page regardless of filter lists
pub const DEFAULT_SELECTORS: &[&str] = &[
    r#"[id*="google_ads"]"#,
    r#"[id*="GoogleAds"]"#,
    r#"[class*="google-ad"]"#,
    r#"[id*="ad-slot"]"#,
    r#"[id*="ad_slot"]"#,
    r#"[class*="ad-slot"]"#,
    r#"[class*="ad-banner"]"#,
    r#"[class*="ad-container"]"#,
    r#"[class*="ad-wrapper"]"#,
    r#"[class*="adsbygoogle"]"#,
    "ins.adsbygoogle",
    r#"[id*="taboola"]"#,
    r#"[class*="taboola"]"#,
    r#"[id*="outbrain"]"#,
    r#"[class*="outbrain"]"#,
    "[data-ad]",
    "[data-ad-slot]",
    "[data-ad-client]",
    "[data-google-query-id]",
    r#"[aria-label="advertisement"]"#,
    r#"[aria-label="Advertisement"]"#,
    r#"[aria-label="Ads"]"#,
    r#"div[id^="div-gpt-ad"]"#,
    "div[data-dfp-ad]",
    r#"iframe[src*="doubleclick"]"#,
    r#"iframe[src*="googlesyndication"]"#,
    r#"iframe[id*="google_ads"]"#,
    "amp-ad",
    "amp-auto-ads",
    ".sponsored-content",
    ".promoted-content",
    r#"[class*="sponsor"]"#,
    // Cookie banners
    "#cookie-banner",
    "#cookie-consent",
    "#cookie-notice",
    r#"[class*="cookie-banner"]"#,
    r#"[class*="cookie-consent"]"#,
    r#"[class*="cookie-notice"]"#,
    r#"[id*="consent-banner"]"#,
    r#"[class*="consent-banner"]"#,
    "#gdpr-banner",
    r#"[class*="gdpr"]"#,
    // Newsletter popups
    r#"[class*="newsletter-popup"]"#,
    r#"[class*="subscribe-popup"]"#,
    r#"[class*="email-popup"]"#,
    // Floating share bars
    r#"[class*="share-bar"]"#,
    r#"[class*="social-share-float"]"#,
];

#[derive(Default)]
struct CosmeticIndex {
    global: HashSet<String>,
    by_domain: HashMap<String, HashSet<String>>,
}

/// Selector sets keyed by domain, plus a global set
#[derive(Default)]
pub struct CosmeticRuleMap {
    inner: RwLock<CosmeticIndex>,
}

impl CosmeticRuleMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a selector applied on every page. Returns `true` if new.
    pub fn insert_global(&self, selector: &str) -> bool {
        let selector = selector.trim();
        if selector.is_empty() {
            return false;
        }
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .global
            .insert(selector.to_string())
    }

    /// Add a selector for `domain` and its subdomains. Returns `true` if new.
    pub fn insert_for_domain(&self, domain: &str, selector: &str) -> bool {
        let selector = selector.trim();
        let Some(domain) = normalize_domain(domain) else {
            return false;
        };
        if selector.is_empty() {
            return false;
        }
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .by_domain
            .entry(domain)
            .or_default()
            .insert(selector.to_string())
    }

    /// Union of the global set and the sets of every suffix of `hostname`
    pub fn selectors_for(&self, hostname: &str) -> BTreeSet<String> {
        let index = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let host = hostname.trim().trim_end_matches('.').to_ascii_lowercase();

        let mut selectors: BTreeSet<String> = index.global.iter().cloned().collect();
        for suffix in domain_suffixes(&host) {
            if let Some(rules) = index.by_domain.get(suffix) {
                selectors.extend(rules.iter().cloned());
            }
        }
        selectors
    }

    /// Sorted copy of the global selectors
    pub fn global_snapshot(&self) -> Vec<String> {
        let index = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut global: Vec<String> = index.global.iter().cloned().collect();
        global.sort_unstable();
        global
    }

    /// Sorted copy of the per-domain selectors
    pub fn domain_snapshot(&self) -> Vec<(String, Vec<String>)> {
        let index = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut domains: Vec<(String, Vec<String>)> = index
            .by_domain
            .iter()
            .map(|(domain, selectors)| {
                let mut selectors: Vec<String> = selectors.iter().cloned().collect();
                selectors.sort_unstable();
                (domain.clone(), selectors)
            })
            .collect();
        domains.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        domains
    }

    /// Number of domains with specific rules
    pub fn domain_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_domain
            .len()
    }

    /// Total selectors across the global and per-domain sets
    pub fn selector_count(&self) -> usize {
        let index = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        index.global.len() + index.by_domain.values().map(HashSet::len).sum::<usize>()
    }
}

impl fmt::Debug for CosmeticRuleMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosmeticRuleMap")
            .field("domains", &self.domain_count())
            .field("selectors", &self.selector_count())
            .finish()
    }
}

/// Whether a selector from list data is safe to place in a stylesheet
pub fn is_safe_selector(selector: &str, max_len: usize) -> bool {
    if selector.is_empty() || selector.len() > max_len {
        return false;
    }
    if selector.contains(['{', '}', '<', ';']) {
        return false;
    }
    if NON_CSS_MARKERS.iter().any(|marker| selector.contains(marker)) {
        return false;
    }
    !has_unescaped_backslash(selector)
}

/// A backslash is accepted only when it escapes `.`, `#`, `:`, `[` or `]`
fn has_unescaped_backslash(selector: &str) -> bool {
    let mut chars = selector.chars();
    while let Some(c) = chars.next() {
        if c == '\\' && !matches!(chars.next(), Some('.' | '#' | ':' | '[' | ']')) {
            return true;
        }
    }
    false
}

/// Build the hiding stylesheet for `hostname`.
///
/// Returns an empty string when nothing applies; callers skip injection then.
pub fn compile_stylesheet(rules: &CosmeticRuleMap, hostname: &str, max_selector_len: usize) -> String {
    let mut selectors = rules.selectors_for(hostname);
    selectors.extend(DEFAULT_SELECTORS.iter().map(|s| s.to_string()));

    let mut css = String::new();
    let mut dropped = 0usize;
    for selector in &selectors {
        if !is_safe_selector(selector, max_selector_len) {
            dropped += 1;
            continue;
        }
        css.push_str(selector);
        css.push_str(" { ");
        css.push_str(HIDE_DECLARATIONS);
        css.push_str(" }\n");
    }

    trace!(
        "Cosmetic sheet for {}: {} selectors ({} dropped)",
        hostname,
        selectors.len() - dropped,
        dropped
    );
    css
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_of_global_and_ancestors() {
        let rules = CosmeticRuleMap::new();
        rules.insert_global(".global-ad");
        rules.insert_for_domain("example.com", ".example-promo");
        rules.insert_for_domain("deep.sub.example.com", ".deep-only");

        let sub = rules.selectors_for("sub.example.com");
        assert!(sub.contains(".global-ad"));
        assert!(sub.contains(".example-promo"));
        assert!(!sub.contains(".deep-only"));

        let other = rules.selectors_for("other.com");
        assert_eq!(other.into_iter().collect::<Vec<_>>(), vec![".global-ad".to_string()]);
    }

    #[test]
    fn test_dedup_per_key() {
        let rules = CosmeticRuleMap::new();
        assert!(rules.insert_for_domain("Example.com", ".x"));
        assert!(!rules.insert_for_domain("example.com", ".x"));
        assert!(rules.insert_global(".x"));
        assert!(!rules.insert_global(".x"));
        assert_eq!(rules.selector_count(), 2);
    }

    #[test]
    fn test_stylesheet_contents() {
        let rules = CosmeticRuleMap::new();
        rules.insert_global(".global-ad");
        rules.insert_for_domain("example.com", ".example-promo");

        let css = compile_stylesheet(&rules, "sub.example.com", DEFAULT_MAX_SELECTOR_LEN);
        assert!(css.contains(".global-ad { display:none!important;"));
        assert!(css.contains(".example-promo {"));
        assert!(css.contains("ins.adsbygoogle {"));

        let other = compile_stylesheet(&rules, "other.com", DEFAULT_MAX_SELECTOR_LEN);
        assert!(other.contains(".global-ad {"));
        assert!(!other.contains(".example-promo"));
    }

    #[test]
    fn test_unsafe_selectors_dropped() {
        let rules = CosmeticRuleMap::new();
        rules.insert_global(r"div\ad");
        rules.insert_global(r"#foo\.bar");
        rules.insert_global("body { color: red } .x");
        rules.insert_global("+js(set-constant, x, 1)");
        rules.insert_global(&format!(".{}", "a".repeat(250)));

        let css = compile_stylesheet(&rules, "example.com", DEFAULT_MAX_SELECTOR_LEN);
        assert!(!css.contains(r"div\ad"));
        assert!(css.contains(r"#foo\.bar {"));
        assert!(!css.contains("color: red"));
        assert!(!css.contains("+js("));
        assert!(!css.contains(&"a".repeat(250)));
    }

    #[test]
    fn test_backslash_rules() {
        assert!(!has_unescaped_backslash(r"a\:b"));
        assert!(has_unescaped_backslash(r"a\b"));
        assert!(has_unescaped_backslash("trailing\\"));
    }
}
