//! URL Pattern Rules
//!
//! Case-insensitive regular expressions matched against request URLs.
//! Two sources feed the classifier:
//! - Built-in path patterns, tested against `pathname + search`
//! - Ingested list patterns, tested against the full lowercase URL
//!
//! `fancy_regex` is used because several built-in patterns rely on
//! negative lookahead (`/ads/` but not `/ads/assets`).

use fancy_regex::Regex;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

/// Built-in path patterns, in evaluation order
const PATH_PATTERN_SOURCES: &[&str] = &[
    r"/ads/(?!assets)",
    r"/ad/(?!min|vanced)",
    r"/advert[is]",
    r"/banner[s]?/\d",
    r"/sponsor[ed]",
    r"/tracking[./?]",
    r"/tracker[./?]",
    r"/pixel[./?]",
    r"/beacon[./?]",
    r"/analytics\.js",
    r"/ga\.js$",
    r"/gtag/js",
    r"/gtm\.js",
    r"/fbevents\.js",
    r"/pagead/",
    r"/adsbygoogle\.js",
    r"/show_ads",
    r"/doubleclick/",
    r"/prebid[.-]",
    r"/adsense/",
    r"/adserver/",
    r"/admanager/",
    r"/ad_click",
    r"/ad_impression",
    r"/popunder[./?]",
    r"/popup_handler",
    r"/piwik\.js",
    r"/matomo\.js",
    r"collect\?.*tid=UA-",
];

/// Compiled built-in path patterns
static PATH_PATTERNS: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    PATH_PATTERN_SOURCES
        .iter()
        .filter_map(|source| match PatternRule::new(source) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!("Built-in path pattern '{}' failed to compile: {}", source, e);
                None
            }
        })
        .collect()
});

/// A single case-insensitive pattern rule
#[derive(Clone)]
pub struct PatternRule {
    /// Source text as written in the filter list (no flags)
    source: String,
    regex: Regex,
}

impl PatternRule {
    /// Compile a rule from its source. Matching is always case-insensitive.
    pub fn new(source: &str) -> Result<Self, fancy_regex::Error> {
        let regex = Regex::new(&format!("(?i){}", source))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Source text of the rule
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Test the rule against `haystack`.
    ///
    /// Backtracking limits surface as errors in `fancy_regex`; those count
    /// as a non-match.
    #[inline]
    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack).unwrap_or(false)
    }
}

impl fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PatternRule({})", self.source)
    }
}

/// First built-in path pattern matching `path_and_query`
pub fn match_path_pattern(path_and_query: &str) -> Option<&'static PatternRule> {
    PATH_PATTERNS.iter().find(|rule| rule.is_match(path_and_query))
}

/// Number of built-in path patterns
pub fn path_pattern_count() -> usize {
    PATH_PATTERNS.len()
}

#[derive(Default)]
struct PatternIndex {
    rules: Vec<PatternRule>,
    sources: HashSet<String>,
}

/// Ordered list of ingested pattern rules, deduplicated by source
#[derive(Default)]
pub struct PatternRuleList {
    inner: RwLock<PatternIndex>,
}

impl PatternRuleList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and append a rule.
    ///
    /// Returns `false` for duplicates and for sources that do not compile.
    pub fn insert(&self, source: &str) -> bool {
        let source = source.trim();
        if source.is_empty() {
            return false;
        }

        {
            let index = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            if index.sources.contains(source) {
                return false;
            }
        }

        let rule = match PatternRule::new(source) {
            Ok(rule) => rule,
            Err(e) => {
                debug!("Skipping pattern '{}': {}", source, e);
                return false;
            }
        };

        let mut index = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !index.sources.insert(source.to_string()) {
            return false;
        }
        index.rules.push(rule);
        true
    }

    /// Append many rules. Returns how many were new.
    pub fn extend<I, S>(&self, sources: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        sources
            .into_iter()
            .filter(|source| self.insert(source.as_ref()))
            .count()
    }

    /// Source of the first rule matching `url`, tested in insertion order
    pub fn first_match(&self, url: &str) -> Option<String> {
        let index = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        index
            .rules
            .iter()
            .find(|rule| rule.is_match(url))
            .map(|rule| rule.source.clone())
    }

    /// Whether any rule matches `url`
    pub fn is_match(&self, url: &str) -> bool {
        let index = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        index.rules.iter().any(|rule| rule.is_match(url))
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).rules.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rule sources in insertion order (used when persisting)
    pub fn sources(&self) -> Vec<String> {
        let index = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        index.rules.iter().map(|rule| rule.source.clone()).collect()
    }
}

impl fmt::Debug for PatternRuleList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRuleList")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtin_patterns_compile() {
        assert_eq!(path_pattern_count(), PATH_PATTERN_SOURCES.len());
    }

    #[test]
    fn test_pagead_boundary() {
        assert!(match_path_pattern("/pagead/show?id=9").is_some());
        assert!(match_path_pattern("/my-pagead-notes/show").is_none());
    }

    #[test]
    fn test_lookahead_exclusions() {
        assert!(match_path_pattern("/ads/banner.png").is_some());
        assert!(match_path_pattern("/ads/assets/logo.png").is_none());

        assert!(match_path_pattern("/ad/slot").is_some());
        assert!(match_path_pattern("/ad/min/index").is_none());
        assert!(match_path_pattern("/ad/vanced/search").is_none());
        assert!(match_path_pattern("/admin/users").is_none());
    }

    #[test]
    fn test_case_insensitive_and_anchors() {
        assert!(match_path_pattern("/static/GA.JS").is_some());
        // `$` anchors to the end of path+query
        assert!(match_path_pattern("/static/ga.js?v=2").is_none());
        assert!(match_path_pattern("/j/collect?v=1&tid=UA-1234-1").is_some());
    }

    #[test]
    fn test_list_dedup_and_order() {
        let list = PatternRuleList::new();
        assert!(list.insert(r"^https?://[a-z]{8}\.com/"));
        assert!(!list.insert(r"^https?://[a-z]{8}\.com/"));
        assert!(list.insert(r"banner\d+\.gif"));
        assert!(!list.insert("(unclosed"));

        assert_eq!(list.len(), 2);
        assert_eq!(
            list.first_match("http://abcdefgh.com/x").as_deref(),
            Some(r"^https?://[a-z]{8}\.com/")
        );
        assert!(list.is_match("https://cdn.site/BANNER12.GIF"));
        assert!(!list.is_match("https://example.org/"));
    }
}
