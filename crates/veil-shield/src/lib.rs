//! Veil Shield
//!
//! Ad and tracker blocking for the Veil browser shell.
//!
//! Architecture:
//! 1. Filter lists are downloaded and parsed into a shared rule store
//!    (domain set, list patterns, cosmetic selectors)
//! 2. Each outgoing request is classified against the store; the essential
//!    allowlist always wins over blocking rules
//! 3. Each navigation gets a hiding stylesheet and, on known video sites,
//!    an in-page ad script
//! 4. The store is cached on disk so restarts are protected immediately

mod allowlist;
mod cache;
mod classifier;
mod client;
mod config;
mod cosmetic;
mod domain_set;
mod engine;
mod filter_list;
mod ingest;
mod patterns;
mod privacy;
mod rule_store;
mod scripts;

#[cfg(test)]
mod test_support;

pub use allowlist::{essential_match, is_essential};
pub use cache::{CACHE_VERSION, CacheStatus, PersistentCache};
pub use classifier::{AllowReason, BlockReason, Classifier, ClassifierStats, Verdict};
pub use client::{FetchError, HttpClient, HttpClientConfig};
pub use config::{CacheConfig, ConfigError, CosmeticConfig, FetchConfig, FilterListSource, ShieldConfig};
pub use cosmetic::{CosmeticRuleMap, DEFAULT_SELECTORS, compile_stylesheet, is_safe_selector};
pub use domain_set::{BloomConfig, DomainRuleSet, normalize_domain};
pub use engine::{InitReport, QuickFetch, Shield, ShieldStats};
pub use filter_list::{ListRule, ParseStats, classify_line, default_tracking_domains, parse};
pub use ingest::{IngestSummary, Ingestor};
pub use patterns::{PatternRule, PatternRuleList};
pub use privacy::{GENERIC_USER_AGENT, has_tracking_params, sanitize_request_headers};
pub use rule_store::{RuleCounts, RuleStore};
pub use scripts::{KnownSite, behavioral_script_for, page_cleanup_script};
