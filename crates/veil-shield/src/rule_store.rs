//! Rule Store
//!
//! The three lookup structures shared by the classifier and the cosmetic
//! injector. Ingestion and cache loading are the only writers; every
//! collection only grows for the lifetime of the process.

use crate::cosmetic::CosmeticRuleMap;
use crate::domain_set::DomainRuleSet;
use crate::patterns::PatternRuleList;
use serde::Serialize;

/// Aggregate rule counts, for logging and the control surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuleCounts {
    pub domains: usize,
    pub patterns: usize,
    pub cosmetic_domains: usize,
    pub cosmetic_selectors: usize,
}

/// Domain set, pattern list and cosmetic map owned by one engine
#[derive(Debug, Default)]
pub struct RuleStore {
    pub domains: DomainRuleSet,
    pub patterns: PatternRuleList,
    pub cosmetic: CosmeticRuleMap,
}

impl RuleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rule counts
    pub fn counts(&self) -> RuleCounts {
        RuleCounts {
            domains: self.domains.len(),
            patterns: self.patterns.len(),
            cosmetic_domains: self.cosmetic.domain_count(),
            cosmetic_selectors: self.cosmetic.selector_count(),
        }
    }
}
