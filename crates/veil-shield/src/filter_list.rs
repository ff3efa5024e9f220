//! Filter List Parser
//!
//! Parses third-party filter lists into the rule store.
//! Supports, in detection order:
//! - Hosts files: `0.0.0.0 domain.com` / `127.0.0.1 domain.com`
//! - Adblock Plus domain rules: `||domain.com^`
//! - Bare domain lines: `domain.com`
//! - Element hiding: `domain.com,other.org##.selector` and `##.generic`
//! - Adblock Plus regex rules: `/^https?:\/\/[a-z]{8}\.com\//`
//! - Comments: `!`, `#` or `[Adblock Plus ...]`
//!
//! Unrecognized lines are skipped silently; a bad list only means fewer
//! rules, never an error.

use crate::rule_store::RuleStore;
use fancy_regex::Regex;
use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::debug;

static ADBLOCK_DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\|\|([a-z0-9._-]+)\^").expect("static pattern is valid")
});

static BARE_DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z0-9][a-z0-9._-]*\.[a-z]{2,}$").expect("static pattern is valid")
});

static COSMETIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^#]*?)##(.+)$").expect("static pattern is valid"));

/// Characters that mark a `/.../` line as a real regular expression rather
/// than a path fragment such as `/ads/`
const REGEX_STRUCTURE: &[char] = &['\\', '[', '(', '|', '^', '$', '{'];

/// A rule recognized on a single line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRule {
    /// `0.0.0.0 domain` or `127.0.0.1 domain`
    HostsEntry(String),
    /// `||domain^`
    AdblockDomain(String),
    /// `domain.tld`
    BareDomain(String),
    /// `domains##selector`; an empty domain list means the selector is global
    Cosmetic {
        domains: Vec<String>,
        selector: String,
    },
    /// `/regex/`
    Pattern(String),
}

/// Per-kind line counts from one parse pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub lines: usize,
    pub hosts: usize,
    pub adblock_domains: usize,
    pub bare_domains: usize,
    pub cosmetic: usize,
    pub patterns: usize,
    pub ignored: usize,
    /// Entries that were not already in the store
    pub added: usize,
}

/// Whether a trimmed line is a comment
fn is_comment(line: &str) -> bool {
    line.starts_with('!')
        || line.starts_with('[')
        || (line.starts_with('#') && !line.starts_with("##"))
}

/// Recognize one line. Returns `None` for comments and anything unsupported.
pub fn classify_line(raw: &str) -> Option<ListRule> {
    let line = raw.trim();
    if line.is_empty() || is_comment(line) {
        return None;
    }

    // Hosts file format
    if let Some(rest) = line
        .strip_prefix("0.0.0.0")
        .or_else(|| line.strip_prefix("127.0.0.1"))
    {
        if rest.starts_with(char::is_whitespace) {
            let domain = rest.split_whitespace().next()?.to_ascii_lowercase();
            if domain == "localhost"
                || domain == "local"
                || !domain.contains('.')
                || domain.starts_with('#')
            {
                return None;
            }
            return Some(ListRule::HostsEntry(domain));
        }
    }

    // Adblock Plus domain rule; a `||` line never falls through to other formats
    if line.starts_with("||") && line.contains('^') {
        let caps = ADBLOCK_DOMAIN.captures(line).ok().flatten()?;
        let domain = caps.get(1)?.as_str().to_ascii_lowercase();
        if !domain.contains('.') {
            return None;
        }
        return Some(ListRule::AdblockDomain(domain));
    }

    if BARE_DOMAIN.is_match(line).unwrap_or(false) {
        return Some(ListRule::BareDomain(line.to_ascii_lowercase()));
    }

    if let Some(caps) = COSMETIC.captures(line).ok().flatten() {
        let selector = caps.get(2)?.as_str().trim().to_string();
        let left = caps.get(1).map_or("", |m| m.as_str());

        // `~domain` exceptions are dropped rather than applied
        let domains: Vec<String> = left
            .split(',')
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty() && !d.starts_with('~'))
            .collect();

        if !left.trim().is_empty() && domains.is_empty() {
            return None;
        }
        return Some(ListRule::Cosmetic { domains, selector });
    }

    if line.len() > 2 && line.starts_with('/') && line.ends_with('/') {
        // `\/` is how list authors write a literal slash
        let body = line[1..line.len() - 1].replace(r"\/", "/");
        if body.contains(REGEX_STRUCTURE) {
            return Some(ListRule::Pattern(body));
        }
    }

    None
}

/// Parse a whole list into `store`.
///
/// Parsing the same text twice leaves the store unchanged the second time.
pub fn parse(text: &str, store: &RuleStore) -> ParseStats {
    let mut stats = ParseStats::default();
    let mut domains: Vec<String> = Vec::new();

    for line in text.lines() {
        stats.lines += 1;

        match classify_line(line) {
            Some(ListRule::HostsEntry(domain)) => {
                stats.hosts += 1;
                domains.push(domain);
            }
            Some(ListRule::AdblockDomain(domain)) => {
                stats.adblock_domains += 1;
                domains.push(domain);
            }
            Some(ListRule::BareDomain(domain)) => {
                stats.bare_domains += 1;
                domains.push(domain);
            }
            Some(ListRule::Cosmetic { domains: targets, selector }) => {
                stats.cosmetic += 1;
                if targets.is_empty() {
                    stats.added += usize::from(store.cosmetic.insert_global(&selector));
                } else {
                    for target in &targets {
                        stats.added += usize::from(store.cosmetic.insert_for_domain(target, &selector));
                    }
                }
            }
            Some(ListRule::Pattern(source)) => {
                stats.patterns += 1;
                stats.added += usize::from(store.patterns.insert(&source));
            }
            None => stats.ignored += 1,
        }
    }

    stats.added += store.domains.extend(domains);

    debug!(
        "Parsed {} lines: {} hosts, {} ABP domains, {} bare domains, {} cosmetic, {} patterns, {} new",
        stats.lines,
        stats.hosts,
        stats.adblock_domains,
        stats.bare_domains,
        stats.cosmetic,
        stats.patterns,
        stats.added
    );

    stats
}

/// Well-known ad and tracker domains loaded before any network I/O
pub fn default_tracking_domains() -> &'static [&'static str] {
    &[
        // Google Ads
        "pagead2.googlesyndication.com",
        "googleads.g.doubleclick.net",
        "ad.doubleclick.net",
        "adservice.google.co.uk",
        "adclick.g.doubleclick.net",
        "googleadservices.com",
        "securepubads.g.doubleclick.net",
        "tpc.googlesyndication.com",
        "partner.googleadservices.com",
        // Facebook/Meta
        "connect.facebook.net",
        // Amazon
        "aax.amazon-adsystem.com",
        "z-na.amazon-adsystem.com",
        "fls-na.amazon-adsystem.com",
        "rcm-na.amazon-adsystem.com",
        // Twitter/X
        "ads-twitter.com",
        // Ad networks
        "doubleclick.net",
        "adnxs.com",
        "adsrvr.org",
        "advertising.com",
        "outbrain.com",
        "taboola.com",
        "criteo.com",
        "criteo.net",
        "pubmatic.com",
        "rubiconproject.com",
        "openx.net",
        "appnexus.com",
        "moatads.com",
        "mediavine.com",
        "adthrive.com",
        "ad-delivery.net",
        "serving-sys.com",
        "smartadserver.com",
        "bidswitch.net",
        "casalemedia.com",
        "contextweb.com",
        "indexww.com",
        "lijit.com",
        "mathtag.com",
        "mookie1.com",
        "richaudience.com",
        "turn.com",
        "yieldmo.com",
        "zedo.com",
        // Analytics and session recording
        "google-analytics.com",
        "hotjar.com",
        "fullstory.com",
        "mouseflow.com",
        "clarity.ms",
        "luckyorange.com",
        "crazyegg.com",
        "newrelic.com",
        "nr-data.net",
        "mixpanel.com",
        "cdn.mxpnl.com",
        "amplitude.com",
        "heapanalytics.com",
        "segment.io",
        "segment.com",
        "sc-static.net",
        "sentry.io",
        "bugsnag.com",
        "quantserve.com",
        "scorecardresearch.com",
        "comscore.com",
        "bluekai.com",
        "exelator.com",
        "demdex.net",
        "krxd.net",
        "adsymptotic.com",
        "omtrdc.net",
        "everesttech.net",
        // Popups
        "popads.net",
        "popcash.net",
        "propellerads.com",
        "juicyads.com",
        "exoclick.com",
        "trafficjunky.com",
        "adcash.com",
        "clickadu.com",
        // Video ads
        "youtube.cleverads.vn",
        "static.ads-twitter.com",
        // Consent walls
        "cdn.cookielaw.org",
        "consent.cookiebot.com",
        "consentframework.com",
        // Misc
        "pixel.wp.com",
        "stats.wp.com",
    ]
}
