//! Behavioral Scripts
//!
//! Site-specific page scripts for video platforms whose ads are served
//! first-party and cannot be stopped at the network layer. Each script
//! stubs ad endpoints in `fetch`/`XMLHttpRequest`, strips ad overlays on a
//! timer and on DOM mutation, and caps `window.open` calls.

use crate::domain_set::domain_suffixes;

const YOUTUBE_SCRIPT: &str = include_str!("../assets/youtube.js");
const TWITCH_SCRIPT: &str = include_str!("../assets/twitch.js");
const POPUP_GUARD_SCRIPT: &str = include_str!("../assets/popup_guard.js");
const PAGE_CLEANUP_SCRIPT: &str = include_str!("../assets/page_cleanup.js");

const MAX_POPUPS_PLACEHOLDER: &str = "__VEIL_MAX_POPUPS__";

/// Default number of `window.open` calls a page may make
pub const DEFAULT_MAX_POPUPS: u32 = 3;

/// Sites with a dedicated script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownSite {
    YouTube,
    Twitch,
}

impl KnownSite {
    /// Site served on `hostname`, matched on label boundaries
    pub fn for_host(hostname: &str) -> Option<Self> {
        let host = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
        domain_suffixes(&host).find_map(|suffix| match suffix {
            "youtube.com" | "youtu.be" | "youtube-nocookie.com" => Some(Self::YouTube),
            "twitch.tv" => Some(Self::Twitch),
            _ => None,
        })
    }

    fn script(self) -> &'static str {
        match self {
            Self::YouTube => YOUTUBE_SCRIPT,
            Self::Twitch => TWITCH_SCRIPT,
        }
    }
}

fn popup_guard(max_popups: u32) -> String {
    POPUP_GUARD_SCRIPT.replace(MAX_POPUPS_PLACEHOLDER, &max_popups.to_string())
}

/// Script to run in pages on `hostname`, if the site has one
pub fn behavioral_script_for(hostname: &str, max_popups: u32) -> Option<String> {
    let site = KnownSite::for_host(hostname)?;

    let mut script = String::with_capacity(site.script().len() + POPUP_GUARD_SCRIPT.len() + 1);
    script.push_str(site.script());
    script.push('\n');
    script.push_str(&popup_guard(max_popups));
    Some(script)
}

/// Generic ad-node removal and popup cap, suitable for every page
pub fn page_cleanup_script(max_popups: u32) -> String {
    format!("{}\n{}", PAGE_CLEANUP_SCRIPT, popup_guard(max_popups))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_sites() {
        assert_eq!(KnownSite::for_host("www.youtube.com"), Some(KnownSite::YouTube));
        assert_eq!(KnownSite::for_host("youtu.be"), Some(KnownSite::YouTube));
        assert_eq!(KnownSite::for_host("Player.Twitch.TV"), Some(KnownSite::Twitch));
        assert_eq!(KnownSite::for_host("notyoutube.com"), None);
        assert_eq!(KnownSite::for_host("youtube.com.example.org"), None);
    }

    #[test]
    fn test_script_contents() {
        let yt = behavioral_script_for("m.youtube.com", 2).unwrap();
        assert!(yt.contains("/api/stats/ads"));
        assert!(yt.contains("MutationObserver"));
        assert!(yt.contains("const maxPopups = 2;"));
        assert!(!yt.contains(MAX_POPUPS_PLACEHOLDER));

        let twitch = behavioral_script_for("www.twitch.tv", DEFAULT_MAX_POPUPS).unwrap();
        assert!(twitch.contains("edge.ads.twitch.tv"));
        assert!(twitch.contains("status: 204"));
        assert!(twitch.contains(".m3u8"));
        assert!(twitch.contains("stripAdSegments(playlist)"));
        assert!(twitch.contains("#EXT-X-TWITCH-PREFETCH:"));
        assert!(twitch.contains("',live'"));
        assert!(twitch.contains("'stitched'"));
    }

    #[test]
    fn test_no_script_for_other_hosts() {
        assert!(behavioral_script_for("example.com", DEFAULT_MAX_POPUPS).is_none());
        assert!(behavioral_script_for("", DEFAULT_MAX_POPUPS).is_none());
    }

    #[test]
    fn test_page_cleanup() {
        let script = page_cleanup_script(5);
        assert!(script.contains("ins.adsbygoogle"));
        assert!(script.contains("const maxPopups = 5;"));
    }
}
