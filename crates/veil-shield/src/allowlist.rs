//! Essential Domains
//!
//! Hosts that are never blocked, whatever the filter lists say. Broad
//! list rules would otherwise hit first-party traffic of major sites and
//! the CDN, auth and payment infrastructure pages depend on.
//!
//! Matching is by label-aligned suffix: `pbs.twimg.com` is covered by
//! `twimg.com`, `evil-twimg.com` is not.

use crate::domain_set::domain_suffixes;
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Major site roots whose own traffic is never blocked
const MAJOR_SITES: &[&str] = &[
    "x.com",
    "twitter.com",
    "facebook.com",
    "instagram.com",
    "reddit.com",
    "linkedin.com",
    "tiktok.com",
    "pinterest.com",
    "tumblr.com",
    "discord.com",
    "twitch.tv",
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "netflix.com",
    "disneyplus.com",
    "google.com",
    "bing.com",
    "duckduckgo.com",
    "github.com",
    "gitlab.com",
    "stackoverflow.com",
    "wikipedia.org",
    "medium.com",
    "notion.so",
    "amazon.com",
    "ebay.com",
    "etsy.com",
    "walmart.com",
    "gmail.com",
    "outlook.com",
    "proton.me",
    "protonmail.com",
    "bbc.com",
    "cnn.com",
    "reuters.com",
    "nytimes.com",
    "theguardian.com",
    "npmjs.com",
    "codepen.io",
    "jsfiddle.net",
    "replit.com",
    "vercel.com",
    "netlify.com",
    "heroku.com",
];

/// CDN, auth, captcha and payment infrastructure
const ESSENTIAL_INFRASTRUCTURE: &[&str] = &[
    // CDNs
    "cdn.jsdelivr.net",
    "cdnjs.cloudflare.com",
    "unpkg.com",
    "cloudflare.com",
    "fastly.net",
    "akamaihd.net",
    "akamaized.net",
    "cloudfront.net",
    "azureedge.net",
    "stackpath.bootstrapcdn.com",
    "maxcdn.bootstrapcdn.com",
    // Google / YouTube
    "googleapis.com",
    "gstatic.com",
    "ggpht.com",
    "googlevideo.com",
    "ytimg.com",
    "youtube-nocookie.com",
    "googleusercontent.com",
    "goog.com",
    // Twitter/X
    "twimg.com",
    "api.x.com",
    // Meta
    "fbcdn.net",
    "cdninstagram.com",
    "fbsbx.com",
    // Reddit
    "redditmedia.com",
    "redditstatic.com",
    "redd.it",
    // Images
    "imgur.com",
    "giphy.com",
    "pinimg.com",
    // Fonts
    "use.fontawesome.com",
    "kit.fontawesome.com",
    "use.typekit.net",
    // Auth
    "login.microsoftonline.com",
    "appleid.apple.com",
    "auth0.com",
    "okta.com",
    // Captcha
    "hcaptcha.com",
    "www.recaptcha.net",
    // Payment
    "js.stripe.com",
    "checkout.stripe.com",
    "www.paypal.com",
    "paypalobjects.com",
    // Microsoft
    "microsoft.com",
    "microsoftonline.com",
    "msftauth.net",
    "live.com",
    "office.com",
    "office365.com",
];

static ESSENTIAL: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    MAJOR_SITES
        .iter()
        .chain(ESSENTIAL_INFRASTRUCTURE)
        .copied()
        .collect()
});

/// The allowlist entry covering `host`, if any. `host` must be lowercase.
pub fn essential_match(host: &str) -> Option<&'static str> {
    domain_suffixes(host).find_map(|suffix| ESSENTIAL.get(suffix).copied())
}

/// Whether `host` is essential infrastructure or a major site
#[inline]
pub fn is_essential(host: &str) -> bool {
    essential_match(host).is_some()
}
