//! Pre-curation filters for web and extracted images.
//!
//! These only prune what is almost certainly not article imagery (tracking
//! pixels, icons, avatars, logos, tiny inline renditions). Anything ambiguous
//! is kept; relevance is the curator's job.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::identity::host_matches;

/// Why an image was filtered out before entering the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    BlockedDomain,
    TrackingPixel,
    IconOrSprite,
    AvatarPath,
    Thumbnail,
    VectorIcon,
    Logo,
    SmallInlineDimensions,
    PoorDescription,
}

impl FilterReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BlockedDomain => "blocked_domain",
            Self::TrackingPixel => "tracking_pixel",
            Self::IconOrSprite => "icon_or_sprite",
            Self::AvatarPath => "avatar_path",
            Self::Thumbnail => "thumbnail",
            Self::VectorIcon => "vector_icon",
            Self::Logo => "logo",
            Self::SmallInlineDimensions => "small_inline_dimensions",
            Self::PoorDescription => "poor_description",
        }
    }
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality tier of an image's host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainTier {
    High,
    Default,
    Low,
}

/// Domain lists and thresholds used by the filters and the tiebreak scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    pub blocked_domains: Vec<String>,
    pub high_quality_domains: Vec<String>,
    pub low_quality_domains: Vec<String>,
    /// Inline `NxN` or width/height hints below this are treated as icons.
    pub min_inline_dimension: u32,
}

impl Default for FilterRules {
    fn default() -> Self {
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        FilterRules {
            blocked_domains: owned(&[
                "doubleclick.net",
                "googlesyndication.com",
                "google-analytics.com",
                "googletagmanager.com",
                "amazon-adsystem.com",
                "scorecardresearch.com",
                "quantserve.com",
                "facebook.com",
                "pixel.wp.com",
                "stats.wp.com",
                "gravatar.com",
                "feedburner.com",
            ]),
            high_quality_domains: owned(&[
                "ign.com",
                "gamespot.com",
                "polygon.com",
                "eurogamer.net",
                "pcgamer.com",
                "rockpapershotgun.com",
                "theverge.com",
                "kotaku.com",
                "steamstatic.com",
                "igdb.com",
                "wikimedia.org",
                "nintendo.com",
                "playstation.com",
                "xbox.com",
            ]),
            low_quality_domains: owned(&[
                "pinimg.com",
                "pinterest.com",
                "ytimg.com",
                "tumblr.com",
                "alamy.com",
                "shutterstock.com",
                "dreamstime.com",
                "gettyimages.com",
            ]),
            min_inline_dimension: 200,
        }
    }
}

impl FilterRules {
    /// Tier of `host` (allowlist checked first).
    pub fn tier(&self, host: &str) -> DomainTier {
        if self.high_quality_domains.iter().any(|d| host_matches(host, d)) {
            DomainTier::High
        } else if self.low_quality_domains.iter().any(|d| host_matches(host, d)) {
            DomainTier::Low
        } else {
            DomainTier::Default
        }
    }

    /// Run every URL filter. Returns the first reason that matched.
    pub fn check_url(&self, url: &Url) -> Option<FilterReason> {
        let host = url.host_str().unwrap_or_default();
        if self.blocked_domains.iter().any(|d| host_matches(host, d)) {
            return Some(FilterReason::BlockedDomain);
        }

        let path = url.path().to_ascii_lowercase();
        if let Some(reason) = check_path(&path) {
            return Some(reason);
        }

        if self.has_small_inline_dimensions(url, &path) {
            return Some(FilterReason::SmallInlineDimensions);
        }

        None
    }

    fn has_small_inline_dimensions(&self, url: &Url, path: &str) -> bool {
        let floor = self.min_inline_dimension;

        for caps in inline_size_regex().captures_iter(path) {
            let width = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
            let height = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
            if let (Some(w), Some(h)) = (width, height) {
                if w < floor || h < floor {
                    return true;
                }
            }
        }

        url.query_pairs().any(|(name, value)| {
            let name = name.to_ascii_lowercase();
            matches!(name.as_str(), "w" | "width" | "h" | "height")
                && value
                    .trim()
                    .trim_end_matches("px")
                    .parse::<u32>()
                    .map_or(false, |v| v < floor)
        })
    }
}

fn inline_size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9a-z])(\d{1,4})x(\d{1,4})(?:[^0-9a-z]|$)").expect("static regex")
    })
}

fn check_path(path: &str) -> Option<FilterReason> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let file = segments.last().copied().unwrap_or_default();
    let (stem, ext) = match file.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (file, ""),
    };
    let tokens: Vec<&str> = path
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has_token = |wanted: &[&str]| tokens.iter().any(|t| wanted.contains(t));
    let has_segment = |wanted: &[&str]| segments.iter().any(|s| wanted.contains(s));

    if matches!(stem, "pixel" | "1x1" | "spacer" | "blank" | "transparent" | "clear")
        || has_segment(&["beacon", "beacons", "track", "tracking", "pixel"])
    {
        return Some(FilterReason::TrackingPixel);
    }

    if matches!(ext, "svg" | "ico") {
        return Some(FilterReason::VectorIcon);
    }

    if tokens.iter().any(|t| is_logo_token(t)) {
        return Some(FilterReason::Logo);
    }

    if has_token(&["favicon", "sprite", "sprites", "badge", "badges"])
        || stem.starts_with("apple-touch-icon")
    {
        return Some(FilterReason::IconOrSprite);
    }

    if has_segment(&["icons", "icon", "emoji", "emojis"]) || has_token(&["icon"]) {
        return Some(FilterReason::VectorIcon);
    }

    if has_segment(&[
        "avatar", "avatars", "profile", "profiles", "author", "authors", "user", "users",
    ]) || has_token(&["avatar", "gravatar", "headshot"])
    {
        return Some(FilterReason::AvatarPath);
    }

    if has_token(&["thumb", "thumbs", "thumbnail", "thumbnails", "tn"]) {
        return Some(FilterReason::Thumbnail);
    }

    None
}

/// `logo`, `logos` or `logo` plus a numeric suffix (`logo2x`). Words that
/// merely contain the letters ("analogous", "catalogo") are not logos.
fn is_logo_token(token: &str) -> bool {
    match token.strip_prefix("logo") {
        Some("s") => true,
        Some(rest) => rest.chars().all(|c| c.is_ascii_digit() || c == 'x'),
        None => false,
    }
}

/// Description-quality filter for extracted images.
///
/// Rejects near-empty, purely numeric, "share on <platform>", and
/// logo/avatar/rating-badge-like descriptions.
pub fn check_description(description: Option<&str>) -> Option<FilterReason> {
    let text = description.map(str::trim).unwrap_or_default();
    let meaningful = text.chars().filter(|c| c.is_alphanumeric()).count();
    if meaningful < 3 {
        return Some(FilterReason::PoorDescription);
    }

    if text
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace() || c.is_ascii_punctuation())
    {
        return Some(FilterReason::PoorDescription);
    }

    let lower = text.to_lowercase();
    if share_regex().is_match(&lower) {
        return Some(FilterReason::PoorDescription);
    }

    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let badge_like = words.iter().any(|w| {
        is_logo_token(w)
            || matches!(
                *w,
                "avatar" | "gravatar" | "headshot" | "badge" | "esrb" | "pegi" | "icon" | "favicon"
            )
    }) || lower.contains("profile picture")
        || lower.contains("profile photo")
        || rating_regex().is_match(&lower);
    if badge_like {
        return Some(FilterReason::PoorDescription);
    }

    None
}

fn share_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(share|tweet|pin|post|send)\b.*\b(on|to|via|with)\s+(facebook|twitter|x|pinterest|reddit|linkedin|whatsapp|telegram|email|tumblr|threads|bluesky)\b",
        )
        .expect("static regex")
    })
}

fn rating_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:\d(?:\.\d)?\s*(?:/\s*\d+\s*)?stars?\b|rated\s+(?:e|t|m|ao)\b|rated\s+\d+\+|rating\s*(?:badge|icon|:))")
            .expect("static regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(raw: &str) -> Option<FilterReason> {
        FilterRules::default().check_url(&Url::parse(raw).unwrap())
    }

    #[test]
    fn test_blocked_domains() {
        assert_eq!(
            check("https://www.facebook.com/tr?id=1&ev=PageView"),
            Some(FilterReason::BlockedDomain)
        );
        assert_eq!(
            check("https://secure.gravatar.com/avatar/abc.jpg"),
            Some(FilterReason::BlockedDomain)
        );
    }

    #[test]
    fn test_path_patterns() {
        assert_eq!(check("https://a.com/img/pixel.gif"), Some(FilterReason::TrackingPixel));
        assert_eq!(check("https://a.com/beacon/x.png"), Some(FilterReason::TrackingPixel));
        assert_eq!(check("https://a.com/favicon.png"), Some(FilterReason::IconOrSprite));
        assert_eq!(check("https://a.com/ui/sprites-main.png"), Some(FilterReason::IconOrSprite));
        assert_eq!(check("https://a.com/authors/jane.jpg"), Some(FilterReason::AvatarPath));
        assert_eq!(check("https://a.com/img/thumb/boss.jpg"), Some(FilterReason::Thumbnail));
        assert_eq!(check("https://a.com/img/arrow.svg"), Some(FilterReason::VectorIcon));
        assert_eq!(check("https://a.com/brand/site-logo-2x.png"), Some(FilterReason::Logo));
        assert_eq!(check("https://a.com/brand/logos/studio.png"), Some(FilterReason::Logo));
        assert_eq!(check("https://a.com/brand/logo2x.png"), Some(FilterReason::Logo));
    }

    #[test]
    fn test_small_inline_dimensions() {
        assert_eq!(
            check("https://a.com/uploads/boss-150x150.jpg"),
            Some(FilterReason::SmallInlineDimensions)
        );
        assert_eq!(
            check("https://a.com/uploads/boss.jpg?w=120"),
            Some(FilterReason::SmallInlineDimensions)
        );
        assert_eq!(check("https://a.com/uploads/boss-1024x576.jpg"), None);
        assert_eq!(check("https://a.com/uploads/boss.jpg?width=1600"), None);
    }

    #[test]
    fn test_ambiguous_images_are_kept() {
        assert_eq!(check("https://a.com/uploads/pixel-art-forest.png"), None);
        assert_eq!(check("https://a.com/news/2024/boss-arena.jpg"), None);
        assert_eq!(check("https://a.com/gallery/user-interface-overview.jpg"), None);
        assert_eq!(check("https://a.com/uploads/analogous-combat.jpg"), None);
        assert_eq!(check("https://a.com/catalogo/boss-arena.jpg"), None);
    }

    #[test]
    fn test_domain_tiers() {
        let rules = FilterRules::default();
        assert_eq!(rules.tier("assets.ign.com"), DomainTier::High);
        assert_eq!(rules.tier("i.pinimg.com"), DomainTier::Low);
        assert_eq!(rules.tier("blog.example.org"), DomainTier::Default);
    }

    #[test]
    fn test_description_filter() {
        assert_eq!(check_description(None), Some(FilterReason::PoorDescription));
        assert_eq!(check_description(Some(" a ")), Some(FilterReason::PoorDescription));
        assert_eq!(check_description(Some("2024-03-01")), Some(FilterReason::PoorDescription));
        assert_eq!(
            check_description(Some("Share on Facebook")),
            Some(FilterReason::PoorDescription)
        );
        assert_eq!(check_description(Some("Studio logo")), Some(FilterReason::PoorDescription));
        assert_eq!(check_description(Some("Analogous colour palette in the swamp")), None);
        assert_eq!(check_description(Some("Catalogo de armas")), None);
        assert_eq!(check_description(Some("Author avatar")), Some(FilterReason::PoorDescription));
        assert_eq!(
            check_description(Some("ESRB Mature rating")),
            Some(FilterReason::PoorDescription)
        );
        assert_eq!(check_description(Some("4.5 stars")), Some(FilterReason::PoorDescription));
        assert_eq!(
            check_description(Some("The hero faces the dragon at the summit")),
            None
        );
    }
}
