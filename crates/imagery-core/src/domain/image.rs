//! Collected image values and their identity key.

use serde::{Deserialize, Serialize};

/// Producer an image was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    Catalog,
    SearchA,
    SearchB,
    Extracted,
}

impl ImageSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::SearchA => "search_a",
            Self::SearchB => "search_b",
            Self::Extracted => "extracted",
        }
    }

    /// Web-search producers (A and B).
    pub fn is_web(self) -> bool {
        matches!(self, Self::SearchA | Self::SearchB)
    }
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog image category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubType {
    Artwork,
    Screenshot,
    Cover,
}

impl SubType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Artwork => "artwork",
            Self::Screenshot => "screenshot",
            Self::Cover => "cover",
        }
    }
}

impl std::fmt::Display for SubType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized URL identity.
///
/// Only [`crate::identity::normalize_url`] constructs keys, so two keys compare
/// equal exactly when their source URLs denote the same image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageKey(String);

impl ImageKey {
    pub(crate) fn new(normalized: String) -> Self {
        ImageKey(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An image in the pool. Built once at ingestion and shared as
/// `Arc<CollectedImage>` afterwards; nothing mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedImage {
    /// Fetchable URL (fragment stripped, otherwise as offered).
    pub url: String,
    /// Identity used for every dedup and exclusion decision.
    pub key: ImageKey,
    pub source: ImageSource,
    pub description: Option<String>,
    pub origin_page_url: Option<String>,
    pub origin_domain: Option<String>,
    /// Search or context string that surfaced the image.
    pub origin_query: Option<String>,
    /// Heading the image sat under in its source article (extracted only).
    pub nearby_heading: Option<String>,
    /// Declared width, not measured.
    pub width: Option<u32>,
    /// Declared height, not measured.
    pub height: Option<u32>,
    pub official: bool,
    pub sub_type: Option<SubType>,
    pub tiebreak_score: i32,
}

impl CollectedImage {
    /// All free text attached to the image, for lexical matching.
    pub fn context_text(&self) -> String {
        [
            self.description.as_deref(),
            self.origin_query.as_deref(),
            self.nearby_heading.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// Declared dimensions when both sides are known.
    pub fn declared_dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }
}
