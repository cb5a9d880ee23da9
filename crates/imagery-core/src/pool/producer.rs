//! The four image producers as one tagged union.
//!
//! Each variant owns its filter and scoring rule; the pool runs a single
//! ingest path over any of them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{CollectedImage, ImageSource, SubType};
use crate::identity::{domain_of_str, NormalizedUrl};
use crate::pool::filters::{check_description, FilterReason, FilterRules};
use crate::pool::scoring;

/// An image as a producer offers it, before any filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawImage {
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Page the image was found on (web producers).
    #[serde(default)]
    pub page_url: Option<String>,
    /// Section heading the image sat under (extracted producer).
    #[serde(default)]
    pub nearby_heading: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl RawImage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_page_url(mut self, page_url: impl Into<String>) -> Self {
        self.page_url = Some(page_url.into());
        self
    }

    pub fn with_nearby_heading(mut self, heading: impl Into<String>) -> Self {
        self.nearby_heading = Some(heading.into());
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

/// Which web-search backend produced an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchEngine {
    A,
    B,
}

/// Producer kind with its per-kind context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Producer {
    Catalog {
        sub_type: SubType,
    },
    Web {
        engine: SearchEngine,
        query: String,
    },
    Extracted {
        page_url: String,
        domain: Option<String>,
    },
}

impl Producer {
    pub fn source(&self) -> ImageSource {
        match self {
            Self::Catalog { .. } => ImageSource::Catalog,
            Self::Web {
                engine: SearchEngine::A,
                ..
            } => ImageSource::SearchA,
            Self::Web {
                engine: SearchEngine::B,
                ..
            } => ImageSource::SearchB,
            Self::Extracted { .. } => ImageSource::Extracted,
        }
    }

    /// Filter an offered image. Catalog images are trusted.
    pub(crate) fn screen(
        &self,
        rules: &FilterRules,
        url: &NormalizedUrl,
        raw: &RawImage,
    ) -> Option<FilterReason> {
        match self {
            Self::Catalog { .. } => None,
            Self::Web { .. } => rules.check_url(&url.parsed),
            Self::Extracted { .. } => rules
                .check_url(&url.parsed)
                .or_else(|| check_description(raw.description.as_deref())),
        }
    }

    /// Build the pool entry for an image that passed [`Producer::screen`].
    pub(crate) fn collect(
        &self,
        rules: &FilterRules,
        url: NormalizedUrl,
        raw: &RawImage,
    ) -> CollectedImage {
        let description = clean(raw.description.as_deref());
        let nearby_heading = clean(raw.nearby_heading.as_deref());
        let image_domain = url.domain();

        let (origin_page_url, origin_domain, origin_query, official, sub_type, score) = match self
        {
            Self::Catalog { sub_type } => (
                None,
                image_domain,
                None,
                true,
                Some(*sub_type),
                scoring::catalog_score(*sub_type),
            ),
            Self::Web { query, .. } => {
                let page_url = clean(raw.page_url.as_deref());
                let page_domain = page_url.as_deref().and_then(domain_of_str);
                let tier_host = page_domain.clone().or_else(|| image_domain.clone());
                let tier = rules.tier(tier_host.as_deref().unwrap_or_default());
                (
                    page_url,
                    page_domain.or(image_domain),
                    clean(Some(query.as_str())),
                    false,
                    None,
                    scoring::web_score(tier),
                )
            }
            Self::Extracted { page_url, domain } => {
                let domain = domain
                    .as_deref()
                    .map(|d| d.trim().trim_start_matches("www.").to_ascii_lowercase())
                    .filter(|d| !d.is_empty())
                    .or_else(|| domain_of_str(page_url))
                    .or(image_domain);
                let tier = rules.tier(domain.as_deref().unwrap_or_default());
                let score = scoring::extracted_score(
                    tier,
                    nearby_heading.is_some(),
                    description.as_deref().unwrap_or_default(),
                );
                (clean(Some(page_url.as_str())), domain, None, false, None, score)
            }
        };

        CollectedImage {
            url: url.fetch_url,
            key: url.key,
            source: self.source(),
            description,
            origin_page_url,
            origin_domain,
            origin_query,
            nearby_heading,
            width: raw.width.filter(|w| *w > 0),
            height: raw.height.filter(|h| *h > 0),
            official,
            sub_type,
            tiebreak_score: score,
        }
    }
}

fn clean(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// What one ingest call did with its input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub offered: usize,
    pub accepted: usize,
    /// Official images that replaced an earlier unofficial entry with the same key.
    pub upgraded: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub filtered: BTreeMap<FilterReason, usize>,
}

impl IngestReport {
    pub(crate) fn record_filtered(&mut self, reason: FilterReason) {
        *self.filtered.entry(reason).or_insert(0) += 1;
    }

    pub fn filtered_total(&self) -> usize {
        self.filtered.values().sum()
    }

    /// Inputs that did not become (or replace) a pool entry.
    pub fn rejected(&self) -> usize {
        self.duplicates + self.malformed + self.filtered_total()
    }

    pub fn merge(&mut self, other: &IngestReport) {
        self.offered += other.offered;
        self.accepted += other.accepted;
        self.upgraded += other.upgraded;
        self.duplicates += other.duplicates;
        self.malformed += other.malformed;
        for (reason, count) in &other.filtered {
            *self.filtered.entry(*reason).or_insert(0) += count;
        }
    }
}
