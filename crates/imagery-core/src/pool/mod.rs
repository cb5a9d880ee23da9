//! Image pool aggregation.
//!
//! [`ImagePool`] is a persistent value: every ingest returns a new pool and
//! leaves the receiver untouched. When nothing new survives filtering the
//! very same pool (same allocation, see [`ImagePool::ptr_eq`]) comes back.
//!
//! - [`filters`]: URL and description filters, domain tiers
//! - [`scoring`]: tiebreak scores per producer
//! - [`producer`]: `Producer` union, `RawImage` input, `IngestReport`
//! - [`summary`]: per-source/per-subtype counts

pub mod filters;
pub mod producer;
pub mod scoring;
pub mod summary;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{CurationConfig, QueryPolicy};
use crate::domain::{CollectedImage, ImageKey, SubType};
use crate::identity::normalize_url;
use crate::metrics::METRICS;

pub use filters::{DomainTier, FilterReason, FilterRules};
pub use producer::{IngestReport, Producer, RawImage, SearchEngine};
pub use summary::PoolSummary;

/// Rules shared by every snapshot of one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRules {
    pub query_policy: QueryPolicy,
    pub filter: FilterRules,
}

impl From<&CurationConfig> for PoolRules {
    fn from(config: &CurationConfig) -> Self {
        PoolRules {
            query_policy: config.query_policy,
            filter: config.filter_rules.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PoolState {
    images: Vec<Arc<CollectedImage>>,
    /// Seen keys and where their entry lives. Sole dedup authority.
    seen: HashMap<ImageKey, usize>,
}

/// Ordered, deduplicated image collection for one article run.
#[derive(Debug, Clone)]
pub struct ImagePool {
    rules: Arc<PoolRules>,
    state: Arc<PoolState>,
}

/// New pool plus what happened to the offered images.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub pool: ImagePool,
    pub report: IngestReport,
}

impl Default for ImagePool {
    fn default() -> Self {
        Self::new(&CurationConfig::default())
    }
}

impl ImagePool {
    /// Empty pool governed by `config`'s query policy and filter rules.
    pub fn new(config: &CurationConfig) -> Self {
        Self::with_rules(PoolRules::from(config))
    }

    pub fn with_rules(rules: PoolRules) -> Self {
        ImagePool {
            rules: Arc::new(rules),
            state: Arc::new(PoolState::default()),
        }
    }

    pub fn rules(&self) -> &PoolRules {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.state.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.images.is_empty()
    }

    /// Entries in insertion order.
    pub fn images(&self) -> &[Arc<CollectedImage>] {
        &self.state.images
    }

    pub fn contains(&self, key: &ImageKey) -> bool {
        self.state.seen.contains_key(key)
    }

    pub fn get(&self, key: &ImageKey) -> Option<&Arc<CollectedImage>> {
        self.state.seen.get(key).map(|&i| &self.state.images[i])
    }

    /// True when both values share the same underlying snapshot.
    pub fn ptr_eq(&self, other: &ImagePool) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Catalog-only view.
    pub fn catalog_images(&self) -> impl Iterator<Item = &Arc<CollectedImage>> {
        self.state.images.iter().filter(|i| i.source == crate::domain::ImageSource::Catalog)
    }

    /// Web-search-only view (both engines).
    pub fn web_images(&self) -> impl Iterator<Item = &Arc<CollectedImage>> {
        self.state.images.iter().filter(|i| i.source.is_web())
    }

    /// Entries ordered by tiebreak score, highest first; insertion order breaks ties.
    pub fn by_score(&self) -> Vec<Arc<CollectedImage>> {
        let mut sorted = self.state.images.clone();
        sorted.sort_by(|a, b| b.tiebreak_score.cmp(&a.tiebreak_score));
        sorted
    }

    /// Ingest official catalog imagery.
    ///
    /// Artworks go first, then screenshots, then the cover, so an asset listed
    /// under several categories keeps its highest-scoring one.
    pub fn ingest_catalog_images(
        &self,
        screenshots: &[RawImage],
        artworks: &[RawImage],
        cover: Option<&RawImage>,
    ) -> IngestOutcome {
        let batches: [(SubType, &[RawImage]); 3] = [
            (SubType::Artwork, artworks),
            (SubType::Screenshot, screenshots),
            (SubType::Cover, cover.map(std::slice::from_ref).unwrap_or_default()),
        ];

        let mut pool = self.clone();
        let mut report = IngestReport::default();
        for (sub_type, images) in batches {
            let outcome = pool.ingest(&Producer::Catalog { sub_type }, images);
            report.merge(&outcome.report);
            pool = outcome.pool;
        }
        IngestOutcome { pool, report }
    }

    /// Ingest one web-search result batch.
    pub fn ingest_web_images(
        &self,
        images: &[RawImage],
        origin_query: &str,
        engine: SearchEngine,
    ) -> IngestOutcome {
        self.ingest(
            &Producer::Web {
                engine,
                query: origin_query.to_string(),
            },
            images,
        )
    }

    /// Ingest images extracted from a source article.
    pub fn ingest_extracted_images(
        &self,
        images: &[RawImage],
        origin_page_url: &str,
        origin_domain: Option<&str>,
    ) -> IngestOutcome {
        self.ingest(
            &Producer::Extracted {
                page_url: origin_page_url.to_string(),
                domain: origin_domain.map(str::to_string),
            },
            images,
        )
    }

    /// Single ingest path shared by every producer.
    pub fn ingest(&self, producer: &Producer, images: &[RawImage]) -> IngestOutcome {
        let mut report = IngestReport {
            offered: images.len(),
            ..Default::default()
        };
        if images.is_empty() {
            return IngestOutcome {
                pool: self.clone(),
                report,
            };
        }

        let source = producer.source();
        // Copy-on-write: only clone the state once something survives.
        let mut next: Option<PoolState> = None;

        for raw in images {
            let url = match normalize_url(&raw.url, self.rules.query_policy) {
                Ok(url) => url,
                Err(err) => {
                    debug!(source = %source, error = %err, "dropping malformed image url");
                    report.malformed += 1;
                    continue;
                }
            };

            if let Some(reason) = producer.screen(&self.rules.filter, &url, raw) {
                debug!(source = %source, key = %url.key, reason = %reason, "filtered image");
                report.record_filtered(reason);
                continue;
            }

            let image = producer.collect(&self.rules.filter, url, raw);
            let current = next.as_ref().unwrap_or(&self.state);

            if let Some(&position) = current.seen.get(&image.key) {
                let existing = &current.images[position];
                if image.official && !existing.official {
                    debug!(key = %image.key, replaced = %existing.source, "official image supersedes earlier entry");
                    let state = next.get_or_insert_with(|| (*self.state).clone());
                    state.images[position] = Arc::new(image);
                    report.upgraded += 1;
                } else {
                    report.duplicates += 1;
                }
                continue;
            }

            let state = next.get_or_insert_with(|| (*self.state).clone());
            state.seen.insert(image.key.clone(), state.images.len());
            state.images.push(Arc::new(image));
            report.accepted += 1;
        }

        METRICS.add_images_ingested(report.accepted as u64);
        METRICS.add_images_rejected((report.malformed + report.filtered_total()) as u64);
        if report.malformed > 0 {
            warn!(source = %source, malformed = report.malformed, "dropped malformed image urls");
        }

        let pool = match next {
            Some(state) => ImagePool {
                rules: Arc::clone(&self.rules),
                state: Arc::new(state),
            },
            None => self.clone(),
        };
        IngestOutcome { pool, report }
    }

    /// Per-source/per-subtype counts.
    pub fn summarize(&self) -> PoolSummary {
        PoolSummary::of(self)
    }
}
