//! Candidate resolution.
//!
//! Walks each slot's ranked list in order and commits the first candidate
//! that downloads, measures wide enough, passes the optional quality gate and
//! wins the claim on its key. Per candidate:
//!
//! ```text
//! excluded? -> download -> dimensions -> width gate -> quality gate -> claim
//!     |            |            |             |              |          |
//!  Excluded  DownloadFailed NoDimensions  TooNarrow /   QualityRejected ClaimedElsewhere /
//!                                        InferredRejected                DuplicateContent
//! ```
//!
//! Any failure advances to the next candidate. The hero is resolved and
//! claimed before any section starts.

pub mod dimensions;
pub mod exclusion;
pub mod fetch;
pub mod quality;

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelSignal;
use crate::config::{CurationConfig, InferredDimensionPolicy, SlotPolicy};
use crate::curator::Curation;
use crate::domain::{
    DimensionProvenance, ImageKey, ImagePayload, RankedCandidate, ResolvedAssignment, Slot,
};
use crate::metrics::METRICS;
use crate::obs;

pub use dimensions::{hint_from_url, measure, resolve_dimensions};
pub use exclusion::{Claim, ExclusionSet};
pub use fetch::{FetchedImage, ImageFetcher};
pub use quality::{ClarityValidator, QualityGates, QualityRejection, QualityValidator};

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Key already committed to another slot; not downloaded.
    Excluded,
    DownloadFailed { reason: String },
    NoDimensions,
    TooNarrow {
        width: u32,
        min_width: u32,
        provenance: DimensionProvenance,
    },
    /// Dimensions could only be inferred and the slot demands measured ones.
    InferredRejected { width: u32 },
    QualityRejected { rejection: QualityRejection },
    /// Passed every gate but another slot claimed the key first.
    ClaimedElsewhere,
    /// Passed every gate but another slot holds the same bytes.
    DuplicateContent { digest: String },
    Cancelled,
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateAttempt {
    /// Position in the slot's ranked list.
    pub rank: usize,
    pub candidate_index: usize,
    pub key: ImageKey,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Final state of one slot.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum SlotResolution {
    Resolved {
        assignment: ResolvedAssignment,
        attempts: Vec<CandidateAttempt>,
    },
    /// Every candidate failed or was skipped. Not an error.
    Unresolved {
        slot: Slot,
        attempts: Vec<CandidateAttempt>,
    },
}

impl SlotResolution {
    pub fn slot(&self) -> &Slot {
        match self {
            Self::Resolved { assignment, .. } => &assignment.slot,
            Self::Unresolved { slot, .. } => slot,
        }
    }

    pub fn attempts(&self) -> &[CandidateAttempt] {
        match self {
            Self::Resolved { attempts, .. } | Self::Unresolved { attempts, .. } => attempts,
        }
    }

    pub fn assignment(&self) -> Option<&ResolvedAssignment> {
        match self {
            Self::Resolved { assignment, .. } => Some(assignment),
            Self::Unresolved { .. } => None,
        }
    }

    pub fn into_assignment(self) -> Option<ResolvedAssignment> {
        match self {
            Self::Resolved { assignment, .. } => Some(assignment),
            Self::Unresolved { .. } => None,
        }
    }
}

/// Every slot's resolution for one run.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    /// `None` when curation produced no hero candidates.
    pub hero: Option<SlotResolution>,
    /// Plan order.
    pub sections: Vec<SlotResolution>,
    #[serde(skip)]
    pub exclusions: ExclusionSet,
}

impl Resolution {
    pub fn assignments(&self) -> impl Iterator<Item = &ResolvedAssignment> {
        self.hero
            .iter()
            .chain(self.sections.iter())
            .filter_map(SlotResolution::assignment)
    }

    pub fn resolved_count(&self) -> usize {
        self.assignments().count()
    }
}

/// Resolves ranked candidates into binary-backed assignments.
#[derive(Clone)]
pub struct Resolver {
    fetcher: Arc<dyn ImageFetcher>,
    hero_policy: SlotPolicy,
    section_policy: SlotPolicy,
    concurrency: usize,
    quality: QualityGates,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("hero_policy", &self.hero_policy)
            .field("section_policy", &self.section_policy)
            .field("concurrency", &self.concurrency)
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, config: &CurationConfig) -> Self {
        Self {
            fetcher,
            hero_policy: config.slot_policy(true),
            section_policy: config.slot_policy(false),
            concurrency: config.resolve_concurrency.max(1),
            quality: QualityGates::default(),
        }
    }

    pub fn with_quality_gates(mut self, quality: QualityGates) -> Self {
        self.quality = quality;
        self
    }

    /// Resolve the hero, then every section concurrently.
    ///
    /// `exclusions` may arrive pre-seeded with keys the article already uses.
    #[instrument(skip_all, fields(hero_candidates = curation.hero_candidates.len(), sections = curation.sections.len()))]
    pub async fn resolve(
        &self,
        curation: &Curation,
        exclusions: ExclusionSet,
        cancel: &CancelSignal,
    ) -> Resolution {
        let hero = if curation.hero_candidates.is_empty() {
            None
        } else {
            Some(
                self.resolve_slot(Slot::Hero, &curation.hero_candidates, &exclusions, cancel)
                    .await,
            )
        };

        let mut sections: Vec<SlotResolution> = stream::iter(&curation.sections)
            .map(|selection| {
                let slot = Slot::Section {
                    index: selection.section_index,
                    heading: selection.heading.clone(),
                };
                self.resolve_slot(slot, &selection.candidates, &exclusions, cancel)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        sections.sort_by_key(|r| match r.slot() {
            Slot::Section { index, .. } => *index,
            Slot::Hero => 0,
        });

        let resolution = Resolution {
            hero,
            sections,
            exclusions,
        };
        info!(
            resolved = resolution.resolved_count(),
            sections = resolution.sections.len(),
            "resolution finished"
        );
        resolution
    }

    /// Walk `candidates` in rank order until one commits.
    pub async fn resolve_slot(
        &self,
        slot: Slot,
        candidates: &[RankedCandidate],
        exclusions: &ExclusionSet,
        cancel: &CancelSignal,
    ) -> SlotResolution {
        let policy = if slot.is_hero() {
            self.hero_policy
        } else {
            self.section_policy
        };
        let validator = self.quality.for_slot(slot.is_hero());
        let mut attempts = Vec::with_capacity(candidates.len());

        for (rank, candidate) in candidates.iter().enumerate() {
            let record = |outcome: AttemptOutcome| CandidateAttempt {
                rank,
                candidate_index: candidate.candidate_index,
                key: candidate.image.key.clone(),
                outcome,
            };

            if cancel.is_cancelled() {
                debug!(slot = %slot, remaining = candidates.len() - rank, "cancelled before download");
                attempts.extend(candidates[rank..].iter().enumerate().map(|(offset, c)| {
                    CandidateAttempt {
                        rank: rank + offset,
                        candidate_index: c.candidate_index,
                        key: c.image.key.clone(),
                        outcome: AttemptOutcome::Cancelled,
                    }
                }));
                break;
            }

            if exclusions.contains(&candidate.image.key) {
                debug!(slot = %slot, key = %candidate.image.key, "candidate already claimed");
                attempts.push(record(AttemptOutcome::Excluded));
                continue;
            }

            METRICS.inc_downloads();
            let fetched = match self.fetcher.fetch(&candidate.image.url).await {
                Ok(fetched) => fetched,
                Err(err) => {
                    warn!(slot = %slot, key = %candidate.image.key, error = %err, "candidate download failed");
                    attempts.push(record(AttemptOutcome::DownloadFailed {
                        reason: err.to_string(),
                    }));
                    continue;
                }
            };
            let payload = ImagePayload::new(fetched.bytes, fetched.content_type.as_deref());

            let Some(dimensions) = resolve_dimensions(&payload.bytes, &candidate.image) else {
                warn!(slot = %slot, key = %candidate.image.key, "no dimensions for candidate");
                attempts.push(record(AttemptOutcome::NoDimensions));
                continue;
            };
            if let Some(outcome) = dimension_gate(&policy, dimensions.width, dimensions.provenance) {
                warn!(slot = %slot, key = %candidate.image.key, width = dimensions.width, min_width = policy.min_width, "candidate fails dimension gate");
                attempts.push(record(outcome));
                continue;
            }

            if let Some(validator) = validator {
                if let Err(rejection) = validator.check(&payload, &dimensions).await {
                    warn!(slot = %slot, key = %candidate.image.key, reason = %rejection, "candidate fails quality gate");
                    attempts.push(record(AttemptOutcome::QualityRejected { rejection }));
                    continue;
                }
            }

            match exclusions.claim_payload(&candidate.image.key, &payload.digest) {
                Claim::Claimed => {}
                Claim::KeyTaken => {
                    debug!(slot = %slot, key = %candidate.image.key, "candidate claimed by another slot");
                    attempts.push(record(AttemptOutcome::ClaimedElsewhere));
                    continue;
                }
                Claim::ContentTaken => {
                    debug!(slot = %slot, key = %candidate.image.key, digest = %payload.digest, "same bytes already used by another slot");
                    attempts.push(record(AttemptOutcome::DuplicateContent {
                        digest: payload.digest.clone(),
                    }));
                    continue;
                }
            }

            attempts.push(record(AttemptOutcome::Accepted));
            obs::emit_slot_resolved(&slot, Some(rank), attempts.len());
            return SlotResolution::Resolved {
                assignment: ResolvedAssignment {
                    slot,
                    image: Arc::clone(&candidate.image),
                    rank,
                    candidate_index: candidate.candidate_index,
                    alt_text: candidate.alt_text.clone(),
                    caption: candidate.caption.clone(),
                    relevance_score: candidate.relevance_score,
                    dimensions,
                    payload,
                },
                attempts,
            };
        }

        obs::emit_slot_resolved(&slot, None, attempts.len());
        SlotResolution::Unresolved { slot, attempts }
    }
}

fn dimension_gate(
    policy: &SlotPolicy,
    width: u32,
    provenance: DimensionProvenance,
) -> Option<AttemptOutcome> {
    if provenance == DimensionProvenance::Inferred
        && policy.inferred == InferredDimensionPolicy::Reject
    {
        return Some(AttemptOutcome::InferredRejected { width });
    }
    if width < policy.min_width {
        return Some(AttemptOutcome::TooNarrow {
            width,
            min_width: policy.min_width,
            provenance,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: SlotPolicy = SlotPolicy {
        min_width: 1280,
        inferred: InferredDimensionPolicy::Reject,
    };

    #[test]
    fn test_dimension_gate() {
        assert_eq!(
            dimension_gate(&POLICY, 1920, DimensionProvenance::Measured),
            None
        );
        assert_eq!(
            dimension_gate(&POLICY, 800, DimensionProvenance::Measured),
            Some(AttemptOutcome::TooNarrow {
                width: 800,
                min_width: 1280,
                provenance: DimensionProvenance::Measured
            })
        );
        assert_eq!(
            dimension_gate(&POLICY, 1920, DimensionProvenance::Inferred),
            Some(AttemptOutcome::InferredRejected { width: 1920 })
        );

        let lenient = SlotPolicy {
            min_width: 640,
            inferred: InferredDimensionPolicy::Accept,
        };
        assert_eq!(
            dimension_gate(&lenient, 640, DimensionProvenance::Inferred),
            None
        );
    }
}
