//! Candidate curation.
//!
//! Shows the ranking service capped pool snapshots for the hero slot and for
//! every planned section, then validates the reply against exactly those
//! snapshots. Failures never escape: they become [`CurationStatus::Failed`].

pub mod ranking;
pub mod snapshot;
pub mod validate;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::cancel::CancelSignal;
use crate::config::{CurationConfig, CurationMode};
use crate::domain::{
    PlannedSection, RankedCandidate, RankingError, SectionPlan, SectionSelection, Slot, Usage,
};
use crate::metrics::METRICS;
use crate::pool::ImagePool;

pub use ranking::{
    parse_ranking_reply, render_ranking_prompt, HeroRequest, RankingRequest, RankingService,
    RawCandidate, RawRankingResponse, RawSectionSelection, SectionRequest,
};
pub use snapshot::{hero_snapshot, section_snapshot, Snapshot, SnapshotEntry};
pub use validate::{ProtocolIssue, RequestedSection};

/// How the curation phase ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CurationStatus {
    Completed,
    /// Nothing to rank; the service was not called.
    EmptyPool,
    Cancelled,
    Failed(String),
}

impl CurationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::EmptyPool => "empty_pool",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

/// A section whose own ranking call failed (`PerSection` mode only).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionCallFailure {
    pub section_index: usize,
    pub heading: String,
    pub reason: String,
}

/// Validated curation output. The only ranking data that flows downstream.
#[derive(Debug, Clone, Serialize)]
pub struct Curation {
    pub status: CurationStatus,
    pub hero_candidates: Vec<RankedCandidate>,
    pub sections: Vec<SectionSelection>,
    pub usage: Usage,
    pub issues: Vec<ProtocolIssue>,
    pub failed_sections: Vec<SectionCallFailure>,
}

impl Curation {
    fn empty(status: CurationStatus) -> Self {
        Self {
            status,
            hero_candidates: Vec::new(),
            sections: Vec::new(),
            usage: Usage::default(),
            issues: Vec::new(),
            failed_sections: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hero_candidates.is_empty() && self.sections.iter().all(|s| s.candidates.is_empty())
    }
}

/// Obtain validated candidate lists for the hero and every planned section.
#[instrument(skip_all, fields(pool = pool.len(), sections = plan.sections.len(), mode = ?config.mode))]
pub async fn curate(
    service: &dyn RankingService,
    pool: &ImagePool,
    plan: &SectionPlan,
    config: &CurationConfig,
    cancel: &CancelSignal,
) -> Curation {
    if pool.is_empty() {
        info!("pool is empty; skipping ranking");
        return Curation::empty(CurationStatus::EmptyPool);
    }
    if cancel.is_cancelled() {
        return Curation::empty(CurationStatus::Cancelled);
    }

    let hero = hero_snapshot(pool, config.hero_snapshot_cap);
    let sections: Vec<RequestedSection> = plan
        .sections
        .iter()
        .enumerate()
        .map(|(section_index, section)| RequestedSection {
            section_index,
            heading: section.heading.clone(),
            snapshot: section_snapshot(pool, section, config.section_snapshot_cap),
        })
        .collect();

    let curation = match config.mode {
        CurationMode::Combined => curate_combined(service, plan, &hero, &sections, config).await,
        CurationMode::PerSection => {
            curate_per_section(service, plan, &hero, &sections, config, cancel).await
        }
    };

    info!(
        status = curation.status.as_str(),
        hero_candidates = curation.hero_candidates.len(),
        sections = curation.sections.len(),
        issues = curation.issues.len(),
        calls = curation.usage.calls,
        "curation finished"
    );
    curation
}

async fn curate_combined(
    service: &dyn RankingService,
    plan: &SectionPlan,
    hero: &Snapshot,
    sections: &[RequestedSection],
    config: &CurationConfig,
) -> Curation {
    let request = RankingRequest {
        article_outline: outline(plan),
        hero: Some(hero_request(hero, config)),
        sections: plan
            .sections
            .iter()
            .zip(sections)
            .map(|(planned, requested)| section_request(planned, &requested.snapshot, config))
            .collect(),
    };

    let response = match call(service, request).await {
        Ok(response) => response,
        Err(err) => return Curation::empty(CurationStatus::Failed(err.to_string())),
    };

    let mut curation = Curation::empty(CurationStatus::Completed);
    curation.usage = call_usage(&response);
    curation.hero_candidates = validate::validate_candidates(
        &Slot::Hero,
        &response.hero,
        hero,
        config.max_hero_candidates,
        &mut curation.issues,
    );
    curation.sections = validate::validate_sections(
        &response.sections,
        sections,
        config.max_section_candidates,
        &mut curation.issues,
    );
    curation
}

async fn curate_per_section(
    service: &dyn RankingService,
    plan: &SectionPlan,
    hero: &Snapshot,
    sections: &[RequestedSection],
    config: &CurationConfig,
    cancel: &CancelSignal,
) -> Curation {
    let request = RankingRequest {
        article_outline: outline(plan),
        hero: Some(hero_request(hero, config)),
        sections: Vec::new(),
    };
    let response = match call(service, request).await {
        Ok(response) => response,
        Err(err) => return Curation::empty(CurationStatus::Failed(err.to_string())),
    };

    let mut curation = Curation::empty(CurationStatus::Completed);
    curation.usage = call_usage(&response);
    curation.hero_candidates = validate::validate_candidates(
        &Slot::Hero,
        &response.hero,
        hero,
        config.max_hero_candidates,
        &mut curation.issues,
    );

    let article_outline = outline(plan);
    let mut results: Vec<(usize, Result<RawRankingResponse, RankingError>)> =
        stream::iter(plan.sections.iter().zip(sections).enumerate())
            .map(|(position, (planned, requested))| {
                let request = RankingRequest {
                    article_outline: article_outline.clone(),
                    hero: None,
                    sections: vec![section_request(planned, &requested.snapshot, config)],
                };
                async move {
                    if cancel.is_cancelled() {
                        return (position, Err(RankingError::Cancelled));
                    }
                    (position, call(service, request).await)
                }
            })
            .buffer_unordered(config.curation_concurrency.max(1))
            .collect()
            .await;

    results.sort_by_key(|(position, _)| *position);

    for (position, result) in results {
        let requested = &sections[position];
        match result {
            Ok(response) => {
                curation.usage += call_usage(&response);
                let mut selections = validate::validate_sections(
                    &response.sections,
                    std::slice::from_ref(requested),
                    config.max_section_candidates,
                    &mut curation.issues,
                );
                curation.sections.append(&mut selections);
            }
            Err(err) => {
                warn!(heading = %requested.heading, error = %err, "section ranking call failed; dropping section");
                curation.failed_sections.push(SectionCallFailure {
                    section_index: requested.section_index,
                    heading: requested.heading.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    curation
}

async fn call(
    service: &dyn RankingService,
    request: RankingRequest,
) -> Result<RawRankingResponse, RankingError> {
    METRICS.inc_ranking_calls();
    let slots = request.slot_count();
    service.rank(request).await.map_err(|err| {
        warn!(slots, error = %err, "ranking call failed");
        err
    })
}

/// Usage for one successful call; always counts as one call.
fn call_usage(response: &RawRankingResponse) -> Usage {
    Usage {
        calls: 1,
        ..response.usage
    }
}

fn outline(plan: &SectionPlan) -> Vec<String> {
    plan.sections.iter().map(|s| s.heading.clone()).collect()
}

fn hero_request(snapshot: &Snapshot, config: &CurationConfig) -> HeroRequest {
    HeroRequest {
        max_candidates: config.max_hero_candidates,
        min_width: config.hero.min_width,
        candidates: snapshot.entries(),
    }
}

fn section_request(
    planned: &PlannedSection,
    snapshot: &Snapshot,
    config: &CurationConfig,
) -> SectionRequest {
    SectionRequest {
        heading: planned.heading.clone(),
        goal: planned.goal.clone(),
        max_candidates: config.max_section_candidates,
        min_width: config.section.min_width,
        candidates: snapshot.entries(),
    }
}
