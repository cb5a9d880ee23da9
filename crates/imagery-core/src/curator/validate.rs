//! Turning an untrusted ranking reply into validated candidates.
//!
//! Every rule here drops instead of repairing: a bad index is never clamped
//! and an unknown heading is never guessed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::curator::ranking::{RawCandidate, RawSectionSelection};
use crate::curator::snapshot::Snapshot;
use crate::domain::{normalize_heading, CollectedImage, RankedCandidate, SectionSelection, Slot};

const HERO_ALT_FALLBACK: &str = "Featured image";

/// A reply item that was dropped, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolIssue {
    MissingIndex { slot: Slot },
    IndexOutOfRange { slot: Slot, index: i64, snapshot_len: usize },
    DuplicateIndex { slot: Slot, index: usize },
    Truncated { slot: Slot, dropped: usize },
    UnknownHeading { heading: String },
    DuplicateSection { heading: String },
}

impl std::fmt::Display for ProtocolIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingIndex { slot } => write!(f, "{slot}: candidate without a usable index"),
            Self::IndexOutOfRange {
                slot,
                index,
                snapshot_len,
            } => write!(f, "{slot}: index {index} outside snapshot of {snapshot_len}"),
            Self::DuplicateIndex { slot, index } => write!(f, "{slot}: index {index} repeated"),
            Self::Truncated { slot, dropped } => {
                write!(f, "{slot}: {dropped} candidates over the limit")
            }
            Self::UnknownHeading { heading } => write!(f, "unknown section heading '{heading}'"),
            Self::DuplicateSection { heading } => write!(f, "section '{heading}' listed twice"),
        }
    }
}

/// A section as it was requested: plan position plus its snapshot.
#[derive(Debug, Clone)]
pub struct RequestedSection {
    pub section_index: usize,
    pub heading: String,
    pub snapshot: Snapshot,
}

/// Check one slot's candidate list against the snapshot it was shown.
///
/// Order of rules: unusable or out-of-range indices and repeats are dropped,
/// the rest is sorted best-first (stable) and cut to `limit`.
pub fn validate_candidates(
    slot: &Slot,
    raw: &[RawCandidate],
    snapshot: &Snapshot,
    limit: usize,
    issues: &mut Vec<ProtocolIssue>,
) -> Vec<RankedCandidate> {
    let mut seen = HashSet::new();
    let mut accepted = Vec::with_capacity(raw.len().min(snapshot.len()));

    for candidate in raw {
        let Some(index) = candidate.candidate_index else {
            warn!(slot = %slot, "dropping candidate without index");
            issues.push(ProtocolIssue::MissingIndex { slot: slot.clone() });
            continue;
        };
        let image = usize::try_from(index)
            .ok()
            .and_then(|i| snapshot.get(i).map(|image| (i, image)));
        let Some((index, image)) = image else {
            warn!(slot = %slot, index, snapshot_len = snapshot.len(), "dropping out-of-range candidate index");
            issues.push(ProtocolIssue::IndexOutOfRange {
                slot: slot.clone(),
                index,
                snapshot_len: snapshot.len(),
            });
            continue;
        };
        if !seen.insert(index) {
            warn!(slot = %slot, index, "dropping repeated candidate index");
            issues.push(ProtocolIssue::DuplicateIndex {
                slot: slot.clone(),
                index,
            });
            continue;
        }

        accepted.push(RankedCandidate {
            candidate_index: index,
            image: Arc::clone(image),
            alt_text: alt_text_for(slot, candidate.alt_text.as_deref(), image),
            caption: candidate.caption.as_deref().and_then(single_line),
            relevance_score: candidate
                .relevance_score
                .filter(|s| s.is_finite())
                .unwrap_or(0.0) as f32,
        });
    }

    accepted.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

    if accepted.len() > limit {
        let dropped = accepted.len() - limit;
        issues.push(ProtocolIssue::Truncated {
            slot: slot.clone(),
            dropped,
        });
        accepted.truncate(limit);
    }
    accepted
}

/// Match reply sections to requested ones and validate each.
///
/// The k-th reply entry for a heading fills the k-th requested section with
/// that heading, so a plan that repeats a heading gets each copy filled.
/// Entries beyond the requested copies are dropped as repeats, unknown
/// headings are dropped outright. Output follows plan order.
pub fn validate_sections(
    raw: &[RawSectionSelection],
    requested: &[RequestedSection],
    limit: usize,
    issues: &mut Vec<ProtocolIssue>,
) -> Vec<SectionSelection> {
    let normalized: Vec<String> = requested
        .iter()
        .map(|r| normalize_heading(&r.heading))
        .collect();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut sections = Vec::with_capacity(requested.len());

    for selection in raw {
        let wanted = normalize_heading(&selection.heading);
        if wanted.is_empty() || !normalized.contains(&wanted) {
            warn!(heading = %selection.heading, "dropping section with unknown heading");
            issues.push(ProtocolIssue::UnknownHeading {
                heading: selection.heading.clone(),
            });
            continue;
        }

        let occurrence = seen.entry(wanted.clone()).or_insert(0);
        let position = normalized
            .iter()
            .enumerate()
            .filter(|(_, h)| **h == wanted)
            .nth(*occurrence)
            .map(|(i, _)| i);
        *occurrence += 1;
        let Some(position) = position else {
            warn!(heading = %selection.heading, "dropping repeated section");
            issues.push(ProtocolIssue::DuplicateSection {
                heading: selection.heading.clone(),
            });
            continue;
        };

        let section = &requested[position];
        let slot = Slot::Section {
            index: section.section_index,
            heading: section.heading.clone(),
        };
        let candidates =
            validate_candidates(&slot, &selection.candidates, &section.snapshot, limit, issues);
        sections.push(SectionSelection {
            section_index: section.section_index,
            heading: section.heading.clone(),
            candidates,
        });
    }

    sections.sort_by_key(|s| s.section_index);
    sections
}

fn alt_text_for(slot: &Slot, raw: Option<&str>, image: &CollectedImage) -> String {
    raw.and_then(single_line)
        .or_else(|| image.description.as_deref().and_then(single_line))
        .or_else(|| slot.heading().and_then(single_line))
        .unwrap_or_else(|| HERO_ALT_FALLBACK.to_string())
}

/// Collapse whitespace runs (including newlines) to single spaces.
fn single_line(text: &str) -> Option<String> {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!joined.is_empty()).then_some(joined)
}
