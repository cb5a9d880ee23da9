//! Validated ranking output.
//!
//! These types are only produced by [`crate::curator::validate`]; the raw,
//! untrusted reply lives in [`crate::curator::ranking`].

use std::ops::AddAssign;
use std::sync::Arc;

use serde::Serialize;

use crate::domain::image::CollectedImage;

/// A candidate proposed by the ranking service and checked against the
/// snapshot it was shown.
#[derive(Debug, Clone, Serialize)]
pub struct RankedCandidate {
    /// Position in the snapshot the service saw.
    pub candidate_index: usize,
    /// Snapshot entry at `candidate_index`.
    pub image: Arc<CollectedImage>,
    pub alt_text: String,
    pub caption: Option<String>,
    pub relevance_score: f32,
}

/// Best-first candidates for one planned section.
#[derive(Debug, Clone, Serialize)]
pub struct SectionSelection {
    /// Index into the section plan.
    pub section_index: usize,
    /// Heading as written in the plan (not as echoed by the service).
    pub heading: String,
    pub candidates: Vec<RankedCandidate>,
}

/// Usage and cost metadata summed over ranking calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, serde::Deserialize)]
pub struct Usage {
    pub calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl Usage {
    pub fn is_zero(&self) -> bool {
        self.calls == 0 && self.input_tokens == 0 && self.output_tokens == 0 && self.cost_usd == 0.0
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.calls += rhs.calls;
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.cost_usd += rhs.cost_usd;
    }
}

impl std::iter::Sum for Usage {
    fn sum<I: Iterator<Item = Usage>>(iter: I) -> Self {
        let mut total = Usage::default();
        for u in iter {
            total += u;
        }
        total
    }
}
