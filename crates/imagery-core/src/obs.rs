//! Structured lifecycle events for imagery runs, and the subscriber setup
//! the binaries install.
//!
//! Every event carries an `event` field so log pipelines can filter on it.

use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Default directives when `RUST_LOG` is unset: `level` for the imagery
/// crates, warnings for everything else.
fn default_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_ascii_lowercase();
    EnvFilter::new(format!(
        "warn,imagery_core={level},imagery_http={level},imagery={level}"
    ))
}

/// Install the global subscriber, writing to stderr.
///
/// Closing an `imagery.run` span logs its duration alongside `run_id`.
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));
    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
        base.json().with_filter(filter).boxed()
    } else {
        base.with_filter(filter).boxed()
    };
    tracing_subscriber::registry().with(layer).try_init().ok();
}

/// Run-scoped span; instrument the run future with it.
///
/// ```ignore
/// run(request).instrument(run_span("run-1234")).await
/// // every event inside carries run_id = "run-1234"
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("imagery.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, sections: usize, pool_size: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        sections = sections,
        pool_size = pool_size,
    );
}

pub fn emit_pool_summarized(total: usize, catalog: usize, web: usize, extracted: usize) {
    info!(
        event = "pool.summarized",
        total = total,
        catalog = catalog,
        web = web,
        extracted = extracted,
    );
}

/// Emit event: curation finished with its status and token usage.
pub fn emit_curation_finished(status: &str, hero_candidates: usize, calls: u32, cost_usd: f64) {
    info!(
        event = "curation.finished",
        status = %status,
        hero_candidates = hero_candidates,
        calls = calls,
        cost_usd = cost_usd,
    );
}

/// Emit event: one slot settled, with the rank that won (if any).
pub fn emit_slot_resolved(slot: &dyn std::fmt::Display, rank: Option<usize>, attempts: usize) {
    info!(
        event = "slot.resolved",
        slot = %slot,
        rank = ?rank,
        attempts = attempts,
    );
}

pub fn emit_upload_finished(uploaded: usize, failed: usize) {
    info!(event = "upload.finished", uploaded = uploaded, failed = failed);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, placed: usize, cancelled: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        placed = placed,
        cancelled = cancelled,
    );
}

/// Emit event: a stage failed and the run degraded (warning level).
pub fn emit_stage_degraded(stage: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "run.stage_degraded", stage = %stage, error = %error);
}
