//! Global atomic counters for imagery runs.
//!
//! Counters are bumped at the call site. Call [`Metrics::flush`] to emit the
//! current values as a single `tracing::info!` event (e.g. at the end of a run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    images_ingested: AtomicU64,
    images_rejected: AtomicU64,
    ranking_calls: AtomicU64,
    downloads: AtomicU64,
    uploads_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            images_ingested: AtomicU64::new(0),
            images_rejected: AtomicU64::new(0),
            ranking_calls: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
            uploads_failed: AtomicU64::new(0),
        }
    }

    pub fn add_images_ingested(&self, n: u64) {
        if n > 0 {
            self.images_ingested.fetch_add(n, Ordering::Relaxed);
            tracing::trace!(metric = "images_ingested", n, "counter incremented");
        }
    }

    /// Malformed plus filtered inputs. Duplicates are not rejections.
    pub fn add_images_rejected(&self, n: u64) {
        if n > 0 {
            self.images_rejected.fetch_add(n, Ordering::Relaxed);
            tracing::trace!(metric = "images_rejected", n, "counter incremented");
        }
    }

    pub fn inc_ranking_calls(&self) {
        self.ranking_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "ranking_calls", "counter incremented");
    }

    pub fn inc_downloads(&self) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "downloads", "counter incremented");
    }

    pub fn inc_uploads_failed(&self) {
        self.uploads_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "uploads_failed", "counter incremented");
    }

    /// Emit all current counter values as one `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            images_ingested = self.images_ingested(),
            images_rejected = self.images_rejected(),
            ranking_calls = self.ranking_calls(),
            downloads = self.downloads(),
            uploads_failed = self.uploads_failed(),
        );
    }

    pub fn images_ingested(&self) -> u64 {
        self.images_ingested.load(Ordering::Relaxed)
    }

    pub fn images_rejected(&self) -> u64 {
        self.images_rejected.load(Ordering::Relaxed)
    }

    pub fn ranking_calls(&self) -> u64 {
        self.ranking_calls.load(Ordering::Relaxed)
    }

    pub fn downloads(&self) -> u64 {
        self.downloads.load(Ordering::Relaxed)
    }

    pub fn uploads_failed(&self) -> u64 {
        self.uploads_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.images_ingested.store(0, Ordering::Relaxed);
        self.images_rejected.store(0, Ordering::Relaxed);
        self.ranking_calls.store(0, Ordering::Relaxed);
        self.downloads.store(0, Ordering::Relaxed);
        self.uploads_failed.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.add_images_ingested(3);
        m.add_images_ingested(0);
        assert_eq!(m.images_ingested(), 3);

        m.add_images_rejected(2);
        assert_eq!(m.images_rejected(), 2);

        m.inc_ranking_calls();
        m.inc_downloads();
        m.inc_downloads();
        m.inc_uploads_failed();
        assert_eq!(m.ranking_calls(), 1);
        assert_eq!(m.downloads(), 2);
        assert_eq!(m.uploads_failed(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.add_images_ingested(1);
        m.inc_ranking_calls();
        m.inc_uploads_failed();
        m.reset();
        assert_eq!(m.images_ingested(), 0);
        assert_eq!(m.ranking_calls(), 0);
        assert_eq!(m.uploads_failed(), 0);
    }
}
