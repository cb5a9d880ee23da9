//! One article run: aggregate, curate, resolve, upload, place.
//!
//! [`ImageryPipeline::run`] never fails. Every degradation is recorded in the
//! returned [`ImageryOutcome`] and the article body always comes back, with
//! or without images.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};

use crate::cancel::CancelSignal;
use crate::config::CurationConfig;
use crate::curator::{curate, CurationStatus, ProtocolIssue, RankingService, SectionCallFailure};
use crate::domain::{SectionPlan, Slot, Usage};
use crate::identity::normalize_url;
use crate::metrics::METRICS;
use crate::obs;
use crate::placement::{
    insert_images, upload_assignments, FeaturedImage, StorageBackend, UnplacedImage,
    UploadFailure,
};
use crate::pool::{ImagePool, IngestReport, PoolSummary, RawImage, SearchEngine};
use crate::resolver::{ExclusionSet, Resolver, SlotResolution};

/// Catalog imagery for the article's subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogInput {
    #[serde(default)]
    pub screenshots: Vec<RawImage>,
    #[serde(default)]
    pub artworks: Vec<RawImage>,
    #[serde(default)]
    pub cover: Option<RawImage>,
}

/// One web-search result batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebBatch {
    pub engine: SearchEngine,
    pub query: String,
    #[serde(default)]
    pub images: Vec<RawImage>,
}

/// Images extracted from one source article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedBatch {
    pub page_url: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub images: Vec<RawImage>,
}

/// Everything one run needs from upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleImageryRequest {
    #[serde(default)]
    pub run_id: Option<String>,
    pub body: String,
    pub plan: SectionPlan,
    #[serde(default)]
    pub catalog: CatalogInput,
    #[serde(default)]
    pub web: Vec<WebBatch>,
    #[serde(default)]
    pub extracted: Vec<ExtractedBatch>,
    /// Images the article already shows; never assigned again.
    #[serde(default)]
    pub existing_image_urls: Vec<String>,
}

impl ArticleImageryRequest {
    /// Build the pool: catalog first, then web batches, then extracted batches.
    pub fn aggregate(&self, config: &CurationConfig) -> (ImagePool, IngestReport) {
        let mut report = IngestReport::default();
        let outcome = ImagePool::new(config).ingest_catalog_images(
            &self.catalog.screenshots,
            &self.catalog.artworks,
            self.catalog.cover.as_ref(),
        );
        report.merge(&outcome.report);
        let mut pool = outcome.pool;

        for batch in &self.web {
            let outcome = pool.ingest_web_images(&batch.images, &batch.query, batch.engine);
            report.merge(&outcome.report);
            pool = outcome.pool;
        }
        for batch in &self.extracted {
            let outcome = pool.ingest_extracted_images(
                &batch.images,
                &batch.page_url,
                batch.domain.as_deref(),
            );
            report.merge(&outcome.report);
            pool = outcome.pool;
        }
        (pool, report)
    }
}

/// Everything that happened in one run.
#[derive(Debug, Clone, Serialize)]
pub struct ImageryOutcome {
    pub run_id: String,
    /// Article body with section images spliced in (the input body on error).
    pub body: String,
    pub featured: Option<FeaturedImage>,

    pub pool: PoolSummary,
    pub ingest: IngestReport,

    pub curation_status: CurationStatus,
    pub usage: Usage,
    pub protocol_issues: Vec<ProtocolIssue>,
    pub failed_sections: Vec<SectionCallFailure>,

    pub slots: Vec<SlotResolution>,

    pub upload_failures: Vec<UploadFailure>,
    pub duplicate_uploads: Vec<Slot>,

    pub placed: Vec<Slot>,
    pub unplaced: Vec<UnplacedImage>,
    pub placement_error: Option<String>,

    pub cancelled: bool,
    pub duration_ms: u64,
}

impl ImageryOutcome {
    /// Section images placed in the body plus the featured image.
    pub fn images_placed(&self) -> usize {
        self.placed.len() + usize::from(self.featured.is_some())
    }
}

/// The four stages wired to their collaborators.
#[derive(Clone)]
pub struct ImageryPipeline {
    ranking: Arc<dyn RankingService>,
    resolver: Resolver,
    storage: Arc<dyn StorageBackend>,
    config: CurationConfig,
}

impl ImageryPipeline {
    pub fn new(
        ranking: Arc<dyn RankingService>,
        resolver: Resolver,
        storage: Arc<dyn StorageBackend>,
        config: CurationConfig,
    ) -> Self {
        Self {
            ranking,
            resolver,
            storage,
            config,
        }
    }

    pub fn config(&self) -> &CurationConfig {
        &self.config
    }

    pub async fn run(&self, request: &ArticleImageryRequest, cancel: &CancelSignal) -> ImageryOutcome {
        let run_id = request
            .run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = obs::run_span(&run_id);
        self.run_stages(run_id, request, cancel)
            .instrument(span)
            .await
    }

    async fn run_stages(
        &self,
        run_id: String,
        request: &ArticleImageryRequest,
        cancel: &CancelSignal,
    ) -> ImageryOutcome {
        let started = Instant::now();
        let (pool, ingest) = request.aggregate(&self.config);
        let summary = pool.summarize();
        obs::emit_run_started(&run_id, request.plan.sections.len(), pool.len());
        obs::emit_pool_summarized(summary.total, summary.catalog, summary.web, summary.extracted);

        let curation = curate(
            self.ranking.as_ref(),
            &pool,
            &request.plan,
            &self.config,
            cancel,
        )
        .await;
        obs::emit_curation_finished(
            curation.status.as_str(),
            curation.hero_candidates.len(),
            curation.usage.calls,
            curation.usage.cost_usd,
        );
        if let CurationStatus::Failed(reason) = &curation.status {
            obs::emit_stage_degraded("curation", reason);
        }

        let exclusions = ExclusionSet::new();
        for raw in &request.existing_image_urls {
            if let Ok(url) = normalize_url(raw, self.config.query_policy) {
                exclusions.claim(&url.key);
            }
        }

        let resolution = self.resolver.resolve(&curation, exclusions, cancel).await;

        let assignments: Vec<_> = resolution.assignments().cloned().collect();
        let uploads = upload_assignments(
            self.storage.as_ref(),
            &assignments,
            self.config.upload_batch_size,
            self.config.upload_folder.as_deref(),
            cancel,
        )
        .await;
        obs::emit_upload_finished(uploads.uploaded.len(), uploads.failures.len());

        let insertion = insert_images(&request.body, &request.plan, &uploads.uploaded);
        if let Some(err) = &insertion.error {
            obs::emit_stage_degraded("placement", err);
        }
        let featured = uploads.hero().map(FeaturedImage::from);

        let mut slots = Vec::with_capacity(resolution.sections.len() + 1);
        slots.extend(resolution.hero);
        slots.extend(resolution.sections);

        let outcome = ImageryOutcome {
            run_id,
            body: insertion.body,
            featured,
            pool: summary,
            ingest,
            curation_status: curation.status,
            usage: curation.usage,
            protocol_issues: curation.issues,
            failed_sections: curation.failed_sections,
            slots,
            upload_failures: uploads.failures,
            duplicate_uploads: uploads.duplicates,
            placed: insertion.placed,
            unplaced: insertion.unplaced,
            placement_error: insertion.error.map(|e| e.to_string()),
            cancelled: cancel.is_cancelled(),
            duration_ms: started.elapsed().as_millis() as u64,
        };

        obs::emit_run_finished(
            &outcome.run_id,
            outcome.duration_ms,
            outcome.images_placed(),
            outcome.cancelled,
        );
        METRICS.flush();
        info!(
            placed = outcome.images_placed(),
            unplaced = outcome.unplaced.len(),
            upload_failures = outcome.upload_failures.len(),
            "run finished"
        );
        outcome
    }
}
