//! Article Imagery Core Library
//!
//! Collects candidate images from catalog, web-search and source-article
//! producers, asks a ranking service to pick images per slot, resolves the
//! rankings into validated binaries, uploads them and places references in
//! the article body.

pub mod cancel;
pub mod config;
pub mod curator;
pub mod domain;
pub mod fakes;
pub mod identity;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod placement;
pub mod pool;
pub mod resolver;
pub mod storage;

pub use cancel::CancelSignal;
pub use config::{CurationConfig, CurationMode, InferredDimensionPolicy, QueryPolicy, SlotPolicy};

pub use domain::{
    CollectedImage, ConfigError, DimensionProvenance, Dimensions, FetchError, ImageKey,
    ImagePayload, ImageSource, ImageryError, PlacementError, PlannedSection, RankedCandidate,
    RankingError, ResolvedAssignment, Result, SectionPlan, SectionSelection, Slot, StorageError,
    SubType, Usage, UrlError,
};

pub use identity::{normalize_url, NormalizedUrl};

pub use pool::{ImagePool, IngestReport, PoolSummary, Producer, RawImage, SearchEngine};

pub use curator::{
    curate, Curation, CurationStatus, ProtocolIssue, RankingRequest, RankingService,
    RawRankingResponse,
};

pub use resolver::{
    Claim, ClarityValidator, ExclusionSet, FetchedImage, ImageFetcher, QualityGates, QualityValidator,
    Resolution, Resolver, SlotResolution,
};

pub use placement::{
    insert_images, upload_assignments, FeaturedImage, Insertion, StorageBackend, StoredImage,
    UploadReport, UploadRequest, UploadedImage,
};

pub use pipeline::{ArticleImageryRequest, ImageryOutcome, ImageryPipeline};

pub use storage::FsImageStore;
pub use obs::init_tracing;
