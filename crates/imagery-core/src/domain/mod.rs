//! Domain model for the imagery pipeline.
//!
//! - `CollectedImage`: immutable pool entry with its normalized identity
//! - `SectionPlan`: sections the writer produced
//! - `RankedCandidate` / `SectionSelection`: validated ranking output
//! - `ResolvedAssignment`: a slot's final, binary-backed image

pub mod assignment;
pub mod candidate;
pub mod error;
pub mod image;
pub mod plan;

pub use assignment::{DimensionProvenance, Dimensions, ImagePayload, ResolvedAssignment, Slot};
pub use candidate::{RankedCandidate, SectionSelection, Usage};
pub use error::{
    ConfigError, FetchError, ImageryError, PlacementError, RankingError, Result, StorageError,
    UrlError,
};
pub use image::{CollectedImage, ImageKey, ImageSource, SubType};
pub use plan::{normalize_heading, PlannedSection, SectionPlan};
