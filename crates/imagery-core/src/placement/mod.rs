//! Upload & placement.
//!
//! - [`upload`]: batched uploads to a [`StorageBackend`], failures per item
//! - [`insert`]: idempotent splicing of section references into the body

pub mod insert;
pub mod upload;

pub use insert::{insert_images, render_reference, FeaturedImage, Insertion, UnplacedImage};
pub use upload::{
    upload_assignments, Attribution, StorageBackend, StoredImage, UploadFailure, UploadMetadata,
    UploadReport, UploadRequest, UploadedImage,
};
