//! Batched uploads with per-item failure tolerance.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelSignal;
use crate::domain::{
    Dimensions, ImageKey, ImagePayload, ImageSource, ResolvedAssignment, Slot, StorageError,
};
use crate::metrics::METRICS;

/// Where an image came from, carried to storage for credit lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub source: ImageSource,
    pub origin_page_url: Option<String>,
    pub origin_domain: Option<String>,
    pub official: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub alt_text: String,
    pub caption: Option<String>,
    pub attribution: Attribution,
    /// Folder hint; backends may ignore it.
    pub folder: Option<String>,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadRequest {
    pub payload: ImagePayload,
    pub dimensions: Dimensions,
    pub metadata: UploadMetadata,
}

impl UploadRequest {
    /// Build the request for `assignment`, reusing its downloaded payload.
    pub fn for_assignment(assignment: &ResolvedAssignment, folder: Option<&str>) -> Self {
        let image = &assignment.image;
        let stem = match assignment.slot.heading() {
            Some(heading) => slugify(heading),
            None => "hero".to_string(),
        };
        let digest = &assignment.payload.digest;
        let filename = format!(
            "{stem}-{}.{}",
            &digest[..digest.len().min(12)],
            assignment.payload.extension()
        );
        Self {
            payload: assignment.payload.clone(),
            dimensions: assignment.dimensions,
            metadata: UploadMetadata {
                alt_text: assignment.alt_text.clone(),
                caption: assignment.caption.clone(),
                attribution: Attribution {
                    source: image.source,
                    origin_page_url: image.origin_page_url.clone(),
                    origin_domain: image.origin_domain.clone(),
                    official: image.official,
                },
                folder: folder.map(str::to_string),
                filename,
            },
        }
    }
}

/// What the backend stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub id: String,
    pub public_url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Receives final uploads.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<StoredImage, StorageError>;
}

/// A slot whose image made it to storage.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedImage {
    pub slot: Slot,
    pub key: ImageKey,
    pub alt_text: String,
    pub caption: Option<String>,
    pub dimensions: Dimensions,
    pub stored: StoredImage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadFailure {
    pub slot: Slot,
    pub key: ImageKey,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub uploaded: Vec<UploadedImage>,
    pub failures: Vec<UploadFailure>,
    /// Slots skipped because their key or bytes were already uploaded in this run.
    pub duplicates: Vec<Slot>,
    /// Slots never attempted because the run was cancelled.
    pub cancelled: Vec<Slot>,
}

impl UploadReport {
    pub fn hero(&self) -> Option<&UploadedImage> {
        self.uploaded.iter().find(|u| u.slot.is_hero())
    }

    pub fn sections(&self) -> impl Iterator<Item = &UploadedImage> {
        self.uploaded.iter().filter(|u| !u.slot.is_hero())
    }
}

/// Upload `assignments` in fixed-size batches.
///
/// Items within a batch run concurrently; one failure never affects the
/// others. Cancellation is checked before each batch.
#[instrument(skip_all, fields(assignments = assignments.len(), batch_size = batch_size))]
pub async fn upload_assignments(
    backend: &dyn StorageBackend,
    assignments: &[ResolvedAssignment],
    batch_size: usize,
    folder: Option<&str>,
    cancel: &CancelSignal,
) -> UploadReport {
    let mut report = UploadReport::default();

    let mut seen_keys = HashSet::new();
    let mut seen_digests = HashSet::new();
    let mut unique = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let fresh_key = !seen_keys.contains(assignment.key());
        let fresh_bytes = !seen_digests.contains(assignment.payload.digest.as_str());
        if fresh_key && fresh_bytes {
            seen_keys.insert(assignment.key().clone());
            seen_digests.insert(assignment.payload.digest.as_str());
            unique.push(assignment);
        } else {
            warn!(slot = %assignment.slot, key = %assignment.key(), digest = %assignment.payload.digest, "skipping duplicate upload");
            report.duplicates.push(assignment.slot.clone());
        }
    }

    for (batch_no, batch) in unique.chunks(batch_size.max(1)).enumerate() {
        if cancel.is_cancelled() {
            let done = batch_no * batch_size.max(1);
            debug!(remaining = unique.len() - done, "upload cancelled");
            report
                .cancelled
                .extend(unique[done..].iter().map(|a| a.slot.clone()));
            break;
        }

        let results = join_all(batch.iter().map(|assignment| async move {
            let request = UploadRequest::for_assignment(assignment, folder);
            (*assignment, backend.upload(request).await)
        }))
        .await;

        for (assignment, result) in results {
            match result {
                Ok(stored) => report.uploaded.push(UploadedImage {
                    slot: assignment.slot.clone(),
                    key: assignment.key().clone(),
                    alt_text: assignment.alt_text.clone(),
                    caption: assignment.caption.clone(),
                    dimensions: assignment.dimensions,
                    stored,
                }),
                Err(err) => {
                    METRICS.inc_uploads_failed();
                    warn!(slot = %assignment.slot, key = %assignment.key(), error = %err, "upload failed");
                    report.failures.push(UploadFailure {
                        slot: assignment.slot.clone(),
                        key: assignment.key().clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    info!(
        uploaded = report.uploaded.len(),
        failed = report.failures.len(),
        "uploads finished"
    );
    report
}

/// Lowercase ASCII slug, at most 48 chars.
pub(crate) fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let mut slug: String = slug.trim_end_matches('-').chars().take(48).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "image".to_string()
    } else {
        slug
    }
}
