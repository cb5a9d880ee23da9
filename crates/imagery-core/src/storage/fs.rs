use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::domain::StorageError;
use crate::placement::{StorageBackend, StoredImage, UploadMetadata, UploadRequest};

/// Content-addressed directory store.
///
/// Layout: `<root>/<folder>/<sha256>.<ext>` plus `<sha256>.json` holding the
/// upload metadata. The public URL is `<base_url>/<folder>/<sha256>.<ext>`.
#[derive(Debug, Clone)]
pub struct FsImageStore {
    root: PathBuf,
    base_url: String,
}

/// Metadata sidecar written next to each image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSidecar {
    pub id: String,
    pub mime: String,
    pub size: usize,
    pub width: u32,
    pub height: u32,
    pub metadata: UploadMetadata,
    pub stored_at: DateTime<Utc>,
}

impl FsImageStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>, base_url: impl Into<String>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write(&self, request: &UploadRequest) -> Result<StoredImage, StorageError> {
        let folder = sanitize_folder(request.metadata.folder.as_deref())?;
        let digest = &request.payload.digest;
        let file_name = format!("{digest}.{}", request.payload.extension());
        let relative = match &folder {
            Some(folder) => format!("{folder}/{file_name}"),
            None => file_name.clone(),
        };

        let dir = match &folder {
            Some(folder) => self.root.join(folder),
            None => self.root.clone(),
        };
        fs::create_dir_all(&dir)?;

        let path = dir.join(&file_name);
        if path.exists() {
            debug!(path = %path.display(), "image already stored");
        } else {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&request.payload.bytes)?;
            tmp.persist(&path).map_err(|e| e.error)?;
        }

        let sidecar = StoredSidecar {
            id: digest.clone(),
            mime: request.payload.mime.clone(),
            size: request.payload.size,
            width: request.dimensions.width,
            height: request.dimensions.height,
            metadata: request.metadata.clone(),
            stored_at: Utc::now(),
        };
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &sidecar)?;
        tmp.persist(dir.join(format!("{digest}.json")))
            .map_err(|e| e.error)?;

        Ok(StoredImage {
            id: digest.clone(),
            public_url: format!("{}/{relative}", self.base_url),
            width: Some(request.dimensions.width).filter(|w| *w > 0),
            height: Some(request.dimensions.height).filter(|h| *h > 0),
        })
    }

    /// Read back the sidecar for `id` in `folder`.
    pub fn sidecar(&self, folder: Option<&str>, id: &str) -> Result<StoredSidecar, StorageError> {
        let dir = match sanitize_folder(folder)? {
            Some(folder) => self.root.join(folder),
            None => self.root.clone(),
        };
        let raw = fs::read(dir.join(format!("{id}.json")))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[async_trait]
impl StorageBackend for FsImageStore {
    async fn upload(&self, request: UploadRequest) -> Result<StoredImage, StorageError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.write(&request))
            .await
            .map_err(|e| StorageError::Io(format!("upload task failed: {e}")))?
    }
}

/// Relative folder made of `[A-Za-z0-9_-]` segments; anything else is rejected.
fn sanitize_folder(folder: Option<&str>) -> Result<Option<String>, StorageError> {
    let Some(folder) = folder.map(|f| f.trim().trim_matches('/')) else {
        return Ok(None);
    };
    if folder.is_empty() {
        return Ok(None);
    }
    for segment in folder.split('/') {
        let valid = !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::Rejected(format!("invalid folder '{folder}'")));
        }
    }
    Ok(Some(folder.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Dimensions, ImagePayload, ImageSource};
    use crate::fakes::png_bytes;
    use crate::placement::Attribution;

    fn make_store() -> (tempfile::TempDir, FsImageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path(), "https://static.example.com/media/").unwrap();
        (dir, store)
    }

    fn request(folder: Option<&str>) -> UploadRequest {
        UploadRequest {
            payload: ImagePayload::new(png_bytes(32, 16), None),
            dimensions: Dimensions::measured(32, 16),
            metadata: UploadMetadata {
                alt_text: "Key art".to_string(),
                caption: None,
                attribution: Attribution {
                    source: ImageSource::Catalog,
                    origin_page_url: None,
                    origin_domain: Some("cdn.example.com".to_string()),
                    official: true,
                },
                folder: folder.map(str::to_string),
                filename: "hero-abc.png".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_upload_writes_blob_and_sidecar() {
        let (dir, store) = make_store();
        let req = request(Some("articles/elden-ring"));
        let digest = req.payload.digest.clone();
        let stored = store.upload(req).await.unwrap();

        assert_eq!(stored.id, digest);
        assert_eq!(
            stored.public_url,
            format!("https://static.example.com/media/articles/elden-ring/{digest}.png")
        );
        assert_eq!(stored.width, Some(32));
        let blob = dir
            .path()
            .join("articles/elden-ring")
            .join(format!("{digest}.png"));
        assert_eq!(std::fs::read(blob).unwrap(), png_bytes(32, 16));

        let sidecar = store.sidecar(Some("articles/elden-ring"), &digest).unwrap();
        assert_eq!(sidecar.mime, "image/png");
        assert_eq!(sidecar.metadata.alt_text, "Key art");
        assert!(sidecar.metadata.attribution.official);
    }

    #[tokio::test]
    async fn test_same_content_is_stored_once() {
        let (dir, store) = make_store();
        let a = store.upload(request(None)).await.unwrap();
        let b = store.upload(request(None)).await.unwrap();
        assert_eq!(a, b);
        let blobs = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "png"))
            .count();
        assert_eq!(blobs, 1);
    }

    #[tokio::test]
    async fn test_folder_traversal_is_rejected() {
        let (_dir, store) = make_store();
        let err = store.upload(request(Some("../etc"))).await.unwrap_err();
        assert!(matches!(err, StorageError::Rejected(_)));
    }
}
