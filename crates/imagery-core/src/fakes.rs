//! In-memory fakes for the collaborator traits (testing only).
//!
//! `ScriptedRankingService`, `MemoryImageFetcher` and `MemoryStorageBackend`
//! satisfy the trait contracts without any network or disk.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::cancel::CancelSignal;
use crate::curator::{RankingRequest, RankingService, RawRankingResponse};
use crate::domain::{FetchError, RankingError, StorageError};
use crate::placement::{StorageBackend, StoredImage, UploadRequest};
use crate::resolver::{FetchedImage, ImageFetcher};

/// Flat gray PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_png(RgbImage::from_pixel(width, height, Rgb([128, 128, 128])))
}

/// Black/white checkerboard PNG with `cell`-pixel squares.
pub fn checkerboard_png(width: u32, height: u32, cell: u32) -> Vec<u8> {
    let cell = cell.max(1);
    encode_png(RgbImage::from_fn(width, height, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    }))
}

fn encode_png(image: RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("png encoding into memory cannot fail");
    buf
}

// ---------------------------------------------------------------------------
// ScriptedRankingService
// ---------------------------------------------------------------------------

type Responder =
    Box<dyn Fn(&RankingRequest) -> Result<RawRankingResponse, RankingError> + Send + Sync>;

/// Ranking service that replays queued replies, then falls back to a
/// responder closure. Every request is recorded.
#[derive(Default)]
pub struct ScriptedRankingService {
    queue: Mutex<VecDeque<Result<RawRankingResponse, RankingError>>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<RankingRequest>>,
}

impl ScriptedRankingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request (after the queue drains) with `responder`.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&RankingRequest) -> Result<RawRankingResponse, RankingError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Default::default()
        }
    }

    pub fn push_response(&self, response: RawRankingResponse) -> &Self {
        self.queue.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn push_failure(&self, error: RankingError) -> &Self {
        self.queue.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<RankingRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl RankingService for ScriptedRankingService {
    async fn rank(&self, request: RankingRequest) -> Result<RawRankingResponse, RankingError> {
        let queued = self.queue.lock().unwrap().pop_front();
        let reply = match queued {
            Some(reply) => reply,
            None => match &self.responder {
                Some(responder) => responder(&request),
                None => Err(RankingError::Unavailable("script exhausted".to_string())),
            },
        };
        self.requests.lock().unwrap().push(request);
        reply
    }
}

// ---------------------------------------------------------------------------
// MemoryImageFetcher
// ---------------------------------------------------------------------------

/// Fetcher backed by a `HashMap<url, reply>`. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct MemoryImageFetcher {
    replies: Mutex<HashMap<String, Result<FetchedImage, FetchError>>>,
    fetched: Mutex<Vec<String>>,
}

impl MemoryImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, url: &str, bytes: Vec<u8>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(FetchedImage::new(bytes, None)));
        self
    }

    pub fn with_png(self, url: &str, width: u32, height: u32) -> Self {
        self.with_image(url, png_bytes(width, height))
    }

    pub fn with_failure(self, url: &str, error: FetchError) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error));
        self
    }

    /// URLs in the order they were requested.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for MemoryImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.replies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
            })
    }
}

// ---------------------------------------------------------------------------
// MemoryStorageBackend
// ---------------------------------------------------------------------------

/// Storage backend that keeps every request. Uploads whose filename starts
/// with a registered prefix fail. An attached [`CancelSignal`] is raised by
/// the first upload, so the current batch finishes and later ones never start.
#[derive(Debug, Default)]
pub struct MemoryStorageBackend {
    uploads: Mutex<Vec<UploadRequest>>,
    failing_prefixes: Mutex<Vec<String>>,
    cancel_on_upload: Option<CancelSignal>,
}

impl MemoryStorageBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_filenames_starting_with(self, prefix: &str) -> Self {
        self.failing_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
        self
    }

    pub fn cancel_on_first_upload(mut self, cancel: CancelSignal) -> Self {
        self.cancel_on_upload = Some(cancel);
        self
    }

    pub fn uploads(&self) -> Vec<UploadRequest> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorageBackend {
    async fn upload(&self, request: UploadRequest) -> Result<StoredImage, StorageError> {
        if let Some(cancel) = &self.cancel_on_upload {
            cancel.cancel();
        }
        let filename = request.metadata.filename.clone();
        let failing = self
            .failing_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|p| filename.starts_with(p.as_str()));
        if failing {
            return Err(StorageError::Rejected(format!("scripted failure for {filename}")));
        }

        let stored = StoredImage {
            id: request.payload.digest.clone(),
            public_url: format!("https://media.test/{filename}"),
            width: Some(request.dimensions.width),
            height: Some(request.dimensions.height).filter(|h| *h > 0),
        };
        self.uploads.lock().unwrap().push(request);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_helpers_decode() {
        let img = image::load_from_memory(&png_bytes(20, 10)).unwrap();
        assert_eq!((img.width(), img.height()), (20, 10));
        let img = image::load_from_memory(&checkerboard_png(8, 8, 2)).unwrap();
        assert_eq!(img.width(), 8);
    }

    #[tokio::test]
    async fn test_fetcher_records_order_and_404s() {
        let fetcher = MemoryImageFetcher::new().with_png("https://a/1.png", 4, 4);
        assert!(fetcher.fetch("https://a/1.png").await.is_ok());
        assert!(matches!(
            fetcher.fetch("https://a/2.png").await,
            Err(FetchError::Status { status: 404, .. })
        ));
        assert_eq!(fetcher.fetched(), vec!["https://a/1.png", "https://a/2.png"]);
    }
}
