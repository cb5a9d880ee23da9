//! Optional quality gates run after the dimension gate.

use std::sync::Arc;

use async_trait::async_trait;
use image::imageops::FilterType;
use serde::Serialize;
use tracing::debug;

use crate::domain::{Dimensions, ImagePayload};

/// Why a quality gate refused an image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityRejection {
    Watermark { detail: String },
    Clarity { variance: f64, threshold: f64 },
    Other { detail: String },
}

impl std::fmt::Display for QualityRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Watermark { detail } => write!(f, "watermark: {detail}"),
            Self::Clarity {
                variance,
                threshold,
            } => write!(f, "blurry: sharpness {variance:.1} below {threshold:.1}"),
            Self::Other { detail } => f.write_str(detail),
        }
    }
}

/// A heuristic gate over a downloaded image.
#[async_trait]
pub trait QualityValidator: Send + Sync {
    async fn check(
        &self,
        payload: &ImagePayload,
        dimensions: &Dimensions,
    ) -> Result<(), QualityRejection>;
}

/// Validators per slot type. Empty by default.
#[derive(Clone, Default)]
pub struct QualityGates {
    pub hero: Option<Arc<dyn QualityValidator>>,
    pub section: Option<Arc<dyn QualityValidator>>,
}

impl QualityGates {
    pub fn for_slot(&self, hero: bool) -> Option<&Arc<dyn QualityValidator>> {
        if hero {
            self.hero.as_ref()
        } else {
            self.section.as_ref()
        }
    }
}

impl std::fmt::Debug for QualityGates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityGates")
            .field("hero", &self.hero.is_some())
            .field("section", &self.section.is_some())
            .finish()
    }
}

/// Rejects blurry images by the variance of the Laplacian over a
/// down-scaled grayscale copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClarityValidator {
    /// Minimum Laplacian variance to pass.
    pub threshold: f64,
    /// Longest side of the analysis copy.
    pub sample_edge: u32,
}

impl Default for ClarityValidator {
    fn default() -> Self {
        Self {
            threshold: 60.0,
            sample_edge: 512,
        }
    }
}

impl ClarityValidator {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// Laplacian variance of the payload, `None` if it cannot be decoded.
    pub fn sharpness(&self, bytes: &[u8]) -> Option<f64> {
        let decoded = image::load_from_memory(bytes).ok()?;
        // only ever shrink; upscaling would smooth edges away
        let gray = if decoded.width() > self.sample_edge || decoded.height() > self.sample_edge {
            decoded
                .resize(self.sample_edge, self.sample_edge, FilterType::Triangle)
                .to_luma8()
        } else {
            decoded.to_luma8()
        };
        let (w, h) = gray.dimensions();
        if w < 3 || h < 3 {
            return None;
        }

        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut n = 0.0f64;
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let center = f64::from(gray.get_pixel(x, y)[0]);
                let lap = f64::from(gray.get_pixel(x - 1, y)[0])
                    + f64::from(gray.get_pixel(x + 1, y)[0])
                    + f64::from(gray.get_pixel(x, y - 1)[0])
                    + f64::from(gray.get_pixel(x, y + 1)[0])
                    - 4.0 * center;
                sum += lap;
                sum_sq += lap * lap;
                n += 1.0;
            }
        }
        let mean = sum / n;
        Some(sum_sq / n - mean * mean)
    }
}

#[async_trait]
impl QualityValidator for ClarityValidator {
    async fn check(
        &self,
        payload: &ImagePayload,
        _dimensions: &Dimensions,
    ) -> Result<(), QualityRejection> {
        let bytes = Arc::clone(&payload.bytes);
        let validator = *self;
        let variance = tokio::task::spawn_blocking(move || validator.sharpness(&bytes))
            .await
            .ok()
            .flatten();

        match variance {
            // undecodable formats are not judged here
            None => {
                debug!(mime = %payload.mime, "clarity check skipped");
                Ok(())
            }
            Some(variance) if variance < self.threshold => Err(QualityRejection::Clarity {
                variance,
                threshold: self.threshold,
            }),
            Some(_) => Ok(()),
        }
    }
}
