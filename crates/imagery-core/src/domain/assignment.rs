//! Slots and the assets resolved for them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::image::{CollectedImage, ImageKey};

/// A usage position for one image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Slot {
    Hero,
    Section { index: usize, heading: String },
}

impl Slot {
    pub fn is_hero(&self) -> bool {
        matches!(self, Self::Hero)
    }

    pub fn heading(&self) -> Option<&str> {
        match self {
            Self::Hero => None,
            Self::Section { heading, .. } => Some(heading),
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hero => f.write_str("hero"),
            Self::Section { index, heading } => write!(f, "section[{index}] '{heading}'"),
        }
    }
}

/// How pixel dimensions were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionProvenance {
    /// Decoded from the downloaded payload.
    Measured,
    /// Taken from declared metadata or URL hints.
    Inferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    pub provenance: DimensionProvenance,
}

impl Dimensions {
    pub fn measured(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            provenance: DimensionProvenance::Measured,
        }
    }

    pub fn inferred(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            provenance: DimensionProvenance::Inferred,
        }
    }

    pub fn is_measured(&self) -> bool {
        self.provenance == DimensionProvenance::Measured
    }
}

/// Downloaded bytes plus what we know about them.
#[derive(Debug, Clone, Serialize)]
pub struct ImagePayload {
    #[serde(skip)]
    pub bytes: Arc<[u8]>,
    pub mime: String,
    /// SHA-256 of `bytes`, lowercase hex.
    pub digest: String,
    pub size: usize,
}

impl ImagePayload {
    /// Wrap downloaded bytes. `declared_mime` is the transport's content type;
    /// a sniffed format wins over it.
    pub fn new(bytes: Vec<u8>, declared_mime: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());
        let mime = sniff_mime(&bytes)
            .map(str::to_string)
            .or_else(|| {
                declared_mime
                    .map(|m| m.split(';').next().unwrap_or(m).trim().to_ascii_lowercase())
                    .filter(|m| !m.is_empty())
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let size = bytes.len();
        Self {
            bytes: Arc::from(bytes),
            mime,
            digest,
            size,
        }
    }

    /// File extension matching `mime`.
    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/bmp" => "bmp",
            "image/svg+xml" => "svg",
            "image/avif" => "avif",
            _ => "bin",
        }
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if let Ok(format) = image::guess_format(bytes) {
        return Some(format.to_mime_type());
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]).to_ascii_lowercase();
    let head = head.trim_start();
    if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        return Some("image/svg+xml");
    }
    None
}

/// The asset committed for one slot after passing every gate.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedAssignment {
    pub slot: Slot,
    pub image: Arc<CollectedImage>,
    /// Position of the winning candidate in the slot's ranked list.
    pub rank: usize,
    pub candidate_index: usize,
    pub alt_text: String,
    pub caption: Option<String>,
    pub relevance_score: f32,
    pub dimensions: Dimensions,
    /// Never re-fetched downstream.
    pub payload: ImagePayload,
}

impl ResolvedAssignment {
    pub fn key(&self) -> &ImageKey {
        &self.image.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_display() {
        assert_eq!(Slot::Hero.to_string(), "hero");
        let slot = Slot::Section {
            index: 2,
            heading: "Combat".to_string(),
        };
        assert_eq!(slot.to_string(), "section[2] 'Combat'");
        assert_eq!(slot.heading(), Some("Combat"));
        assert!(!slot.is_hero());
    }

    #[test]
    fn test_payload_sniffs_svg_and_falls_back_to_declared() {
        let svg = ImagePayload::new(b"<svg xmlns='http://www.w3.org/2000/svg'/>".to_vec(), None);
        assert_eq!(svg.mime, "image/svg+xml");
        assert_eq!(svg.extension(), "svg");

        let unknown = ImagePayload::new(b"\x00\x01\x02".to_vec(), Some("image/avif; q=1"));
        assert_eq!(unknown.mime, "image/avif");
        assert_eq!(unknown.size, 3);
        assert_eq!(unknown.digest.len(), 64);
    }

    #[test]
    fn test_payload_sniffs_png_over_declared() {
        let png = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR".to_vec();
        let payload = ImagePayload::new(png, Some("text/html"));
        assert_eq!(payload.mime, "image/png");
        assert_eq!(payload.extension(), "png");
    }
}
