//! Pixel dimensions: measured from the payload when possible, inferred
//! otherwise.

use std::io::Cursor;
use std::sync::OnceLock;

use image::ImageReader;
use regex::Regex;
use url::Url;

use crate::domain::{CollectedImage, Dimensions};

/// Read width and height from the image header without decoding pixels.
///
/// `None` for formats the decoder does not handle (SVG, AVIF) and for
/// truncated or corrupt headers.
pub fn measure(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
        .filter(|(w, h)| *w > 0 && *h > 0)
}

/// Dimension hints in a URL: an `NNNxNNN` path segment, else `w=`/`width=`
/// and `h=`/`height=` query parameters.
///
/// A missing height is reported as 0.
pub fn hint_from_url(raw: &str) -> Option<(u32, u32)> {
    let url = Url::parse(raw).ok()?;

    static SIZE_SEGMENT: OnceLock<Regex> = OnceLock::new();
    let size_segment = SIZE_SEGMENT.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[^0-9])([1-9][0-9]{1,4})x([1-9][0-9]{1,4})(?:[^0-9]|$)")
            .expect("static regex")
    });

    // last match wins: CDNs put the rendition size closest to the file name
    if let Some(caps) = size_segment.captures_iter(url.path()).last() {
        let width = caps[1].parse().ok()?;
        let height = caps[2].parse().ok()?;
        return Some((width, height));
    }

    let mut width = None;
    let mut height = None;
    for (name, value) in url.query_pairs() {
        let parsed = value.trim().parse::<u32>().ok().filter(|v| *v > 0);
        match name.to_ascii_lowercase().as_str() {
            "w" | "width" => width = width.or(parsed),
            "h" | "height" => height = height.or(parsed),
            _ => {}
        }
    }
    width.map(|w| (w, height.unwrap_or(0)))
}

/// Measured dimensions, else declared metadata, else URL hints.
pub fn resolve_dimensions(bytes: &[u8], image: &CollectedImage) -> Option<Dimensions> {
    if let Some((w, h)) = measure(bytes) {
        return Some(Dimensions::measured(w, h));
    }
    if let Some(width) = image.width.filter(|w| *w > 0) {
        return Some(Dimensions::inferred(width, image.height.unwrap_or(0)));
    }
    hint_from_url(&image.url).map(|(w, h)| Dimensions::inferred(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::png_bytes;

    #[test]
    fn test_measure_png_header() {
        assert_eq!(measure(&png_bytes(1920, 1080)), Some((1920, 1080)));
        assert_eq!(measure(b"<svg xmlns='http://www.w3.org/2000/svg'/>"), None);
        assert_eq!(measure(&png_bytes(64, 64)[..10]), None);
    }

    #[test]
    fn test_url_hints() {
        assert_eq!(
            hint_from_url("https://cdn.example.com/media/1920x1080/shot.jpg"),
            Some((1920, 1080))
        );
        assert_eq!(
            hint_from_url("https://cdn.example.com/shot_640x360.webp"),
            Some((640, 360))
        );
        assert_eq!(
            hint_from_url("https://cdn.example.com/shot.jpg?width=1600&height=900"),
            Some((1600, 900))
        );
        assert_eq!(hint_from_url("https://cdn.example.com/shot.jpg?w=1280"), Some((1280, 0)));
        assert_eq!(hint_from_url("https://cdn.example.com/shot.jpg"), None);
    }
}
