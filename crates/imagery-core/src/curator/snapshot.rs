//! Pool views shown to the ranking service.
//!
//! A [`Snapshot`] freezes the exact array the service sees; every index in
//! its reply is checked against that array and nothing else.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{normalize_heading, CollectedImage, ImageSource, PlannedSection, SubType};
use crate::pool::ImagePool;

/// Relevance added when an image's nearby heading matches the section.
pub const HEADING_MATCH_BOOST: usize = 10;

/// Tokens shorter than this never count toward lexical overlap.
const MIN_TOKEN_CHARS: usize = 3;

const STOPWORDS: &[&str] = &[
    "and", "are", "but", "for", "from", "has", "how", "into", "its", "not", "our", "that", "the",
    "their", "this", "was", "what", "when", "where", "which", "who", "why", "with", "you", "your",
];

/// Ordered images exactly as presented to one ranking slot.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    images: Vec<Arc<CollectedImage>>,
}

impl Snapshot {
    pub fn new(images: Vec<Arc<CollectedImage>>) -> Self {
        Self { images }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<CollectedImage>> {
        self.images.get(index)
    }

    pub fn images(&self) -> &[Arc<CollectedImage>] {
        &self.images
    }

    /// Serializable descriptions, index-aligned with the snapshot.
    pub fn entries(&self) -> Vec<SnapshotEntry> {
        self.images
            .iter()
            .enumerate()
            .map(|(index, image)| SnapshotEntry::describe(index, image))
            .collect()
    }
}

/// What the ranking service learns about one image.
///
/// The tiebreak score travels with the descriptive fields, never alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub index: usize,
    pub url: String,
    pub source: ImageSource,
    pub official: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<SubType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearby_heading: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub tiebreak_score: i32,
}

impl SnapshotEntry {
    fn describe(index: usize, image: &CollectedImage) -> Self {
        Self {
            index,
            url: image.url.clone(),
            source: image.source,
            official: image.official,
            sub_type: image.sub_type,
            description: image.description.clone(),
            origin_query: image.origin_query.clone(),
            origin_domain: image.origin_domain.clone(),
            nearby_heading: image.nearby_heading.clone(),
            width: image.width,
            height: image.height,
            tiebreak_score: image.tiebreak_score,
        }
    }
}

/// The whole pool, best tiebreak score first, capped.
pub fn hero_snapshot(pool: &ImagePool, cap: usize) -> Snapshot {
    Snapshot::new(pool.by_score().into_iter().take(cap).collect())
}

/// Images relevant to `section`, capped.
///
/// Images are ranked by lexical overlap with the section heading and goal,
/// with [`HEADING_MATCH_BOOST`] for a matching nearby heading. Remaining room
/// is filled with the best-scored leftovers.
pub fn section_snapshot(pool: &ImagePool, section: &PlannedSection, cap: usize) -> Snapshot {
    if cap == 0 {
        return Snapshot::default();
    }

    let section_tokens = tokens(&format!("{} {}", section.heading, section.goal));
    let section_heading = section.normalized_heading();

    let ordered = pool.by_score();
    let mut matched: Vec<(usize, &Arc<CollectedImage>)> = Vec::new();
    let mut leftovers: Vec<&Arc<CollectedImage>> = Vec::new();

    for image in &ordered {
        let overlap = tokens(&image.context_text())
            .intersection(&section_tokens)
            .count();
        let boost = match image.nearby_heading.as_deref() {
            Some(heading)
                if !section_heading.is_empty() && normalize_heading(heading) == section_heading =>
            {
                HEADING_MATCH_BOOST
            }
            _ => 0,
        };
        let relevance = overlap + boost;
        if relevance > 0 {
            matched.push((relevance, image));
        } else {
            leftovers.push(image);
        }
    }

    // stable: equal relevance keeps tiebreak order
    matched.sort_by(|a, b| b.0.cmp(&a.0));

    let images = matched
        .into_iter()
        .map(|(_, image)| image)
        .chain(leftovers)
        .take(cap)
        .map(Arc::clone)
        .collect();
    Snapshot::new(images)
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{RawImage, SearchEngine};

    fn pool() -> ImagePool {
        ImagePool::default()
            .ingest_catalog_images(
                &[RawImage::new("https://cdn.example.com/shot.jpg").with_description("Title screen")],
                &[RawImage::new("https://cdn.example.com/art.jpg").with_description("Key art")],
                None,
            )
            .pool
            .ingest_web_images(
                &[RawImage::new("https://a.com/boss.jpg").with_description("Malenia boss fight")],
                "elden ring boss fight",
                SearchEngine::A,
            )
            .pool
            .ingest_extracted_images(
                &[RawImage::new("https://blog.example.org/map.jpg")
                    .with_description("The open world map of the Lands Between")
                    .with_nearby_heading("## 2. Exploration")],
                "https://blog.example.org/review",
                None,
            )
            .pool
    }

    #[test]
    fn test_hero_snapshot_is_score_sorted_and_capped() {
        let snapshot = hero_snapshot(&pool(), 3);
        let scores: Vec<i32> = snapshot.images().iter().map(|i| i.tiebreak_score).collect();
        assert_eq!(scores, vec![100, 80, 60]);
    }

    #[test]
    fn test_section_snapshot_prefers_matching_images() {
        let p = pool();
        let combat = PlannedSection::new("Boss Fights", "How the hardest boss encounters play");
        let snapshot = section_snapshot(&p, &combat, 2);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.images()[0].url, "https://a.com/boss.jpg");
        // filled with the best leftover
        assert_eq!(snapshot.images()[1].url, "https://cdn.example.com/art.jpg");

        let exploration = PlannedSection::new("Exploration", "");
        let snapshot = section_snapshot(&p, &exploration, 1);
        assert_eq!(snapshot.images()[0].url, "https://blog.example.org/map.jpg");
    }

    #[test]
    fn test_entries_carry_context_with_score() {
        let snapshot = hero_snapshot(&pool(), 10);
        let entries = snapshot.entries();
        assert_eq!(entries.len(), snapshot.len());
        let boss = entries
            .iter()
            .find(|e| e.url == "https://a.com/boss.jpg")
            .unwrap();
        assert_eq!(boss.description.as_deref(), Some("Malenia boss fight"));
        assert_eq!(boss.origin_query.as_deref(), Some("elden ring boss fight"));
        assert_eq!(boss.tiebreak_score, 40);
        assert_eq!(entries[0].index, 0);
    }

    #[test]
    fn test_zero_cap_is_empty() {
        let section = PlannedSection::new("Anything", "");
        assert!(section_snapshot(&pool(), &section, 0).is_empty());
        assert!(hero_snapshot(&pool(), 0).is_empty());
    }
}
