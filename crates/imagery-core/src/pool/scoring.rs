//! Tiebreak scores.
//!
//! A score only orders images the curator would otherwise consider equally
//! relevant. It never decides relevance on its own.

use crate::domain::SubType;
use crate::pool::filters::DomainTier;

pub const ARTWORK_SCORE: i32 = 100;
pub const SCREENSHOT_SCORE: i32 = 80;
pub const COVER_SCORE: i32 = 60;

pub const WEB_HIGH_QUALITY_SCORE: i32 = 50;
pub const WEB_DEFAULT_SCORE: i32 = 40;

pub const EXTRACTED_HIGH_SCORE: i32 = 65;
pub const EXTRACTED_DEFAULT_SCORE: i32 = 55;
pub const EXTRACTED_LOW_SCORE: i32 = 35;
pub const NEARBY_HEADING_BONUS: i32 = 5;
pub const SHORT_DESCRIPTION_PENALTY: i32 = 10;
/// Descriptions with fewer characters than this count as very short.
pub const SHORT_DESCRIPTION_CHARS: usize = 15;
pub const MIN_USEFUL_SCORE: i32 = 20;

pub fn catalog_score(sub_type: SubType) -> i32 {
    match sub_type {
        SubType::Artwork => ARTWORK_SCORE,
        SubType::Screenshot => SCREENSHOT_SCORE,
        SubType::Cover => COVER_SCORE,
    }
}

pub fn web_score(tier: DomainTier) -> i32 {
    match tier {
        DomainTier::High => WEB_HIGH_QUALITY_SCORE,
        DomainTier::Default | DomainTier::Low => WEB_DEFAULT_SCORE,
    }
}

pub fn extracted_score(tier: DomainTier, has_nearby_heading: bool, description: &str) -> i32 {
    let mut score = match tier {
        DomainTier::High => EXTRACTED_HIGH_SCORE,
        DomainTier::Default => EXTRACTED_DEFAULT_SCORE,
        DomainTier::Low => EXTRACTED_LOW_SCORE,
    };
    if has_nearby_heading {
        score += NEARBY_HEADING_BONUS;
    }
    if description.trim().chars().count() < SHORT_DESCRIPTION_CHARS {
        score -= SHORT_DESCRIPTION_PENALTY;
    }
    score.max(MIN_USEFUL_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_scores_rank_artwork_first() {
        assert!(catalog_score(SubType::Artwork) > catalog_score(SubType::Screenshot));
        assert!(catalog_score(SubType::Screenshot) > catalog_score(SubType::Cover));
    }

    #[test]
    fn test_web_scores() {
        assert_eq!(web_score(DomainTier::High), 50);
        assert_eq!(web_score(DomainTier::Default), 40);
        assert_eq!(web_score(DomainTier::Low), 40);
    }

    #[test]
    fn test_extracted_score_adjustments() {
        let long = "The party crosses the frozen bridge";
        assert_eq!(extracted_score(DomainTier::High, false, long), 65);
        assert_eq!(extracted_score(DomainTier::Default, true, long), 60);
        assert_eq!(extracted_score(DomainTier::Default, false, "Bridge"), 45);
        assert_eq!(extracted_score(DomainTier::Low, true, long), 40);
    }

    #[test]
    fn test_lowest_extracted_score_stays_above_floor() {
        let lowest = extracted_score(DomainTier::Low, false, "x");
        assert_eq!(lowest, 25);
        assert!(lowest >= MIN_USEFUL_SCORE);
    }
}
