use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{ImageSource, SubType};
use crate::pool::ImagePool;

/// Counts over one pool snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub total: usize,
    pub by_source: BTreeMap<ImageSource, usize>,
    pub by_sub_type: BTreeMap<SubType, usize>,
    pub official: usize,
    pub catalog: usize,
    pub web: usize,
    pub extracted: usize,
    pub with_declared_dimensions: usize,
}

impl PoolSummary {
    pub fn of(pool: &ImagePool) -> Self {
        let mut summary = PoolSummary {
            total: pool.len(),
            ..Default::default()
        };
        for image in pool.images() {
            *summary.by_source.entry(image.source).or_insert(0) += 1;
            if let Some(sub_type) = image.sub_type {
                *summary.by_sub_type.entry(sub_type).or_insert(0) += 1;
            }
            if image.official {
                summary.official += 1;
            }
            match image.source {
                ImageSource::Catalog => summary.catalog += 1,
                ImageSource::SearchA | ImageSource::SearchB => summary.web += 1,
                ImageSource::Extracted => summary.extracted += 1,
            }
            if image.declared_dimensions().is_some() {
                summary.with_declared_dimensions += 1;
            }
        }
        summary
    }
}
