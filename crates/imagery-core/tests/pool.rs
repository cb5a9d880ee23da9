//! Pool aggregation across catalog, web-search and extracted producers.

use imagery_core::pool::FilterReason;
use imagery_core::{
    normalize_url, CurationConfig, ImagePool, ImageSource, QueryPolicy, RawImage, SearchEngine,
};

const SHOT: &str = "https://cdn.catalog.test/shots/Bridge.png";

fn key(raw: &str) -> imagery_core::ImageKey {
    normalize_url(raw, QueryPolicy::Strip).unwrap().key
}

#[test]
fn same_image_from_three_producers_is_kept_once() {
    let pool = ImagePool::new(&CurationConfig::default());

    let catalog = pool.ingest_catalog_images(
        &[RawImage::new(SHOT).with_description("Frozen bridge")],
        &[],
        None,
    );
    assert_eq!(catalog.report.accepted, 1);

    let web = catalog.pool.ingest_web_images(
        &[
            RawImage::new("http://CDN.catalog.test/shots/Bridge.png?utm_source=feed#top"),
            RawImage::new("https://images.gamesite.test/bridge-wide.jpg")
                .with_page_url("https://gamesite.test/guide"),
        ],
        "frozen bridge",
        SearchEngine::A,
    );
    assert_eq!(web.report.duplicates, 1);
    assert_eq!(web.report.accepted, 1);

    let extracted = web.pool.ingest_extracted_images(
        &[RawImage::new("https://cdn.catalog.test:443/shots/Bridge.png")
            .with_description("The party crosses the frozen bridge")],
        "https://gamesite.test/guide",
        Some("gamesite.test"),
    );
    assert_eq!(extracted.report.duplicates, 1);
    assert!(extracted.pool.ptr_eq(&web.pool));

    let pool = extracted.pool;
    assert_eq!(pool.len(), 2);
    let entry = pool.get(&key(SHOT)).unwrap();
    assert_eq!(entry.source, ImageSource::Catalog);
    assert!(entry.official);

    let summary = pool.summarize();
    assert_eq!(summary.catalog, 1);
    assert_eq!(summary.web, 1);
    assert_eq!(summary.extracted, 0);
    assert_eq!(summary.official, 1);
}

#[test]
fn rejected_inputs_are_counted_by_reason() {
    let pool = ImagePool::default();
    let outcome = pool.ingest_web_images(
        &[
            RawImage::new("not a url"),
            RawImage::new("https://ad.doubleclick.net/banner.jpg"),
            RawImage::new("https://site.test/assets/site-logo.png"),
            RawImage::new("https://site.test/img/thumbs/ring.jpg"),
            RawImage::new("https://site.test/img/ring-150x150.jpg"),
            RawImage::new("https://site.test/img/ring.jpg"),
        ],
        "ring",
        SearchEngine::B,
    );

    let report = outcome.report;
    assert_eq!(report.offered, 6);
    assert_eq!(report.malformed, 1);
    assert_eq!(report.filtered.get(&FilterReason::BlockedDomain), Some(&1));
    assert_eq!(report.filtered.get(&FilterReason::Logo), Some(&1));
    assert_eq!(report.filtered.get(&FilterReason::Thumbnail), Some(&1));
    assert_eq!(
        report.filtered.get(&FilterReason::SmallInlineDimensions),
        Some(&1)
    );
    assert_eq!(report.accepted, 1);
    assert_eq!(outcome.pool.len(), 1);
    assert_eq!(
        outcome.pool.images()[0].source,
        ImageSource::SearchB
    );
}

#[test]
fn extracted_images_need_a_real_description() {
    let pool = ImagePool::default();
    let outcome = pool.ingest_extracted_images(
        &[
            RawImage::new("https://blog.test/img/a.jpg").with_description("Share on Twitter"),
            RawImage::new("https://blog.test/img/b.jpg").with_description("12345"),
            RawImage::new("https://blog.test/img/c.jpg")
                .with_description("The Tree Sentinel guarding the road")
                .with_nearby_heading("Early bosses"),
        ],
        "https://blog.test/posts/early-game",
        None,
    );

    assert_eq!(
        outcome.report.filtered.get(&FilterReason::PoorDescription),
        Some(&2)
    );
    assert_eq!(outcome.pool.len(), 1);
    let image = &outcome.pool.images()[0];
    assert_eq!(image.origin_domain.as_deref(), Some("blog.test"));
    assert_eq!(image.nearby_heading.as_deref(), Some("Early bosses"));
}

#[test]
fn sort_policy_keeps_distinct_query_variants_apart() {
    let config = CurationConfig {
        query_policy: QueryPolicy::Sort,
        ..CurationConfig::default()
    };
    let outcome = ImagePool::new(&config).ingest_web_images(
        &[
            RawImage::new("https://img.test/render?id=1&utm_campaign=x"),
            RawImage::new("https://img.test/render?id=2"),
            RawImage::new("https://img.test/render?utm_medium=y&id=1"),
        ],
        "renders",
        SearchEngine::A,
    );

    assert_eq!(outcome.pool.len(), 2);
    assert_eq!(outcome.report.duplicates, 1);
}
