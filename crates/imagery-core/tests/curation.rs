//! Curation against a scripted ranking service: reply validation and
//! failure handling.

use imagery_core::curator::{
    parse_ranking_reply, ProtocolIssue, RawCandidate, RawRankingResponse, RawSectionSelection,
};
use imagery_core::fakes::ScriptedRankingService;
use imagery_core::{
    curate, CancelSignal, CurationConfig, CurationMode, CurationStatus, ImagePool, PlannedSection,
    RankingError, RawImage, SearchEngine, SectionPlan, Usage,
};

fn pool() -> ImagePool {
    ImagePool::default()
        .ingest_catalog_images(
            &[
                RawImage::new("https://cdn.catalog.test/shots/combat.png")
                    .with_description("Parrying a knight"),
                RawImage::new("https://cdn.catalog.test/shots/map.png")
                    .with_description("The open world map"),
            ],
            &[RawImage::new("https://cdn.catalog.test/art/key.png").with_description("Key art")],
            None,
        )
        .pool
        .ingest_web_images(
            &[RawImage::new("https://img.site.test/boss.jpg").with_description("Boss fight")],
            "elden ring boss",
            SearchEngine::A,
        )
        .pool
}

fn plan() -> SectionPlan {
    SectionPlan::new(vec![
        PlannedSection::new("Combat", "Parries, stances and bosses"),
        PlannedSection::new("Exploration", "The open world and its map"),
    ])
}

#[tokio::test]
async fn empty_pool_skips_the_service() {
    let service = ScriptedRankingService::new();
    let curation = curate(
        &service,
        &ImagePool::default(),
        &plan(),
        &CurationConfig::default(),
        &CancelSignal::new(),
    )
    .await;

    assert_eq!(curation.status, CurationStatus::EmptyPool);
    assert!(curation.is_empty());
    assert_eq!(service.call_count(), 0);
    assert!(curation.usage.is_zero());
}

#[tokio::test]
async fn invalid_indices_are_dropped_and_reported() {
    let service = ScriptedRankingService::new();
    service.push_response(RawRankingResponse {
        hero: vec![
            RawCandidate::new(0, "Key art of the Tarnished", 0.7),
            RawCandidate::new(99, "Out of range", 0.99),
            RawCandidate::new(-1, "Negative", 0.98),
            RawCandidate {
                candidate_index: None,
                ..RawCandidate::new(0, "Missing", 0.5)
            },
            RawCandidate::new(0, "Duplicate", 0.95),
            RawCandidate::new(1, "Second best", 0.8),
        ],
        sections: vec![
            RawSectionSelection {
                heading: "## combat".to_string(),
                candidates: vec![RawCandidate::new(0, "Parry", 0.9)],
            },
            RawSectionSelection {
                heading: "Multiplayer".to_string(),
                candidates: vec![RawCandidate::new(0, "Co-op", 0.9)],
            },
        ],
        usage: Usage::default(),
    });

    let curation = curate(
        &service,
        &pool(),
        &plan(),
        &CurationConfig::default(),
        &CancelSignal::new(),
    )
    .await;

    assert_eq!(curation.status, CurationStatus::Completed);
    assert_eq!(service.call_count(), 1);
    let hero: Vec<usize> = curation
        .hero_candidates
        .iter()
        .map(|c| c.candidate_index)
        .collect();
    assert_eq!(hero, vec![1, 0]);

    assert_eq!(curation.sections.len(), 1);
    assert_eq!(curation.sections[0].heading, "Combat");
    assert_eq!(curation.sections[0].section_index, 0);

    let kinds = |pred: fn(&ProtocolIssue) -> bool| curation.issues.iter().filter(|&i| pred(i)).count();
    assert_eq!(kinds(|i| matches!(i, ProtocolIssue::IndexOutOfRange { .. })), 2);
    assert_eq!(kinds(|i| matches!(i, ProtocolIssue::MissingIndex { .. })), 1);
    assert_eq!(kinds(|i| matches!(i, ProtocolIssue::DuplicateIndex { .. })), 1);
    assert_eq!(kinds(|i| matches!(i, ProtocolIssue::UnknownHeading { .. })), 1);
}

#[tokio::test]
async fn hero_request_carries_caps_and_outline() {
    let service = ScriptedRankingService::new();
    service.push_response(RawRankingResponse::default());
    let config = CurationConfig {
        hero_snapshot_cap: 2,
        section_snapshot_cap: 1,
        ..CurationConfig::default()
    };

    curate(&service, &pool(), &plan(), &config, &CancelSignal::new()).await;

    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.article_outline, vec!["Combat", "Exploration"]);
    let hero = request.hero.as_ref().unwrap();
    assert_eq!(hero.candidates.len(), 2);
    assert_eq!(hero.min_width, config.hero.min_width);
    assert!(hero.candidates[0].official);
    assert_eq!(request.sections.len(), 2);
    assert!(request.sections.iter().all(|s| s.candidates.len() == 1));
}

#[tokio::test]
async fn combined_call_failure_is_reported_not_raised() {
    let service = ScriptedRankingService::new();
    service.push_failure(RankingError::Unavailable("503".to_string()));

    let curation = curate(
        &service,
        &pool(),
        &plan(),
        &CurationConfig::default(),
        &CancelSignal::new(),
    )
    .await;

    assert!(matches!(curation.status, CurationStatus::Failed(ref r) if r.contains("503")));
    assert!(curation.is_empty());
}

#[tokio::test]
async fn per_section_mode_makes_one_call_per_section() {
    let service = ScriptedRankingService::with_responder(|request| {
        let sections = request
            .sections
            .iter()
            .map(|s| RawSectionSelection {
                heading: s.heading.clone(),
                candidates: vec![RawCandidate::new(0, &s.heading, 0.8)],
            })
            .collect();
        Ok(RawRankingResponse {
            hero: request
                .hero
                .as_ref()
                .map(|_| vec![RawCandidate::new(0, "Hero", 0.9)])
                .unwrap_or_default(),
            sections,
            usage: Usage {
                calls: 0,
                input_tokens: 100,
                output_tokens: 20,
                cost_usd: 0.001,
            },
        })
    });
    let config = CurationConfig {
        mode: CurationMode::PerSection,
        ..CurationConfig::default()
    };

    let curation = curate(&service, &pool(), &plan(), &config, &CancelSignal::new()).await;

    assert_eq!(service.call_count(), 3);
    assert_eq!(curation.usage.calls, 3);
    assert_eq!(curation.usage.input_tokens, 300);
    assert_eq!(curation.hero_candidates.len(), 1);
    let headings: Vec<&str> = curation.sections.iter().map(|s| s.heading.as_str()).collect();
    assert_eq!(headings, vec!["Combat", "Exploration"]);
}

#[test]
fn fenced_reply_parses_into_raw_response() {
    let text = "Here you go:\n```json\n{\"hero_candidates\": [{\"index\": \"2\", \"alt\": \"Key art\", \"score\": 0.9}], \"section_selections\": []}\n```";
    let response = parse_ranking_reply(text).unwrap();
    assert_eq!(response.hero.len(), 1);
    assert_eq!(response.hero[0].candidate_index, Some(2));
    assert_eq!(response.hero[0].alt_text.as_deref(), Some("Key art"));
}
