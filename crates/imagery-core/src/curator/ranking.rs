//! The ranking-service seam and its untrusted wire types.
//!
//! Nothing in here is validated. [`RawRankingResponse`] only becomes usable
//! after [`crate::curator::validate`] has checked it against the snapshots
//! that produced the request.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::curator::snapshot::SnapshotEntry;
use crate::domain::{RankingError, Usage};

/// Generative ranking service.
#[async_trait]
pub trait RankingService: Send + Sync {
    async fn rank(&self, request: RankingRequest) -> Result<RawRankingResponse, RankingError>;
}

/// One ranking call: the hero slot, some sections, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRequest {
    /// Every planned heading, for context.
    pub article_outline: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hero: Option<HeroRequest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SectionRequest>,
}

impl RankingRequest {
    pub fn slot_count(&self) -> usize {
        usize::from(self.hero.is_some()) + self.sections.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroRequest {
    pub max_candidates: usize,
    pub min_width: u32,
    pub candidates: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRequest {
    pub heading: String,
    pub goal: String,
    pub max_candidates: usize,
    pub min_width: u32,
    pub candidates: Vec<SnapshotEntry>,
}

/// Reply as the service sent it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRankingResponse {
    #[serde(default, alias = "hero_candidates")]
    pub hero: Vec<RawCandidate>,
    #[serde(default, alias = "section_selections")]
    pub sections: Vec<RawSectionSelection>,
    /// Filled in by the client, not by the generated text.
    #[serde(default)]
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSectionSelection {
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub candidates: Vec<RawCandidate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    /// `None` when the service sent something that is not a whole number.
    #[serde(default, alias = "index", deserialize_with = "lenient_index")]
    pub candidate_index: Option<i64>,
    #[serde(default, alias = "alt")]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default, alias = "score", alias = "relevance")]
    pub relevance_score: Option<f64>,
}

impl RawCandidate {
    pub fn new(candidate_index: i64, alt_text: &str, relevance_score: f64) -> Self {
        Self {
            candidate_index: Some(candidate_index),
            alt_text: Some(alt_text.to_string()),
            caption: None,
            relevance_score: Some(relevance_score),
        }
    }

    pub fn with_caption(mut self, caption: &str) -> Self {
        self.caption = Some(caption.to_string());
        self
    }
}

/// Accept `3`, `3.0` and `"3"`; anything else becomes `None`.
fn lenient_index<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Pull the JSON object out of a generated reply.
///
/// Tolerates markdown code fences and prose before or after the object.
pub fn parse_ranking_reply(text: &str) -> Result<RawRankingResponse, RankingError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RankingError::InvalidReply("empty reply".to_string()));
    }

    if let Ok(parsed) = serde_json::from_str::<RawRankingResponse>(trimmed) {
        return Ok(parsed);
    }

    let body = fenced_body(trimmed).unwrap_or(trimmed);
    let start = body.find('{');
    let end = body.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str(&body[start..=end]).map_err(|e| {
                RankingError::InvalidReply(format!("reply is not a ranking object: {e}"))
            })
        }
        _ => Err(RankingError::InvalidReply(
            "reply contains no JSON object".to_string(),
        )),
    }
}

fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // skip the language tag line
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// Prompt for text-based ranking clients.
///
/// Fails only when a candidate cannot be serialized.
pub fn render_ranking_prompt(request: &RankingRequest) -> Result<String, RankingError> {
    let mut prompt = String::new();
    prompt.push_str(
        "You choose images for an article. For each slot below, pick the candidates that best \
         illustrate it, best first. Refer to candidates only by their `index` within that slot's \
         own list. Prefer images whose description matches the slot; `tiebreak_score` only breaks \
         ties between equally relevant images. Write concise alt text that describes what the \
         image shows, and an optional one-line caption.\n\n",
    );

    if !request.article_outline.is_empty() {
        prompt.push_str("Article outline:\n");
        for heading in &request.article_outline {
            prompt.push_str("- ");
            prompt.push_str(heading);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    if let Some(hero) = &request.hero {
        prompt.push_str(&format!(
            "HERO slot (featured image, at least {}px wide). Return up to {} candidates.\n",
            hero.min_width, hero.max_candidates
        ));
        push_candidates(&mut prompt, &hero.candidates)?;
    }

    for section in &request.sections {
        prompt.push_str(&format!(
            "SECTION slot \"{}\" (at least {}px wide). Return up to {} candidates.\n",
            section.heading, section.min_width, section.max_candidates
        ));
        if !section.goal.trim().is_empty() {
            prompt.push_str(&format!("Section goal: {}\n", section.goal.trim()));
        }
        push_candidates(&mut prompt, &section.candidates)?;
    }

    prompt.push_str(
        "Reply with a single JSON object and nothing else:\n\
         {\"hero\": [{\"candidate_index\": 0, \"alt_text\": \"...\", \"caption\": \"...\", \"relevance_score\": 0.9}],\n \
         \"sections\": [{\"heading\": \"<heading exactly as given>\", \"candidates\": [ ...same shape... ]}]}\n",
    );
    if request.hero.is_none() {
        prompt.push_str("Leave \"hero\" empty.\n");
    }
    if request.sections.is_empty() {
        prompt.push_str("Leave \"sections\" empty.\n");
    }
    Ok(prompt)
}

fn push_candidates(prompt: &mut String, candidates: &[SnapshotEntry]) -> Result<(), RankingError> {
    prompt.push_str("Candidates:\n");
    for entry in candidates {
        let line = serde_json::to_string(entry).map_err(|e| {
            RankingError::InvalidReply(format!("candidate {} could not be rendered: {e}", entry.index))
        })?;
        prompt.push_str(&line);
        prompt.push('\n');
    }
    prompt.push('\n');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ImageSource;

    fn entry(index: usize) -> SnapshotEntry {
        SnapshotEntry {
            index,
            url: format!("https://cdn.example.com/{index}.jpg"),
            source: ImageSource::Catalog,
            official: true,
            sub_type: None,
            description: Some("Key art".to_string()),
            origin_query: None,
            origin_domain: None,
            nearby_heading: None,
            width: None,
            height: None,
            tiebreak_score: 100,
        }
    }

    #[test]
    fn test_parse_plain_json() {
        let reply = r#"{"hero":[{"candidate_index":1,"alt_text":"Key art","relevance_score":0.8}]}"#;
        let parsed = parse_ranking_reply(reply).unwrap();
        assert_eq!(parsed.hero.len(), 1);
        assert_eq!(parsed.hero[0].candidate_index, Some(1));
        assert!(parsed.sections.is_empty());
        assert!(parsed.usage.is_zero());
    }

    #[test]
    fn test_parse_fenced_reply_with_prose() {
        let reply = "Here is my selection:\n```json\n{\"hero\": [], \"sections\": [{\"heading\": \"Combat\", \"candidates\": [{\"index\": \"2\", \"alt\": \"A duel\", \"score\": 0.5}]}]}\n```\nHope this helps!";
        let parsed = parse_ranking_reply(reply).unwrap();
        assert_eq!(parsed.sections.len(), 1);
        let candidate = &parsed.sections[0].candidates[0];
        assert_eq!(candidate.candidate_index, Some(2));
        assert_eq!(candidate.alt_text.as_deref(), Some("A duel"));
        assert_eq!(candidate.relevance_score, Some(0.5));
    }

    #[test]
    fn test_lenient_index_values() {
        let parsed = parse_ranking_reply(
            r#"{"hero":[{"candidate_index":3.0},{"candidate_index":"x"},{"candidate_index":-1},{}]}"#,
        )
        .unwrap();
        let indices: Vec<Option<i64>> = parsed.hero.iter().map(|c| c.candidate_index).collect();
        assert_eq!(indices, vec![Some(3), None, Some(-1), None]);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_ranking_reply("I cannot help with that."),
            Err(RankingError::InvalidReply(_))
        ));
        assert!(matches!(
            parse_ranking_reply("   "),
            Err(RankingError::InvalidReply(_))
        ));
    }

    #[test]
    fn test_prompt_mentions_every_slot() {
        let request = RankingRequest {
            article_outline: vec!["Combat".to_string(), "Exploration".to_string()],
            hero: Some(HeroRequest {
                max_candidates: 5,
                min_width: 1280,
                candidates: vec![entry(0), entry(1)],
            }),
            sections: vec![SectionRequest {
                heading: "Combat".to_string(),
                goal: "Explain the parry system".to_string(),
                max_candidates: 3,
                min_width: 640,
                candidates: vec![entry(0)],
            }],
        };
        let prompt = render_ranking_prompt(&request).unwrap();
        assert!(prompt.contains("HERO slot"));
        assert!(prompt.contains("SECTION slot \"Combat\""));
        assert!(prompt.contains("Explain the parry system"));
        assert!(prompt.contains("\"tiebreak_score\":100"));
        assert!(prompt.contains("\"description\":\"Key art\""));
        assert_eq!(request.slot_count(), 2);
    }

    #[test]
    fn test_prompt_candidate_lines_parse_back() {
        let mut quoted = entry(1);
        quoted.description = Some("Boss \"Malenia\" mid-swing\nsecond line".to_string());
        let request = RankingRequest {
            article_outline: Vec::new(),
            hero: Some(HeroRequest {
                max_candidates: 2,
                min_width: 1280,
                candidates: vec![entry(0), quoted.clone()],
            }),
            sections: Vec::new(),
        };
        let prompt = render_ranking_prompt(&request).unwrap();
        let parsed: Vec<SnapshotEntry> = prompt
            .lines()
            .filter(|line| line.starts_with('{') && line.contains("\"tiebreak_score\""))
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed, vec![entry(0), quoted]);
        assert!(prompt.contains("Leave \"sections\" empty."));
    }
}
