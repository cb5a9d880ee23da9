//! Section plan consumed from the upstream writer.

use serde::{Deserialize, Serialize};

/// One planned article section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSection {
    pub heading: String,
    /// Short statement of what the section covers.
    #[serde(default)]
    pub goal: String,
}

impl PlannedSection {
    pub fn new(heading: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            goal: goal.into(),
        }
    }

    pub fn normalized_heading(&self) -> String {
        normalize_heading(&self.heading)
    }
}

/// Ordered section list for one article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPlan {
    pub sections: Vec<PlannedSection>,
}

impl SectionPlan {
    pub fn new(sections: Vec<PlannedSection>) -> Self {
        Self { sections }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Position of the `occurrence`-th section (0-based) whose heading
    /// normalize-matches `heading`. Plans may repeat a heading; each copy is
    /// addressed by its ordinal.
    pub fn position_of(&self, heading: &str, occurrence: usize) -> Option<usize> {
        let wanted = normalize_heading(heading);
        if wanted.is_empty() {
            return None;
        }
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.normalized_heading() == wanted)
            .nth(occurrence)
            .map(|(i, _)| i)
    }

    /// How many earlier sections share the heading of section `index`.
    pub fn occurrence_of(&self, index: usize) -> usize {
        let Some(section) = self.sections.get(index) else {
            return 0;
        };
        let wanted = section.normalized_heading();
        self.sections[..index]
            .iter()
            .filter(|s| s.normalized_heading() == wanted)
            .count()
    }
}

/// Canonical form used to match headings across the plan, the ranking reply
/// and the article body.
///
/// Case-folds, drops markdown markers and leading ordinal numbering, and
/// collapses every run of non-alphanumeric characters into one space.
pub fn normalize_heading(heading: &str) -> String {
    let trimmed = heading.trim().trim_start_matches('#').trim();
    let without_ordinal = strip_ordinal(trimmed);

    let mut out = String::with_capacity(without_ordinal.len());
    let mut pending_space = false;
    for ch in without_ordinal.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Strip "1.", "2)", "3:" and "1.2." style prefixes.
fn strip_ordinal(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut saw_digit = false;
    while i < bytes.len() && (bytes[i].is_ascii_digit() || (saw_digit && bytes[i] == b'.')) {
        saw_digit |= bytes[i].is_ascii_digit();
        i += 1;
    }
    if !saw_digit {
        return text;
    }
    let rest = &text[i..];
    let rest = rest.strip_prefix([')', ':']).unwrap_or(rest);
    // "2024 Roadmap" is a heading, not an ordinal
    if i == text.len() || !(text[..i].ends_with('.') || rest.len() < text[i..].len()) {
        return text;
    }
    rest.trim_start()
}
