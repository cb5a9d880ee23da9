//! Splicing section image references into a markdown body.
//!
//! Each reference goes directly under the heading that normalize-matches its
//! section. When the plan repeats a heading, the n-th planned copy maps to the
//! n-th such heading in the body. Headings inside fenced code blocks are
//! ignored. The hero is never spliced; it is returned as a
//! [`FeaturedImage`].

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{normalize_heading, PlacementError, SectionPlan, Slot};
use crate::placement::upload::UploadedImage;

/// The hero image, returned out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeaturedImage {
    pub url: String,
    pub alt_text: String,
    pub caption: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl From<&UploadedImage> for FeaturedImage {
    fn from(image: &UploadedImage) -> Self {
        Self {
            url: image.stored.public_url.clone(),
            alt_text: image.alt_text.clone(),
            caption: image.caption.clone(),
            width: image.stored.width.or(Some(image.dimensions.width)),
            height: image
                .stored
                .height
                .or(Some(image.dimensions.height).filter(|h| *h > 0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnplacedImage {
    pub slot: Slot,
    pub url: String,
    pub reason: String,
}

/// Result of one insertion pass. `body` is the original text when `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insertion {
    pub body: String,
    /// Slots whose reference is now under their heading (inserted or already there).
    pub placed: Vec<Slot>,
    pub unplaced: Vec<UnplacedImage>,
    pub error: Option<PlacementError>,
}

/// Insert section images from `images` into `body`. Hero entries are ignored.
pub fn insert_images(body: &str, plan: &SectionPlan, images: &[UploadedImage]) -> Insertion {
    let mut sections: Vec<&UploadedImage> = images.iter().filter(|i| !i.slot.is_hero()).collect();
    sections.sort_by_key(|i| match &i.slot {
        Slot::Section { index, .. } => *index,
        Slot::Hero => 0,
    });

    let mut rendered = Vec::with_capacity(sections.len());
    for image in &sections {
        match render_reference(image) {
            Ok(reference) => rendered.push(reference),
            Err(err) => {
                warn!(slot = %image.slot, error = %err, "aborting insertion");
                return Insertion {
                    body: body.to_string(),
                    placed: Vec::new(),
                    unplaced: Vec::new(),
                    error: Some(err),
                };
            }
        }
    }

    let mut lines: Vec<String> = body.split('\n').map(str::to_string).collect();
    let headings = heading_lines(&lines);

    let mut placed = Vec::new();
    let mut unplaced = Vec::new();
    // heading line -> references to add under it, in section order
    let mut pending: BTreeMap<usize, Vec<String>> = BTreeMap::new();

    for (image, reference) in sections.iter().zip(rendered) {
        let (index, heading) = match &image.slot {
            Slot::Section { index, heading } => (*index, heading.as_str()),
            Slot::Hero => continue,
        };
        let wanted = normalize_heading(heading);
        let occurrence = plan.occurrence_of(index);
        let Some(&(line, _)) = headings
            .iter()
            .filter(|(_, h)| !wanted.is_empty() && *h == wanted)
            .nth(occurrence)
        else {
            debug!(slot = %image.slot, "heading not found in body");
            unplaced.push(UnplacedImage {
                slot: image.slot.clone(),
                url: image.stored.public_url.clone(),
                reason: format!("heading '{heading}' not found"),
            });
            continue;
        };

        if already_present(&lines, line, &link_target(&image.stored.public_url)) {
            debug!(slot = %image.slot, "reference already present");
        } else {
            pending.entry(line).or_default().push(reference);
        }
        placed.push(image.slot.clone());
    }

    // bottom-up so earlier line numbers stay valid
    for (line, references) in pending.into_iter().rev() {
        let mut block = Vec::with_capacity(references.len() * 2 + 1);
        for reference in references {
            block.push(String::new());
            block.push(reference);
        }
        let next_is_blank = lines
            .get(line + 1)
            .map_or(true, |l| l.trim().is_empty());
        if !next_is_blank {
            block.push(String::new());
        }
        lines.splice(line + 1..line + 1, block);
    }

    Insertion {
        body: lines.join("\n"),
        placed,
        unplaced,
        error: None,
    }
}

/// `(line, normalized heading)` for every ATX heading outside code fences.
fn heading_lines(lines: &[String]) -> Vec<(usize, String)> {
    let mut fence: Option<&str> = None;
    let mut headings = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        let marker = if trimmed.starts_with("```") {
            Some("```")
        } else if trimmed.starts_with("~~~") {
            Some("~~~")
        } else {
            None
        };
        match (fence, marker) {
            (None, Some(m)) => {
                fence = Some(m);
                continue;
            }
            (Some(open), Some(m)) if open == m => {
                fence = None;
                continue;
            }
            (Some(_), _) => continue,
            (None, None) => {}
        }

        let hashes = trimmed.chars().take_while(|c| *c == '#').count();
        if (1..=6).contains(&hashes) && trimmed[hashes..].starts_with([' ', '\t']) {
            let text = trimmed[hashes..].trim().trim_end_matches('#').trim();
            headings.push((i, normalize_heading(text)));
        }
    }
    headings
}

/// True when an image line right under `heading_line` already points at `url`.
fn already_present(lines: &[String], heading_line: usize, url: &str) -> bool {
    let bare = format!("]({url})");
    let titled = format!("]({url} ");
    lines
        .iter()
        .skip(heading_line + 1)
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .take_while(|l| l.starts_with("!["))
        .any(|l| l.contains(&bare) || l.contains(&titled))
}

/// `![alt](url "caption")` with markdown-sensitive characters escaped.
pub fn render_reference(image: &UploadedImage) -> Result<String, PlacementError> {
    let heading = image.slot.heading().unwrap_or("hero").to_string();
    let fail = |reason: &str| PlacementError::UnrenderableReference {
        heading: heading.clone(),
        reason: reason.to_string(),
    };

    let url = image.stored.public_url.trim();
    if url.is_empty() {
        return Err(fail("empty url"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(fail("url contains whitespace"));
    }
    let url = link_target(url);

    let alt = escape(image.alt_text.trim(), &['\\', '[', ']']);
    if alt.contains(['\n', '\r']) {
        return Err(fail("alt text contains a line break"));
    }

    let mut reference = format!("![{alt}]({url}");
    if let Some(caption) = image.caption.as_deref() {
        let caption = caption.split_whitespace().collect::<Vec<_>>().join(" ");
        if !caption.is_empty() {
            reference.push_str(" \"");
            reference.push_str(&escape(&caption, &['\\', '"']));
            reference.push('"');
        }
    }
    reference.push(')');
    Ok(reference)
}

/// URL as written inside `( )`.
fn link_target(url: &str) -> String {
    url.trim().replace('(', "%28").replace(')', "%29")
}

fn escape(text: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if special.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
