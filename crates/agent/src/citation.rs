//! Citation markers and claim splitting
//!
//! Drafts cite evidence inline as `[[chunk:<id>]]`. A claim is one sentence
//! of the draft together with the chunk ids it cites.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use unicode_segmentation::UnicodeSegmentation;

use docchat_core::ChunkId;

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[chunk:([^\]\s]+)\]\]").expect("valid citation regex"));

/// Marker with the whitespace in front of it, for removal
static MARKER_WITH_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]?\[\[chunk:([^\]\s]+)\]\]").expect("valid citation regex"));

static LEADING_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[\[chunk:([^\]\s]+)\]\]").expect("valid citation regex"));

const HEDGES: &[&str] = &[
    "cannot answer",
    "can't answer",
    "unable to answer",
    "cannot be answered",
    "not provided in the",
    "not covered by the",
    "do not contain",
    "does not contain",
    "don't contain",
    "doesn't contain",
    "do not mention",
    "does not mention",
    "no information",
    "not enough information",
    "insufficient information",
    "i don't know",
    "i do not know",
];

/// Marker text for a chunk id
pub fn marker(id: &str) -> String {
    format!("[[chunk:{}]]", id)
}

/// Cited ids in order of appearance, duplicates kept
pub fn extract_citations(text: &str) -> Vec<ChunkId> {
    MARKER
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Distinct cited ids
pub fn citation_set(text: &str) -> BTreeSet<ChunkId> {
    extract_citations(text).into_iter().collect()
}

/// Text with all markers removed
pub fn strip_citations(text: &str) -> String {
    MARKER_WITH_SPACE.replace_all(text, "").trim().to_string()
}

/// Remove markers whose id fails `keep`; other text is untouched
pub fn retain_citations(text: &str, keep: impl Fn(&str) -> bool) -> String {
    MARKER_WITH_SPACE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            if keep(&caps[1]) {
                caps[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// True for sentences that decline to answer instead of asserting a fact
pub fn is_hedge(text: &str) -> bool {
    let lower = text.to_lowercase();
    HEDGES.iter().any(|h| lower.contains(h))
}

/// One sentence of a draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// Sentence text without markers
    pub text: String,
    /// Ids cited by the sentence, in order, without duplicates
    pub citations: Vec<ChunkId>,
}

impl Claim {
    pub fn is_cited(&self) -> bool {
        !self.citations.is_empty()
    }

    pub fn is_hedge(&self) -> bool {
        is_hedge(&self.text)
    }

    fn cite(&mut self, id: ChunkId) {
        if !self.citations.contains(&id) {
            self.citations.push(id);
        }
    }
}

/// Split a draft into sentence claims.
///
/// Markers are masked before sentence segmentation so their lower-case
/// text cannot glue two sentences together. Markers written after a
/// sentence's full stop open the next segment; they are attached back to
/// the sentence they follow.
pub fn split_claims(text: &str) -> Vec<Claim> {
    let masked = MARKER.replace_all(text, |caps: &regex::Captures<'_>| "_".repeat(caps[0].len()));
    let mut claims: Vec<Claim> = Vec::new();
    let mut offset = 0;

    for segment in masked.split_sentence_bounds() {
        let mut rest = &text[offset..offset + segment.len()];
        offset += segment.len();

        while let Some(caps) = LEADING_MARKER.captures(rest) {
            let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
                break;
            };
            if let Some(previous) = claims.last_mut() {
                previous.cite(id.as_str().to_string());
            }
            rest = &rest[whole.end()..];
        }

        let body = strip_citations(rest);
        if !body.chars().any(char::is_alphanumeric) {
            continue;
        }

        let mut claim = Claim {
            text: body,
            citations: Vec::new(),
        };
        for id in extract_citations(rest) {
            claim.cite(id);
        }
        claims.push(claim);
    }

    claims
}
