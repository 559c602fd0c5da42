use chrono::{DateTime, Utc};
use uuid::Uuid;

use leadsignal_common::ExtractedSignal;

use crate::detector::CandidateMatch;

/// Turns candidate matches into stored signals: assigns confidence from the
/// definition's priority class plus keyword corroboration, and extracts an
/// evidence snippet around the earliest match.
pub struct ConfidenceScorer {
    snippet_max_chars: usize,
    confidence_cap: u8,
}

impl ConfidenceScorer {
    pub fn new(snippet_max_chars: usize, confidence_cap: u8) -> Self {
        Self {
            snippet_max_chars,
            confidence_cap,
        }
    }

    /// Base confidence for the priority class, +3 for every matched keyword
    /// beyond the first, capped. A regex-only match gets the base alone.
    fn confidence_for(&self, candidate: &CandidateMatch) -> u8 {
        let base = u32::from(candidate.priority_class.base_confidence());
        let corroboration = 3 * candidate.matched_keywords.saturating_sub(1);
        (base + corroboration).min(u32::from(self.confidence_cap)) as u8
    }

    pub fn score(
        &self,
        candidate: &CandidateMatch,
        cleaned_text: &str,
        target_id: Uuid,
        scrape_id: Uuid,
        now: DateTime<Utc>,
    ) -> ExtractedSignal {
        ExtractedSignal {
            id: Uuid::new_v4(),
            target_id,
            definition_id: candidate.definition_id.clone(),
            label: candidate.label.clone(),
            confidence: self.confidence_for(candidate),
            evidence_snippet: snippet_around(
                cleaned_text,
                candidate.first_match_offset,
                self.snippet_max_chars,
            ),
            score_contribution: candidate.score_contribution,
            action: candidate.action,
            source_scrape_id: scrape_id,
            detected_at: now,
        }
    }
}

/// Window of up to `max_chars` characters around a byte offset. Cuts snap to
/// char boundaries, then to word boundaries when the raw cut would split a
/// word, but never trim past the match itself.
fn snippet_around(text: &str, offset: usize, max_chars: usize) -> String {
    if max_chars == 0 || text.is_empty() {
        return String::new();
    }
    if text.chars().count() <= max_chars {
        return text.trim().to_string();
    }

    let mut anchor = offset.min(text.len());
    while anchor > 0 && !text.is_char_boundary(anchor) {
        anchor -= 1;
    }

    let half = max_chars / 2;
    let back: usize = text[..anchor]
        .chars()
        .rev()
        .take(half)
        .map(char::len_utf8)
        .sum();
    let mut start = anchor - back;
    let forward: usize = text[start..]
        .chars()
        .take(max_chars)
        .map(char::len_utf8)
        .sum();
    let mut end = start + forward;

    // Near the end of the text the forward walk comes up short; spend the
    // remaining budget extending backward.
    let got = text[start..end].chars().count();
    if got < max_chars {
        let extra: usize = text[..start]
            .chars()
            .rev()
            .take(max_chars - got)
            .map(char::len_utf8)
            .sum();
        start -= extra;
    }

    if !is_clean_cut(text, start) {
        if let Some((i, c)) = text[start..anchor]
            .char_indices()
            .find(|(_, c)| c.is_whitespace())
        {
            start += i + c.len_utf8();
        }
    }
    if !is_clean_cut(text, end) {
        if let Some((i, _)) = text[anchor..end]
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
        {
            end = anchor + i;
        }
    }

    text[start..end].trim().to_string()
}

/// A cut is clean when it lands at the text edge or next to whitespace.
fn is_clean_cut(text: &str, pos: usize) -> bool {
    if pos == 0 || pos >= text.len() {
        return true;
    }
    let before_ws = text[..pos]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_whitespace());
    let after_ws = text[pos..].chars().next().is_some_and(|c| c.is_whitespace());
    before_ws || after_ws
}
