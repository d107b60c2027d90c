//! Entity mention extraction from transcript text
//!
//! Scans a transcript for runs of capitalized tokens, the classic
//! named-entity surface-form heuristic. Each distinct surface form becomes
//! one mention with an occurrence count and, when a speaker map is
//! available, the speaker whose segment covers the first occurrence.

pub mod step;

use media_enrich_common::{EntityMention, SpeakerSegment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Configuration for mention extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Plain-text transcript of the asset. No transcript means no mentions.
    pub transcript_path: Option<String>,

    /// Surface forms shorter than this many characters are dropped
    pub min_mention_len: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            transcript_path: None,
            min_mention_len: 3,
        }
    }
}

/// One capitalized-token run with its character offset
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawMention {
    surface: String,
    offset: usize,
}

/// Extract distinct mentions from transcript text, attributing each to the
/// speaker segment covering its first occurrence.
pub fn extract_mentions(
    transcript: &str,
    segments: &[SpeakerSegment],
    config: &ExtractionConfig,
) -> Vec<EntityMention> {
    let raw = scan_capitalized_runs(transcript, config.min_mention_len);

    // Distinct surfaces in first-occurrence order, with counts
    let mut order: Vec<String> = Vec::new();
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    let mut first_offset: BTreeMap<String, usize> = BTreeMap::new();
    for mention in &raw {
        *counts.entry(mention.surface.clone()).or_insert_with(|| {
            order.push(mention.surface.clone());
            first_offset.insert(mention.surface.clone(), mention.offset);
            0
        }) += 1;
    }

    let total_len = transcript.len().max(1);
    let mentions: Vec<EntityMention> = order
        .into_iter()
        .map(|surface| {
            let speaker = first_offset
                .get(&surface)
                .and_then(|&offset| speaker_at_fraction(segments, offset as f64 / total_len as f64));
            EntityMention {
                occurrences: counts[&surface],
                speaker,
                surface,
            }
        })
        .collect();

    debug!(
        "Extracted {} distinct mentions from {} raw hits",
        mentions.len(),
        raw.len()
    );
    mentions
}

/// Runs of consecutive capitalized tokens ("New York City" is one mention)
fn scan_capitalized_runs(text: &str, min_len: usize) -> Vec<RawMention> {
    let mut mentions = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    let mut run_offset = 0usize;
    let mut offset = 0usize;

    for token in text.split_whitespace() {
        // Offsets advance by scanning for the token from the last position
        let token_offset = text[offset..]
            .find(token)
            .map(|p| offset + p)
            .unwrap_or(offset);
        offset = token_offset + token.len();

        let word = token.trim_matches(|c: char| !c.is_alphanumeric());
        let is_capitalized = word
            .chars()
            .next()
            .is_some_and(|c| c.is_uppercase())
            && word.chars().skip(1).any(|c| c.is_lowercase());

        if is_capitalized {
            if run.is_empty() {
                run_offset = token_offset;
            }
            run.push(word);
            // Runs never cross a sentence boundary
            if token.chars().last().is_some_and(|c| !c.is_alphanumeric()) {
                push_run(&mut mentions, &run, run_offset, min_len);
                run.clear();
            }
        } else if !run.is_empty() {
            push_run(&mut mentions, &run, run_offset, min_len);
            run.clear();
        }
    }
    if !run.is_empty() {
        push_run(&mut mentions, &run, run_offset, min_len);
    }
    mentions
}

fn push_run(mentions: &mut Vec<RawMention>, run: &[&str], offset: usize, min_len: usize) {
    let surface = run.join(" ");
    if surface.len() >= min_len {
        mentions.push(RawMention { surface, offset });
    }
}

/// Speaker whose segment covers the given fraction of total asset duration
fn speaker_at_fraction(segments: &[SpeakerSegment], fraction: f64) -> Option<String> {
    let total = segments.last().map(|s| s.end_secs)?;
    let t = fraction.clamp(0.0, 1.0) * total;
    segments
        .iter()
        .find(|s| t >= s.start_secs && t < s.end_secs)
        .or_else(|| segments.last())
        .map(|s| s.speaker.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs() -> Vec<SpeakerSegment> {
        vec![
            SpeakerSegment {
                start_secs: 0.0,
                end_secs: 5.0,
                speaker: "SPEAKER_00".to_string(),
            },
            SpeakerSegment {
                start_secs: 5.0,
                end_secs: 10.0,
                speaker: "SPEAKER_01".to_string(),
            },
        ]
    }

    #[test]
    fn test_multi_word_runs_are_one_mention() {
        let mentions = extract_mentions(
            "We visited New York City together.",
            &segs(),
            &ExtractionConfig::default(),
        );
        assert!(mentions.iter().any(|m| m.surface == "New York City"));
    }

    #[test]
    fn test_occurrences_are_counted_and_deduplicated() {
        let mentions = extract_mentions(
            "Alice met Bob, and later Alice called Bob again.",
            &segs(),
            &ExtractionConfig::default(),
        );
        let alice = mentions.iter().find(|m| m.surface == "Alice").unwrap();
        assert_eq!(alice.occurrences, 2);
        assert_eq!(mentions.iter().filter(|m| m.surface == "Alice").count(), 1);
    }

    #[test]
    fn test_min_len_filters_short_surfaces() {
        let config = ExtractionConfig {
            min_mention_len: 4,
            ..Default::default()
        };
        let mentions = extract_mentions("Al spoke to Roberta.", &segs(), &config);
        assert!(mentions.iter().all(|m| m.surface != "Al"));
        assert!(mentions.iter().any(|m| m.surface == "Roberta"));
    }

    #[test]
    fn test_early_mentions_get_first_speaker() {
        let mentions = extract_mentions(
            "Alice opened the long discussion and kept talking for a while",
            &segs(),
            &ExtractionConfig::default(),
        );
        let alice = mentions.iter().find(|m| m.surface == "Alice").unwrap();
        assert_eq!(alice.speaker.as_deref(), Some("SPEAKER_00"));
    }

    #[test]
    fn test_all_caps_tokens_are_not_mentions() {
        // Acronym-only tokens lack a lowercase tail and are skipped
        let mentions =
            extract_mentions("The NASA probe launched.", &segs(), &ExtractionConfig::default());
        assert!(mentions.iter().all(|m| m.surface != "NASA"));
    }
}
