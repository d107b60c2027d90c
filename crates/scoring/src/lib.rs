//! Enrichment scoring
//!
//! Folds the resolved entities and the speaker map into per-entity salience
//! scores and one overall confidence figure for the asset. Entities that
//! resolved to the same knowledge-base entry are merged, keeping the best
//! match confidence.

pub mod step;

use media_enrich_common::{EntityScore, ResolvedEntity, SpeakerSegment};
use std::collections::BTreeMap;
use tracing::debug;

/// Aggregate output of the scoring pass
#[derive(Debug, Clone, PartialEq)]
pub struct Scoring {
    pub scores: Vec<EntityScore>,
    pub overall_confidence: f64,
}

/// Score entities against the speaker map.
///
/// Salience is match confidence normalized against the best entity, so the
/// top entity always scores 1.0. Overall confidence is the mean entity
/// confidence damped when the asset has no speaker diversity.
pub fn score_entities(entities: &[ResolvedEntity], segments: &[SpeakerSegment]) -> Scoring {
    // Merge by canonical identity, surface form for unresolved mentions
    let mut merged: BTreeMap<String, f64> = BTreeMap::new();
    for entity in entities {
        let name = entity
            .canonical_name
            .clone()
            .unwrap_or_else(|| entity.surface.clone());
        let best = merged.entry(name).or_insert(0.0);
        *best = best.max(entity.confidence);
    }

    if merged.is_empty() {
        return Scoring {
            scores: vec![],
            overall_confidence: 0.0,
        };
    }

    let max_confidence = merged.values().cloned().fold(0.0, f64::max);
    let mut scores: Vec<EntityScore> = merged
        .into_iter()
        .map(|(name, confidence)| EntityScore {
            salience: if max_confidence > 0.0 {
                confidence / max_confidence
            } else {
                0.0
            },
            name,
            confidence,
        })
        .collect();
    // Most salient first, name as the stable tie-break
    scores.sort_by(|a, b| {
        b.salience
            .partial_cmp(&a.salience)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });

    let mean_confidence =
        scores.iter().map(|s| s.confidence).sum::<f64>() / scores.len() as f64;
    // A single-speaker or empty speaker map gives less corroboration
    let speaker_factor = match distinct_speakers(segments) {
        0 => 0.5,
        1 => 0.8,
        _ => 1.0,
    };
    let overall_confidence = mean_confidence * speaker_factor;

    debug!(
        "Scored {} entities, overall confidence {:.3}",
        scores.len(),
        overall_confidence
    );
    Scoring {
        scores,
        overall_confidence,
    }
}

fn distinct_speakers(segments: &[SpeakerSegment]) -> usize {
    let mut speakers: Vec<&str> = segments.iter().map(|s| s.speaker.as_str()).collect();
    speakers.sort_unstable();
    speakers.dedup();
    speakers.len()
}
