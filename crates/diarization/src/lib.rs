//! Speaker segmentation over raw media bytes
//!
//! A lightweight energy heuristic stands in for a full acoustic model: the
//! asset is sliced into fixed windows, each window's mean byte deviation is
//! quantized into a speaker band, and adjacent windows in the same band merge
//! into one segment. Deterministic for a given asset and config, which is
//! what the cache layer requires.

pub mod step;

use media_enrich_common::SpeakerSegment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Bytes per analysis window
const WINDOW_BYTES: usize = 4096;

/// Nominal media time represented by one window
const WINDOW_SECS: f64 = 1.0;

/// Configuration for speaker segmentation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiarizationConfig {
    /// Segments shorter than this are folded into their neighbor
    pub min_segment_secs: f64,

    /// Upper bound on distinct speaker labels
    pub max_speakers: u32,
}

impl Default for DiarizationConfig {
    fn default() -> Self {
        Self {
            min_segment_secs: 1.0,
            max_speakers: 4,
        }
    }
}

/// Segment the asset at `path`
pub fn diarize_file(
    path: impl AsRef<Path>,
    config: &DiarizationConfig,
) -> std::io::Result<Vec<SpeakerSegment>> {
    let bytes = std::fs::read(path)?;
    Ok(diarize_bytes(&bytes, config))
}

/// Segment a byte buffer into speaker-labelled windows
pub fn diarize_bytes(bytes: &[u8], config: &DiarizationConfig) -> Vec<SpeakerSegment> {
    if bytes.is_empty() || config.max_speakers == 0 {
        return Vec::new();
    }

    // One speaker band per window, by quantized energy
    let bands: Vec<u32> = bytes
        .chunks(WINDOW_BYTES)
        .map(|window| band_of(window_energy(window), config.max_speakers))
        .collect();

    // Merge adjacent windows with the same band
    let mut segments: Vec<SpeakerSegment> = Vec::new();
    for (idx, band) in bands.iter().enumerate() {
        let start = idx as f64 * WINDOW_SECS;
        let end = start + WINDOW_SECS;
        match segments.last_mut() {
            Some(last) if speaker_label(*band) == last.speaker => last.end_secs = end,
            _ => segments.push(SpeakerSegment {
                start_secs: start,
                end_secs: end,
                speaker: speaker_label(*band),
            }),
        }
    }

    // Fold sub-minimum segments into their predecessor
    let mut merged: Vec<SpeakerSegment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(last) if segment.duration_secs() < config.min_segment_secs => {
                last.end_secs = segment.end_secs;
            }
            _ => merged.push(segment),
        }
    }

    debug!(
        "Diarized {} bytes into {} segments",
        bytes.len(),
        merged.len()
    );
    merged
}

/// Number of distinct speaker labels in a segment list
pub fn speaker_count(segments: &[SpeakerSegment]) -> u32 {
    let mut speakers: Vec<&str> = segments.iter().map(|s| s.speaker.as_str()).collect();
    speakers.sort_unstable();
    speakers.dedup();
    speakers.len() as u32
}

/// Mean absolute deviation of the window from its mean byte value
fn window_energy(window: &[u8]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let mean = window.iter().map(|&b| b as f64).sum::<f64>() / window.len() as f64;
    window.iter().map(|&b| (b as f64 - mean).abs()).sum::<f64>() / window.len() as f64
}

/// Quantize an energy value (0..=127.5 for byte data) into a speaker band
fn band_of(energy: f64, max_speakers: u32) -> u32 {
    let normalized = (energy / 128.0).clamp(0.0, 1.0);
    let band = (normalized * max_speakers as f64) as u32;
    band.min(max_speakers - 1)
}

fn speaker_label(band: u32) -> String {
    format!("SPEAKER_{band:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_segments() {
        let segments = diarize_bytes(&[], &DiarizationConfig::default());
        assert!(segments.is_empty());
        assert_eq!(speaker_count(&segments), 0);
    }

    #[test]
    fn test_uniform_input_is_one_segment() {
        let bytes = vec![42u8; WINDOW_BYTES * 5];
        let segments = diarize_bytes(&bytes, &DiarizationConfig::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_secs, 0.0);
        assert_eq!(segments[0].end_secs, 5.0 * WINDOW_SECS);
    }

    #[test]
    fn test_alternating_energy_respects_min_segment() {
        // Two windows of flat bytes, two of maximally spread bytes
        let mut bytes = vec![0u8; WINDOW_BYTES * 2];
        for i in 0..WINDOW_BYTES * 2 {
            bytes.push(if i % 2 == 0 { 0 } else { 255 });
        }
        let config = DiarizationConfig {
            min_segment_secs: 0.5,
            max_speakers: 4,
        };
        let segments = diarize_bytes(&bytes, &config);
        assert_eq!(segments.len(), 2);
        assert_ne!(segments[0].speaker, segments[1].speaker);
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let bytes: Vec<u8> = (0..WINDOW_BYTES * 3).map(|i| (i % 251) as u8).collect();
        let config = DiarizationConfig::default();
        assert_eq!(diarize_bytes(&bytes, &config), diarize_bytes(&bytes, &config));
    }

    #[test]
    fn test_max_speakers_bounds_labels() {
        let bytes: Vec<u8> = (0..WINDOW_BYTES * 8).map(|i| (i * 37 % 256) as u8).collect();
        let config = DiarizationConfig {
            min_segment_secs: 0.0,
            max_speakers: 2,
        };
        let segments = diarize_bytes(&bytes, &config);
        assert!(speaker_count(&segments) <= 2);
    }
}
