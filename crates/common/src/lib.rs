/// Common domain types shared by the enrichment steps
use serde::{Deserialize, Serialize};

/// A contiguous span of speech attributed to one speaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerSegment {
    /// Segment start in seconds from the beginning of the asset
    pub start_secs: f64,

    /// Segment end in seconds
    pub end_secs: f64,

    /// Stable speaker label within one asset (e.g. "`SPEAKER_00`")
    pub speaker: String,
}

impl SpeakerSegment {
    /// Duration of the segment in seconds
    pub fn duration_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }
}

/// A surface-form entity mention found in transcript text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    /// The mention exactly as it appeared
    pub surface: String,

    /// Number of occurrences across the transcript
    pub occurrences: u32,

    /// Speaker label of the segment the first occurrence fell into, if known
    pub speaker: Option<String>,
}

/// A mention resolved against the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    /// The original surface form
    pub surface: String,

    /// Canonical knowledge-base identifier, if a match was found
    pub kb_id: Option<String>,

    /// Canonical display name
    pub canonical_name: Option<String>,

    /// Match confidence in [0.0, 1.0]
    pub confidence: f64,
}

impl ResolvedEntity {
    /// Whether the mention was matched to a knowledge-base entry
    pub fn is_resolved(&self) -> bool {
        self.kb_id.is_some()
    }
}

/// Per-entity salience score produced by the scoring step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityScore {
    /// Canonical name or surface form being scored
    pub name: String,

    /// Salience in [0.0, 1.0]: how central the entity is to the asset
    pub salience: f64,

    /// Confidence inherited from disambiguation
    pub confidence: f64,
}
