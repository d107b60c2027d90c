//! Entity disambiguation against an alias knowledge base
//!
//! Mentions are matched case-insensitively against the alias lists of a
//! JSON knowledge base. When several entries claim the same alias, an exact
//! case-sensitive canonical-name match wins, then the entry with the fewest
//! aliases (the most specific one), then the lexicographically smallest
//! kb id. The losing candidates stay visible in the explain payload.

pub mod step;

use media_enrich_common::{EntityMention, ResolvedEntity};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

/// Confidence for a match with a single candidate
const UNIQUE_MATCH_CONFIDENCE: f64 = 0.9;

/// Confidence for a match picked out of several candidates
const AMBIGUOUS_MATCH_CONFIDENCE: f64 = 0.6;

/// Configuration for disambiguation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisambiguationConfig {
    /// JSON knowledge base with canonical entries and their aliases
    pub knowledge_base_path: Option<String>,
}

/// One knowledge-base entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KbEntry {
    /// Stable identifier (e.g. "kb:alice-liddell")
    pub kb_id: String,

    /// Canonical display name
    pub canonical_name: String,

    /// Surface forms this entry answers to
    pub aliases: Vec<String>,
}

/// Alias knowledge base loaded from JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub entries: Vec<KbEntry>,
}

impl KnowledgeBase {
    /// Load the knowledge base from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Entries whose alias list contains `surface`, case-insensitively
    fn candidates(&self, surface: &str) -> Vec<&KbEntry> {
        self.entries
            .iter()
            .filter(|e| {
                e.aliases
                    .iter()
                    .any(|a| a.eq_ignore_ascii_case(surface))
            })
            .collect()
    }
}

/// Resolution of one mention plus the audit trail behind it
#[derive(Debug, Clone)]
pub struct Resolution {
    pub entity: ResolvedEntity,

    /// Explain fragment: candidates considered and the rule that decided
    pub explain: Value,
}

/// Resolve every mention against the knowledge base
pub fn resolve_mentions(mentions: &[EntityMention], kb: &KnowledgeBase) -> Vec<Resolution> {
    mentions.iter().map(|m| resolve_one(m, kb)).collect()
}

fn resolve_one(mention: &EntityMention, kb: &KnowledgeBase) -> Resolution {
    let mut candidates = kb.candidates(&mention.surface);
    if candidates.is_empty() {
        debug!("No candidate for '{}'", mention.surface);
        return Resolution {
            entity: ResolvedEntity {
                surface: mention.surface.clone(),
                kb_id: None,
                canonical_name: None,
                confidence: 0.0,
            },
            explain: json!({
                "surface": mention.surface,
                "candidates": [],
                "decision": "unresolved, no alias match",
            }),
        };
    }

    // Exact canonical match > fewest aliases > smallest kb id
    candidates.sort_by(|a, b| {
        let exact_a = a.canonical_name == mention.surface;
        let exact_b = b.canonical_name == mention.surface;
        exact_b
            .cmp(&exact_a)
            .then(a.aliases.len().cmp(&b.aliases.len()))
            .then(a.kb_id.cmp(&b.kb_id))
    });

    let winner = candidates[0];
    let unique = candidates.len() == 1;
    let confidence = if unique {
        UNIQUE_MATCH_CONFIDENCE
    } else {
        AMBIGUOUS_MATCH_CONFIDENCE
    };

    Resolution {
        entity: ResolvedEntity {
            surface: mention.surface.clone(),
            kb_id: Some(winner.kb_id.clone()),
            canonical_name: Some(winner.canonical_name.clone()),
            confidence,
        },
        explain: json!({
            "surface": mention.surface,
            "candidates": candidates
                .iter()
                .map(|c| json!({"kb_id": c.kb_id, "canonical_name": c.canonical_name}))
                .collect::<Vec<_>>(),
            "decision": if unique {
                "unique alias match"
            } else {
                "ambiguous, ranked by exact canonical match, specificity, kb id"
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kb() -> KnowledgeBase {
        KnowledgeBase {
            entries: vec![
                KbEntry {
                    kb_id: "kb:alice-liddell".to_string(),
                    canonical_name: "Alice Liddell".to_string(),
                    aliases: vec!["Alice".to_string(), "Alice Liddell".to_string()],
                },
                KbEntry {
                    kb_id: "kb:alice-springs".to_string(),
                    canonical_name: "Alice Springs".to_string(),
                    aliases: vec![
                        "Alice".to_string(),
                        "Alice Springs".to_string(),
                        "The Alice".to_string(),
                    ],
                },
                KbEntry {
                    kb_id: "kb:bob".to_string(),
                    canonical_name: "Bob Fosse".to_string(),
                    aliases: vec!["Bob".to_string()],
                },
            ],
        }
    }

    fn mention(surface: &str) -> EntityMention {
        EntityMention {
            surface: surface.to_string(),
            occurrences: 1,
            speaker: None,
        }
    }

    #[test]
    fn test_unique_match_has_high_confidence() {
        let resolutions = resolve_mentions(&[mention("Bob")], &kb());
        let entity = &resolutions[0].entity;
        assert_eq!(entity.kb_id.as_deref(), Some("kb:bob"));
        assert_eq!(entity.confidence, UNIQUE_MATCH_CONFIDENCE);
    }

    #[test]
    fn test_ambiguous_match_prefers_fewer_aliases() {
        let resolutions = resolve_mentions(&[mention("Alice")], &kb());
        let entity = &resolutions[0].entity;
        // Liddell has 2 aliases, Springs has 3
        assert_eq!(entity.kb_id.as_deref(), Some("kb:alice-liddell"));
        assert_eq!(entity.confidence, AMBIGUOUS_MATCH_CONFIDENCE);

        let candidates = resolutions[0].explain["candidates"].as_array().unwrap();
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_exact_canonical_match_wins() {
        let resolutions = resolve_mentions(&[mention("Alice Springs")], &kb());
        assert_eq!(
            resolutions[0].entity.kb_id.as_deref(),
            Some("kb:alice-springs")
        );
    }

    #[test]
    fn test_unmatched_mention_is_unresolved() {
        let resolutions = resolve_mentions(&[mention("Zanzibar")], &kb());
        let entity = &resolutions[0].entity;
        assert!(!entity.is_resolved());
        assert_eq!(entity.confidence, 0.0);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let resolutions = resolve_mentions(&[mention("bob")], &kb());
        assert!(resolutions[0].entity.is_resolved());
    }
}
