//! Content and configuration fingerprinting
//!
//! Fingerprints are lowercase blake3 hex digests. Content fingerprints hash a
//! bounded sample of the asset (size + head + tail windows) so fingerprinting
//! stays cheap for multi-gigabyte media. Config fingerprints are step-scoped:
//! only the keys a step declares relevant enter the hash, so an unrelated
//! configuration change never invalidates an unrelated step's cache.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Bytes hashed from each end of the asset
const SAMPLE_WINDOW: u64 = 64 * 1024;

/// A stable 256-bit identity, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The hex digest as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_hasher(hasher: blake3::Hasher) -> Self {
        Fingerprint(hasher.finalize().to_hex().to_string())
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint an asset from its total size plus head and tail byte windows.
///
/// Assets smaller than two windows are hashed in full.
pub fn fingerprint_content(path: impl AsRef<Path>) -> std::io::Result<Fingerprint> {
    let mut file = File::open(path.as_ref())?;
    let len = file.metadata()?.len();

    let mut hasher = blake3::Hasher::new();
    hasher.update(&len.to_le_bytes());

    if len <= SAMPLE_WINDOW * 2 {
        let mut buf = Vec::with_capacity(len as usize);
        file.read_to_end(&mut buf)?;
        hasher.update(&buf);
    } else {
        let mut head = vec![0u8; SAMPLE_WINDOW as usize];
        file.read_exact(&mut head)?;
        hasher.update(&head);

        let mut tail = vec![0u8; SAMPLE_WINDOW as usize];
        file.seek(SeekFrom::End(-(SAMPLE_WINDOW as i64)))?;
        file.read_exact(&mut tail)?;
        hasher.update(&tail);
    }

    Ok(Fingerprint::from_hasher(hasher))
}

/// Fingerprint the configuration slice declared relevant by a step.
///
/// The step name is mixed in so two steps with identical config slices still
/// get distinct fingerprints.
pub fn fingerprint_config(step: &str, slice: &Value) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(step.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_json(slice).as_bytes());
    Fingerprint::from_hasher(hasher)
}

/// Fingerprint an arbitrary JSON value (used for result payloads)
pub fn fingerprint_value(value: &Value) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(canonical_json(value).as_bytes());
    Fingerprint::from_hasher(hasher)
}

/// Serialize JSON with object keys sorted, so hashing is order-stable
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => serde_json::to_string(s).unwrap_or_default(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let mut tree = BTreeMap::new();
            for (k, v) in map {
                tree.insert(k.clone(), canonical_json(v));
            }
            let items: Vec<String> = tree
                .into_iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(&k).unwrap_or_default(), v))
                .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_canonical_json_sorts_keys() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let b = json!({"a": {"c": 3, "d": 2}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn test_config_fingerprint_is_step_scoped() {
        let slice = json!({"threshold": 0.5});
        let a = fingerprint_config("diarization", &slice);
        let b = fingerprint_config("scoring", &slice);
        assert_ne!(a, b, "same slice must hash differently per step");
        assert_eq!(a, fingerprint_config("diarization", &slice));
    }

    #[test]
    fn test_content_fingerprint_small_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello enrichment").unwrap();
        f.flush().unwrap();

        let a = fingerprint_content(f.path()).unwrap();
        let b = fingerprint_content(f.path()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_content_fingerprint_detects_edits_in_large_file() {
        let make = |tail_byte: u8| {
            let mut f = tempfile::NamedTempFile::new().unwrap();
            let body = vec![0x42u8; (SAMPLE_WINDOW * 3) as usize];
            f.write_all(&body).unwrap();
            f.write_all(&[tail_byte]).unwrap();
            f.flush().unwrap();
            f
        };

        let original = make(1);
        let edited = make(2);
        assert_ne!(
            fingerprint_content(original.path()).unwrap(),
            fingerprint_content(edited.path()).unwrap()
        );
    }
}
