use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    Vector,
    Digest,
}

impl ExtractionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionMode::Vector => "vector",
            ExtractionMode::Digest => "digest",
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Biometric representation of one face, tagged with the strategy that produced it.
///
/// On disk this is `{"mode": "vector", "value": [...]}` or
/// `{"mode": "digest", "value": "<hex>"}` so a reload never needs to re-run
/// extraction to know which variant it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum BiometricEncoding {
    Vector(Vec<f64>),
    Digest(String),
}

impl BiometricEncoding {
    pub fn mode(&self) -> ExtractionMode {
        match self {
            BiometricEncoding::Vector(_) => ExtractionMode::Vector,
            BiometricEncoding::Digest(_) => ExtractionMode::Digest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub user_id: String,
    pub encoding: BiometricEncoding,
    pub registered_at: String,
}

impl FaceRecord {
    pub fn new(user_id: impl Into<String>, encoding: BiometricEncoding) -> Self {
        Self {
            user_id: user_id.into(),
            encoding,
            registered_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn vector_encoding_serializes_with_mode_tag() {
        let encoding = BiometricEncoding::Vector(vec![0.25, -0.5]);
        let value: Value = serde_json::to_value(&encoding).unwrap();
        assert_eq!(value, json!({"mode": "vector", "value": [0.25, -0.5]}));
    }

    #[test]
    fn digest_encoding_deserializes_from_tagged_string() {
        let raw = r#"{"mode":"digest","value":"d41d8cd98f00b204e9800998ecf8427e"}"#;
        let encoding: BiometricEncoding = serde_json::from_str(raw).unwrap();
        assert_eq!(encoding.mode(), ExtractionMode::Digest);
        assert_eq!(
            encoding,
            BiometricEncoding::Digest("d41d8cd98f00b204e9800998ecf8427e".into())
        );
    }

    #[test]
    fn face_record_timestamp_is_rfc3339_utc() {
        let record = FaceRecord::new("alice", BiometricEncoding::Digest("00".into()));
        assert!(record.registered_at.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&record.registered_at).is_ok());
    }
}
