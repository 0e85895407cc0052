use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors from the snapshot codec.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 decoding failed: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Encode a content model to its canonical snapshot bytes.
///
/// Serialization is deterministic: struct fields keep declaration order and
/// string maps must be `BTreeMap` so key order is stable. Encoding the same
/// value twice yields byte-identical output.
pub fn take_snapshot<T: Serialize>(value: &T) -> Result<Vec<u8>, SnapshotError> {
    Ok(serde_json::to_vec(value)?)
}

/// Decode a content model back out of snapshot bytes.
pub fn parse_snapshot<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SnapshotError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Serde helper for byte fields carried as standard base64 strings on the wire.
pub(crate) mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn snapshots_are_deterministic() {
        let mut fields = BTreeMap::new();
        fields.insert("b".to_string(), "2".to_string());
        fields.insert("a".to_string(), "1".to_string());

        let first = take_snapshot(&fields).unwrap();
        let second = take_snapshot(&fields).unwrap();
        assert_eq!(first, second);

        // Key order is sorted, not insertion order.
        assert_eq!(first, br#"{"a":"1","b":"2"}"#.to_vec());
    }

    #[test]
    fn snapshot_round_trip() {
        let mut fields = BTreeMap::new();
        fields.insert("department".to_string(), "accounting".to_string());

        let bytes = take_snapshot(&fields).unwrap();
        let decoded: BTreeMap<String, String> = parse_snapshot(&bytes).unwrap();
        assert_eq!(decoded, fields);
    }
}
