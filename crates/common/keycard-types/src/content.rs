use crate::snapshot::{b64, take_snapshot, SnapshotError};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Content-model version written into newly issued cards.
pub const CARD_VERSION: &str = "5.0";

/// The card content decoded from a `content_snapshot`.
///
/// Field order matters: the snapshot codec serializes fields in declaration
/// order and the resulting bytes are what gets hashed and signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCardContent {
    /// Identity string this card binds.
    pub identity: String,

    /// Public key in SPKI-DER form, base64 on the wire.
    #[serde(with = "b64")]
    pub public_key: Vec<u8>,

    /// Content-model version, e.g. `"5.0"`.
    pub version: String,

    /// Issuance time, unix seconds.
    pub created_at: i64,

    /// Identifier of the card this one supersedes, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub previous_card_id: Option<String>,
}

impl RawCardContent {
    pub fn new(
        identity: String,
        public_key: Vec<u8>,
        created_at: i64,
        previous_card_id: Option<String>,
    ) -> Self {
        Self {
            identity,
            public_key,
            version: CARD_VERSION.to_string(),
            created_at,
            previous_card_id,
        }
    }

    /// Capture the canonical snapshot bytes of this content.
    pub fn take_snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        take_snapshot(self)
    }

    /// Issuance time as a UTC timestamp, `None` if out of range.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.created_at, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::parse_snapshot;

    fn sample_content() -> RawCardContent {
        RawCardContent::new("alice".to_string(), vec![0x30, 0x2a], 1515686245, None)
    }

    #[test]
    fn snapshot_is_byte_stable() {
        let content = sample_content();
        assert_eq!(
            content.take_snapshot().unwrap(),
            content.take_snapshot().unwrap()
        );
    }

    #[test]
    fn previous_card_id_is_omitted_when_absent() {
        let bytes = sample_content().take_snapshot().unwrap();
        let json = String::from_utf8(bytes).unwrap();
        assert!(!json.contains("previous_card_id"));

        let mut rotated = sample_content();
        rotated.previous_card_id = Some("deadbeef".to_string());
        let json = String::from_utf8(rotated.take_snapshot().unwrap()).unwrap();
        assert!(json.contains("\"previous_card_id\":\"deadbeef\""));
    }

    #[test]
    fn snapshot_round_trip() {
        let content = sample_content();
        let decoded: RawCardContent =
            parse_snapshot(&content.take_snapshot().unwrap()).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn created_at_converts_to_utc() {
        let content = sample_content();
        let when = content.created_at_utc().unwrap();
        assert_eq!(when.timestamp(), 1515686245);
    }
}
