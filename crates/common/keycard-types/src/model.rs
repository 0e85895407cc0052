use crate::snapshot::{b64, SnapshotError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The declared role of a signature on a card envelope.
///
/// Wire strings are `"self"`, `"app"`, `"extra"` and `"virgil"`. Anything
/// else decodes into [`SignerType::Unknown`], which parsing and signing
/// reject rather than coercing to a known role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SignerType {
    /// The card owner's own key.
    SelfSigned,
    /// The pinned issuing authority (application) key.
    App,
    /// A third-party co-signer, optionally binding extra metadata.
    Extra,
    /// The platform service's own signature, added on publish.
    Virgil,
    /// An unrecognized wire string, preserved for diagnostics.
    Unknown(String),
}

impl SignerType {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "self" => SignerType::SelfSigned,
            "app" => SignerType::App,
            "extra" => SignerType::Extra,
            "virgil" => SignerType::Virgil,
            other => SignerType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SignerType::SelfSigned => "self",
            SignerType::App => "app",
            SignerType::Extra => "extra",
            SignerType::Virgil => "virgil",
            SignerType::Unknown(other) => other.as_str(),
        }
    }
}

impl fmt::Display for SignerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for SignerType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SignerType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(SignerType::from_wire(&value))
    }
}

/// One signature entry of a signed envelope.
///
/// `snapshot` is the extra-data snapshot: empty unless the signer bound
/// additional fields into the signature (extra-type signers). It rides the
/// wire as base64, `""` when empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSignature {
    pub signer_id: String,

    #[serde(with = "b64", default)]
    pub snapshot: Vec<u8>,

    pub signer_type: SignerType,

    #[serde(with = "b64")]
    pub signature: Vec<u8>,
}

/// The wire envelope: canonical content bytes plus an append-only list of
/// signatures over them.
///
/// The snapshot bytes are never re-encoded once captured; hashing and
/// signing operate on exactly the bytes that travel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSignedModel {
    #[serde(with = "b64")]
    pub content_snapshot: Vec<u8>,

    pub signatures: Vec<RawSignature>,
}

impl RawSignedModel {
    /// Wrap freshly captured content bytes with no signatures yet.
    pub fn new(content_snapshot: Vec<u8>) -> Self {
        Self {
            content_snapshot,
            signatures: Vec::new(),
        }
    }

    /// Serialize to the wire JSON form.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from the wire JSON form.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Export as a base64 string of the JSON form, for offline exchange.
    pub fn to_base64(&self) -> Result<String, SnapshotError> {
        Ok(STANDARD.encode(self.to_json()?))
    }

    /// Import from a base64 string produced by [`RawSignedModel::to_base64`].
    pub fn from_base64(encoded: &str) -> Result<Self, SnapshotError> {
        let json = STANDARD.decode(encoded.as_bytes())?;
        Ok(serde_json::from_slice(&json)?)
    }
}
