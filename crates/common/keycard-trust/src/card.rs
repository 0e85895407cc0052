use keycard_crypto::{CardCrypto, CryptoError, PublicKey};
use keycard_types::{
    parse_snapshot, RawCardContent, RawSignature, RawSignedModel, SignerType, SnapshotError,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors for structurally invalid card envelopes.
#[derive(Debug, Error)]
pub enum MalformedCardError {
    #[error("content snapshot is not decodable card content: {0}")]
    ContentSnapshot(#[source] SnapshotError),

    #[error("extra-data snapshot of signer {signer_id} is not a string map: {source}")]
    ExtraSnapshot {
        signer_id: String,
        #[source]
        source: SnapshotError,
    },

    #[error("signature from {signer_id} carries unrecognized signer type \"{signer_type}\"")]
    UnknownSignerType {
        signer_id: String,
        signer_type: String,
    },

    #[error("card public key is not importable: {0}")]
    PublicKey(#[from] CryptoError),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// One parsed signature of a card.
///
/// Keeps the raw extra-data snapshot bytes next to the parsed field map so
/// that re-serialization stays byte-exact and fingerprint recomputation uses
/// exactly the bytes that were signed.
#[derive(Debug, Clone, PartialEq)]
pub struct CardSignature {
    pub signer_id: String,
    pub signer_type: SignerType,
    pub signature: Vec<u8>,
    pub extra_snapshot: Vec<u8>,
    pub extra_fields: Option<BTreeMap<String, String>>,
}

/// A verified identity-to-public-key binding record.
///
/// Only [`Card::parse`] produces these; the identifier is always recomputed
/// from the transmitted snapshot bytes and never trusted from the wire. A
/// card is never mutated after construction - rotation yields a new card.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// Lowercase hex SHA-256 of `content_snapshot`.
    pub identifier: String,
    pub identity: String,
    pub public_key: PublicKey,
    pub version: String,
    /// Issuance time, unix seconds.
    pub created_at: i64,
    /// Identifier of the superseded card, if this card rotated one.
    pub previous_card_id: Option<String>,
    /// The superseded card itself, attached when it has been resolved.
    pub previous_card: Option<Arc<Card>>,
    pub signatures: Vec<CardSignature>,
    pub is_outdated: bool,
    /// The exact transmitted content bytes; retained so the card can be
    /// re-serialized without changing its identifier.
    pub content_snapshot: Vec<u8>,
}

impl Card {
    /// Turn a wire envelope into a card.
    ///
    /// Pure: no network, no mutation of the input. Fails fast on the first
    /// structural problem - undecodable content, empty mandatory fields,
    /// unimportable public key, or an unrecognized signer type.
    pub fn parse(
        crypto: &dyn CardCrypto,
        model: &RawSignedModel,
    ) -> Result<Card, MalformedCardError> {
        if model.content_snapshot.is_empty() {
            return Err(MalformedCardError::MissingField("content_snapshot"));
        }

        let content: RawCardContent = parse_snapshot(&model.content_snapshot)
            .map_err(MalformedCardError::ContentSnapshot)?;

        if content.identity.is_empty() {
            return Err(MalformedCardError::MissingField("identity"));
        }
        if content.public_key.is_empty() {
            return Err(MalformedCardError::MissingField("public_key"));
        }

        let identifier = Self::compute_identifier(crypto, &model.content_snapshot);
        let public_key = crypto.import_public_key(&content.public_key)?;

        let mut signatures = Vec::with_capacity(model.signatures.len());
        for raw in &model.signatures {
            signatures.push(CardSignature::parse(raw)?);
        }

        Ok(Card {
            identifier,
            identity: content.identity,
            public_key,
            version: content.version,
            created_at: content.created_at,
            previous_card_id: content.previous_card_id,
            previous_card: None,
            signatures,
            is_outdated: false,
            content_snapshot: model.content_snapshot.clone(),
        })
    }

    /// Derive a card identifier from snapshot bytes.
    pub fn compute_identifier(crypto: &dyn CardCrypto, content_snapshot: &[u8]) -> String {
        hex::encode(crypto.sha256(content_snapshot))
    }

    /// Re-serialize into the wire envelope, byte-exact.
    pub fn to_raw_model(&self) -> RawSignedModel {
        RawSignedModel {
            content_snapshot: self.content_snapshot.clone(),
            signatures: self
                .signatures
                .iter()
                .map(|s| RawSignature {
                    signer_id: s.signer_id.clone(),
                    snapshot: s.extra_snapshot.clone(),
                    signer_type: s.signer_type.clone(),
                    signature: s.signature.clone(),
                })
                .collect(),
        }
    }

    /// Look a signature up by its signer id.
    pub fn signature_by_signer_id(&self, signer_id: &str) -> Option<&CardSignature> {
        self.signatures.iter().find(|s| s.signer_id == signer_id)
    }
}

impl CardSignature {
    fn parse(raw: &RawSignature) -> Result<Self, MalformedCardError> {
        if let SignerType::Unknown(other) = &raw.signer_type {
            // Fail closed: an unrecognized role must not be coerced to extra.
            return Err(MalformedCardError::UnknownSignerType {
                signer_id: raw.signer_id.clone(),
                signer_type: other.clone(),
            });
        }

        let extra_fields = if raw.snapshot.is_empty() {
            None
        } else {
            Some(parse_snapshot(&raw.snapshot).map_err(|source| {
                MalformedCardError::ExtraSnapshot {
                    signer_id: raw.signer_id.clone(),
                    source,
                }
            })?)
        };

        Ok(CardSignature {
            signer_id: raw.signer_id.clone(),
            signer_type: raw.signer_type.clone(),
            signature: raw.signature.clone(),
            extra_snapshot: raw.snapshot.clone(),
            extra_fields,
        })
    }
}
