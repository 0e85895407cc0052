use keycard_crypto::{CardCrypto, CryptoError, PrivateKey};
use keycard_types::{take_snapshot, RawSignature, RawSignedModel, SignerType, SnapshotError};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while appending a signature to an envelope.
#[derive(Debug, Error)]
pub enum SignError {
    #[error("model already carries a {signer_type}-type signature from {signer_id}")]
    DuplicateSignature {
        signer_id: String,
        signer_type: SignerType,
    },

    #[error("cannot sign with an unrecognized signer type")]
    UnknownSignerType,

    #[error("extra fields may only accompany an extra-type signature, not {signer_type}")]
    ExtraFieldsNotAllowed { signer_type: SignerType },

    #[error("snapshot serialization failed: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Compute the digest a signer of this envelope actually signs.
///
/// The base fingerprint is SHA-256 of the content snapshot. An extra-type
/// signature carrying bound fields signs SHA-256 of the fingerprint
/// concatenated with the encoded fields, so the metadata cannot be stripped
/// or substituted without invalidating the signature.
pub(crate) fn signed_digest(
    crypto: &dyn CardCrypto,
    content_snapshot: &[u8],
    signer_type: &SignerType,
    extra_snapshot: &[u8],
) -> Vec<u8> {
    let fingerprint = crypto.sha256(content_snapshot);
    if matches!(signer_type, SignerType::Extra) && !extra_snapshot.is_empty() {
        let mut bound = Vec::with_capacity(fingerprint.len() + extra_snapshot.len());
        bound.extend_from_slice(&fingerprint);
        bound.extend_from_slice(extra_snapshot);
        crypto.sha256(&bound).to_vec()
    } else {
        fingerprint.to_vec()
    }
}

/// Appends signatures to wire envelopes.
///
/// The signature list is append-only: existing entries are never reordered
/// or replaced, and a duplicate `(signer_id, signer_type)` pair is refused.
#[derive(Clone)]
pub struct ModelSigner {
    crypto: Arc<dyn CardCrypto>,
}

impl ModelSigner {
    pub fn new(crypto: Arc<dyn CardCrypto>) -> Self {
        Self { crypto }
    }

    /// Self-sign: the signer id is the card's own computed identifier.
    pub fn self_sign(
        &self,
        model: &mut RawSignedModel,
        key: &PrivateKey,
    ) -> Result<(), SignError> {
        let identifier = hex::encode(self.crypto.sha256(&model.content_snapshot));
        self.sign(model, &identifier, SignerType::SelfSigned, None, key)
    }

    /// Append a signature under the given id and role.
    ///
    /// `extra_fields` is accepted only for [`SignerType::Extra`]; the encoded
    /// fields ride in the signature's snapshot and are folded into the
    /// signed digest.
    pub fn sign(
        &self,
        model: &mut RawSignedModel,
        signer_id: &str,
        signer_type: SignerType,
        extra_fields: Option<&BTreeMap<String, String>>,
        key: &PrivateKey,
    ) -> Result<(), SignError> {
        if matches!(signer_type, SignerType::Unknown(_)) {
            return Err(SignError::UnknownSignerType);
        }
        if extra_fields.is_some() && !matches!(signer_type, SignerType::Extra) {
            return Err(SignError::ExtraFieldsNotAllowed { signer_type });
        }
        if model
            .signatures
            .iter()
            .any(|s| s.signer_id == signer_id && s.signer_type == signer_type)
        {
            return Err(SignError::DuplicateSignature {
                signer_id: signer_id.to_string(),
                signer_type,
            });
        }

        let extra_snapshot = match extra_fields {
            Some(fields) => take_snapshot(fields)?,
            None => Vec::new(),
        };

        let digest = signed_digest(
            self.crypto.as_ref(),
            &model.content_snapshot,
            &signer_type,
            &extra_snapshot,
        );
        let signature = self.crypto.sign(&digest, key)?;

        model.signatures.push(RawSignature {
            signer_id: signer_id.to_string(),
            snapshot: extra_snapshot,
            signer_type,
            signature,
        });
        Ok(())
    }
}
