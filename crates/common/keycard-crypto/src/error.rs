use thiserror::Error;

/// Errors from the crypto engine.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to decode SPKI-DER public key: {0}")]
    PublicKeyDecode(String),

    #[error("failed to encode public key to SPKI-DER: {0}")]
    PublicKeyEncode(String),

    #[error("invalid signature length: expected {expected} bytes, found {found} bytes")]
    InvalidSignatureLength { expected: usize, found: usize },

    #[error("signing failed: {0}")]
    Signing(#[from] ed25519_dalek::SignatureError),
}
