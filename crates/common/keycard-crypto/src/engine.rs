use crate::{CryptoError, PrivateKey, PublicKey};
use ed25519_dalek::Signer;
use sha2::{Digest, Sha256};
use signature::Verifier;

/// The crypto-engine capability consumed by the trust layer.
///
/// Implementations must be cheap to share across threads; the trust layer
/// holds engines behind `Arc<dyn CardCrypto>` and calls them concurrently.
pub trait CardCrypto: Send + Sync {
    /// SHA-256 digest of `data`.
    fn sha256(&self, data: &[u8]) -> [u8; 32];

    /// Import a public key from SPKI-DER bytes.
    fn import_public_key(&self, spki_der: &[u8]) -> Result<PublicKey, CryptoError>;

    /// Export a public key back to SPKI-DER bytes.
    fn export_public_key(&self, key: &PublicKey) -> Result<Vec<u8>, CryptoError>;

    /// Produce a detached signature over `data`.
    fn sign(&self, data: &[u8], key: &PrivateKey) -> Result<Vec<u8>, CryptoError>;

    /// Check a detached signature over `data`. Malformed signature bytes
    /// count as a failed verification, not an error.
    fn verify(&self, signature: &[u8], data: &[u8], key: &PublicKey) -> bool;
}

/// Default engine: Ed25519 signatures, SHA-256 hashing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519CardCrypto;

impl CardCrypto for Ed25519CardCrypto {
    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn import_public_key(&self, spki_der: &[u8]) -> Result<PublicKey, CryptoError> {
        PublicKey::from_spki_der(spki_der)
    }

    fn export_public_key(&self, key: &PublicKey) -> Result<Vec<u8>, CryptoError> {
        key.to_spki_der()
    }

    fn sign(&self, data: &[u8], key: &PrivateKey) -> Result<Vec<u8>, CryptoError> {
        let signature = key
            .signing_key()
            .try_sign(data)
            .map_err(CryptoError::Signing)?;
        Ok(signature.to_bytes().to_vec())
    }

    fn verify(&self, signature: &[u8], data: &[u8], key: &PublicKey) -> bool {
        let Ok(signature) = ed25519_dalek::Signature::try_from(signature) else {
            return false;
        };
        key.verifying_key().verify(data, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    #[test]
    fn sha256_matches_known_vector() {
        let engine = Ed25519CardCrypto;
        assert_eq!(
            hex::encode(engine.sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn engine_sign_verify_round_trip() {
        let engine = Ed25519CardCrypto;
        let kp = KeyPair::generate();
        let digest = engine.sha256(b"card content");

        let signature = engine.sign(&digest, &kp.private_key).unwrap();
        assert!(engine.verify(&signature, &digest, &kp.public_key));

        // A different digest must not verify.
        let other = engine.sha256(b"other content");
        assert!(!engine.verify(&signature, &other, &kp.public_key));
    }

    #[test]
    fn engine_import_matches_exported_key() {
        let engine = Ed25519CardCrypto;
        let kp = KeyPair::generate();

        let der = engine.export_public_key(&kp.public_key).unwrap();
        let imported = engine.import_public_key(&der).unwrap();
        assert_eq!(imported, kp.public_key);
    }
}
