use crate::CryptoError;
use ed25519_dalek::pkcs8::{DecodePublicKey, EncodePublicKey};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// An imported public key handle.
///
/// Opaque to the trust layer; construction goes through SPKI-DER import so a
/// handle always wraps a structurally valid key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PublicKey {
    /// Import from SPKI-DER bytes, the form card content carries.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        let key = VerifyingKey::from_public_key_der(der)
            .map_err(|e| CryptoError::PublicKeyDecode(e.to_string()))?;
        Ok(Self { key })
    }

    /// Export back to SPKI-DER bytes.
    pub fn to_spki_der(&self) -> Result<Vec<u8>, CryptoError> {
        let document = self
            .key
            .to_public_key_der()
            .map_err(|e| CryptoError::PublicKeyEncode(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Verify a detached signature over `msg`.
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = ed25519_dalek::Signature::try_from(signature) else {
            return false;
        };
        self.key.verify(msg, &signature).is_ok()
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        Self { key }
    }
}

/// A private signing key handle.
#[derive(Clone, Debug)]
pub struct PrivateKey {
    key: SigningKey,
}

impl PrivateKey {
    /// Rebuild from the 32 secret bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(bytes),
        }
    }

    /// Return the secret bytes, for serialization into a keystore.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    /// Derive the matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.key.verifying_key(),
        }
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.key
    }
}

/// Ed25519 keypair.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let sk = SigningKey::generate(&mut OsRng);
        let pk = sk.verifying_key();
        Self {
            public_key: PublicKey { key: pk },
            private_key: PrivateKey { key: sk },
        }
    }

    /// Sign arbitrary bytes, returning the detached signature bytes.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.private_key.key.sign(msg).to_bytes().to_vec()
    }

    /// Verify a detached signature against `msg`.
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> bool {
        self.public_key.verify(msg, signature)
    }
}
