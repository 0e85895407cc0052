//! Keycard crypto engine - key handling, hashing, signing and verification.
//!
//! - `CardCrypto` is the capability the trust layer consumes: SHA-256,
//!   SPKI-DER key import/export, detached Ed25519 signatures.
//! - `Ed25519CardCrypto` is the default engine (`ed25519-dalek` + `sha2`).
//! - `KeyPair` generation mirrors the usual OS-RNG flow.
//! - Zero `unsafe`; `#![forbid(unsafe_code)]`.

#![forbid(unsafe_code)]

mod engine;
mod error;
mod keypair;

pub use engine::{CardCrypto, Ed25519CardCrypto};
pub use error::CryptoError;
pub use keypair::{KeyPair, PrivateKey, PublicKey};
