//! Keycard trust core - the card trust protocol.
//!
//! - Parses wire envelopes into verified-identifier-bearing [`Card`] entities.
//! - Appends role-tagged signatures to envelopes ([`ModelSigner`]).
//! - Accepts or rejects parsed cards against a configured trust policy
//!   ([`CardVerifier`]: self signature, pinned authority, whitelist groups),
//!   reporting every failed check, not just the first.
//! - Orchestrates signing, transport and verification so callers never see
//!   an unverified card ([`CardManager`]).
//! - Zero `unsafe`; Clippy-clean; `#![forbid(unsafe_code)]`.

#![forbid(unsafe_code)]

mod card;
mod manager;
mod signer;
mod transport;
mod verifier;

pub use card::{Card, CardSignature, MalformedCardError};
pub use manager::{CardManager, CardManagerError, SignCallback, MAX_PREVIOUS_CHAIN_DEPTH};
pub use signer::{ModelSigner, SignError};
pub use transport::{
    AccessToken, AccessTokenProvider, CardTransport, ConstAccessTokenProvider, TransportError,
};
pub use verifier::{
    CardVerifier, SignerRole, TrustAnchor, ValidationError, VerificationError,
    WhitelistCredential, WhitelistGroup,
};
