//! Wire-format data model for keycard envelopes.
//!
//! - `RawSignedModel` / `RawSignature`: the signed envelope as it travels to
//!   and from the card service, bit-exact JSON with base64 byte fields.
//! - `RawCardContent`: the card content decoded from a content snapshot.
//! - Snapshot codec: deterministic JSON encoding, the byte form that gets
//!   hashed and signed.
//! - Zero `unsafe`; no I/O.

#![forbid(unsafe_code)]

mod content;
mod model;
mod snapshot;

pub use content::{RawCardContent, CARD_VERSION};
pub use model::{RawSignature, RawSignedModel, SignerType};
pub use snapshot::{parse_snapshot, take_snapshot, SnapshotError};
