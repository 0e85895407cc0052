use crate::card::Card;
use crate::signer::signed_digest;
use keycard_crypto::{CardCrypto, PublicKey};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A pinned, pre-provisioned authority credential: authority signatures are
/// validated against this key without any network lookup.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    pub card_id: String,
    pub public_key: PublicKey,
}

/// One trusted third-party signer credential inside a whitelist group.
#[derive(Debug, Clone)]
pub struct WhitelistCredential {
    pub signer_id: String,
    pub public_key: PublicKey,
}

/// A set of signer credentials that must all have signed for the group to be
/// satisfied. Policy requires all-of-group, any-of-groups.
#[derive(Debug, Clone, Default)]
pub struct WhitelistGroup {
    pub credentials: Vec<WhitelistCredential>,
}

impl WhitelistGroup {
    pub fn new(credentials: Vec<WhitelistCredential>) -> Self {
        Self { credentials }
    }
}

/// The mandatory signature roles the policy engine checks by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerRole {
    SelfSigned,
    Authority,
}

impl fmt::Display for SignerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerRole::SelfSigned => write!(f, "self"),
            SignerRole::Authority => write!(f, "authority"),
        }
    }
}

/// One failed policy check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required {0} signature is missing")]
    MissingSignature(SignerRole),

    #[error("{0} signature failed cryptographic verification")]
    InvalidSignature(SignerRole),

    #[error("no whitelist group is fully satisfied")]
    WhitelistUnsatisfied,
}

/// The complete list of failed checks for one card.
///
/// Verification never stops at the first failure; callers can assert on
/// exactly which checks failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationError {
    pub errors: Vec<ValidationError>,
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "card verification failed:")?;
        for error in &self.errors {
            write!(f, " [{}]", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for VerificationError {}

/// The trust-policy engine.
///
/// Configuration is fixed at construction (construct-then-freeze): the
/// builder-style `with_*` methods consume `self`, and `verify` takes `&self`
/// with no interior mutability, so concurrent verification against one
/// shared instance is safe.
pub struct CardVerifier {
    crypto: Arc<dyn CardCrypto>,
    require_self_signature: bool,
    require_authority_signature: bool,
    trust_anchor: Option<TrustAnchor>,
    whitelist_groups: Vec<WhitelistGroup>,
}

impl CardVerifier {
    /// Full default policy: self signature and pinned authority signature
    /// both required, no whitelist groups.
    pub fn new(crypto: Arc<dyn CardCrypto>, trust_anchor: TrustAnchor) -> Self {
        Self {
            crypto,
            require_self_signature: true,
            require_authority_signature: true,
            trust_anchor: Some(trust_anchor),
            whitelist_groups: Vec::new(),
        }
    }

    /// Policy without a pinned authority: only the self signature is
    /// required until further options are set.
    pub fn self_signed_only(crypto: Arc<dyn CardCrypto>) -> Self {
        Self {
            crypto,
            require_self_signature: true,
            require_authority_signature: false,
            trust_anchor: None,
            whitelist_groups: Vec::new(),
        }
    }

    pub fn require_self_signature(mut self, required: bool) -> Self {
        self.require_self_signature = required;
        self
    }

    /// Requiring the authority signature with no anchor configured makes the
    /// requirement unsatisfiable: verification reports the signature missing.
    pub fn require_authority_signature(mut self, required: bool) -> Self {
        self.require_authority_signature = required;
        self
    }

    pub fn with_trust_anchor(mut self, trust_anchor: TrustAnchor) -> Self {
        self.trust_anchor = Some(trust_anchor);
        self
    }

    pub fn with_whitelist_group(mut self, group: WhitelistGroup) -> Self {
        self.whitelist_groups.push(group);
        self
    }

    /// Accept or reject a parsed card, reporting every failed check.
    ///
    /// Mandatory roles are located by signer id - `card.identifier` for the
    /// self role, the anchor's card id for the authority role - never by
    /// list position, since signature order is not guaranteed on the wire.
    pub fn verify(&self, card: &Card) -> Result<(), VerificationError> {
        let mut errors = Vec::new();

        if self.require_self_signature {
            self.check_role(
                card,
                SignerRole::SelfSigned,
                &card.identifier,
                &card.public_key,
                &mut errors,
            );
        }

        if self.require_authority_signature {
            match &self.trust_anchor {
                Some(anchor) => self.check_role(
                    card,
                    SignerRole::Authority,
                    &anchor.card_id,
                    &anchor.public_key,
                    &mut errors,
                ),
                None => errors.push(ValidationError::MissingSignature(SignerRole::Authority)),
            }
        }

        if !self.whitelist_groups.is_empty() {
            let satisfied = self.whitelist_groups.iter().any(|group| {
                !group.credentials.is_empty()
                    && group.credentials.iter().all(|credential| {
                        self.signature_verifies(
                            card,
                            &credential.signer_id,
                            &credential.public_key,
                        )
                    })
            });
            if !satisfied {
                errors.push(ValidationError::WhitelistUnsatisfied);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(VerificationError { errors })
        }
    }

    fn check_role(
        &self,
        card: &Card,
        role: SignerRole,
        expected_signer_id: &str,
        public_key: &PublicKey,
        errors: &mut Vec<ValidationError>,
    ) {
        match card.signature_by_signer_id(expected_signer_id) {
            None => errors.push(ValidationError::MissingSignature(role)),
            Some(_) => {
                if !self.signature_verifies(card, expected_signer_id, public_key) {
                    errors.push(ValidationError::InvalidSignature(role));
                }
            }
        }
    }

    fn signature_verifies(&self, card: &Card, signer_id: &str, public_key: &PublicKey) -> bool {
        let Some(signature) = card.signature_by_signer_id(signer_id) else {
            return false;
        };
        let digest = signed_digest(
            self.crypto.as_ref(),
            &card.content_snapshot,
            &signature.signer_type,
            &signature.extra_snapshot,
        );
        self.crypto
            .verify(&signature.signature, &digest, public_key)
    }
}
