use crate::card::{Card, MalformedCardError};
use crate::signer::{ModelSigner, SignError};
use crate::transport::{AccessToken, AccessTokenProvider, CardTransport, TransportError};
use crate::verifier::{CardVerifier, VerificationError};
use chrono::Utc;
use keycard_crypto::{CardCrypto, CryptoError, PrivateKey, PublicKey};
use keycard_types::{RawCardContent, RawSignedModel, SnapshotError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Default bound on previous-card chain traversal. A hostile service could
/// otherwise force unbounded resolution work with a long rotation chain.
pub const MAX_PREVIOUS_CHAIN_DEPTH: usize = 16;

/// Hook run on a freshly self-signed envelope before it is returned, e.g.
/// to append a server-supplied authority signature.
pub type SignCallback =
    dyn Fn(RawSignedModel) -> Result<RawSignedModel, SignError> + Send + Sync;

/// Errors surfaced by manager operations.
///
/// Parse and verification failures pass through unchanged - a swallowed
/// verification failure would silently trust an unverified identity binding.
#[derive(Debug, Error)]
pub enum CardManagerError {
    #[error(transparent)]
    Malformed(#[from] MalformedCardError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Signing(#[from] SignError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("card service misbehavior: {0}")]
    ServiceMisbehavior(String),

    #[error("previous-card chain exceeds the traversal bound of {limit} cards")]
    ChainTooDeep { limit: usize },
}

/// Orchestrates signer, verifier, transport and token provider.
///
/// Every card that crosses the transport boundary is parsed and verified
/// before it reaches the caller; there is no unverified-but-accessible
/// state.
pub struct CardManager {
    crypto: Arc<dyn CardCrypto>,
    signer: ModelSigner,
    verifier: CardVerifier,
    transport: Arc<dyn CardTransport>,
    token_provider: Arc<dyn AccessTokenProvider>,
    sign_callback: Option<Box<SignCallback>>,
}

impl CardManager {
    pub fn new(
        crypto: Arc<dyn CardCrypto>,
        verifier: CardVerifier,
        transport: Arc<dyn CardTransport>,
        token_provider: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        let signer = ModelSigner::new(Arc::clone(&crypto));
        Self {
            crypto,
            signer,
            verifier,
            transport,
            token_provider,
            sign_callback: None,
        }
    }

    pub fn with_sign_callback(mut self, callback: Box<SignCallback>) -> Self {
        self.sign_callback = Some(callback);
        self
    }

    /// Build and self-sign a card envelope for the current token's identity.
    ///
    /// The sign callback, when configured, runs last and may append further
    /// signatures before the envelope is handed back.
    pub fn generate_raw_card(
        &self,
        private_key: &PrivateKey,
        public_key: &PublicKey,
        previous_card_id: Option<String>,
    ) -> Result<RawSignedModel, CardManagerError> {
        let token = self.fresh_token()?;
        debug!(identity = %token.identity(), "generating raw card");

        let content = RawCardContent::new(
            token.identity().to_string(),
            self.crypto.export_public_key(public_key)?,
            Utc::now().timestamp(),
            previous_card_id,
        );
        let mut model = RawSignedModel::new(content.take_snapshot()?);
        self.signer.self_sign(&mut model, private_key)?;

        if let Some(callback) = &self.sign_callback {
            model = callback(model)?;
        }
        Ok(model)
    }

    /// Submit an envelope and return the published card, verified.
    pub fn publish_card(&self, model: &RawSignedModel) -> Result<Card, CardManagerError> {
        let token = self.fresh_token()?;
        debug!(identity = %token.identity(), "publishing card");

        let returned = self.transport.publish(model, token.as_str())?;
        if returned.content_snapshot != model.content_snapshot {
            warn!("card service altered the published content snapshot");
            return Err(CardManagerError::ServiceMisbehavior(
                "published content snapshot was altered in transit".to_string(),
            ));
        }
        self.parse_and_verify(&returned)
    }

    /// Fetch one card by identifier, verified.
    pub fn get_card(&self, card_id: &str) -> Result<Card, CardManagerError> {
        let token = self.fresh_token()?;
        debug!(card_id, "fetching card");

        let model = self.transport.get(card_id, token.as_str())?;
        let card = self.parse_and_verify(&model)?;
        if card.identifier != card_id {
            warn!(
                requested = card_id,
                received = %card.identifier,
                "card service returned a different card than requested"
            );
            return Err(CardManagerError::ServiceMisbehavior(format!(
                "requested card {card_id} but received {}",
                card.identifier
            )));
        }
        Ok(card)
    }

    /// Fetch every card bound to an identity, verified.
    ///
    /// A single invalid card fails the whole batch - dropping it could mask
    /// an active substitution attack. Cards superseded by another result are
    /// attached to their successor as `previous_card`, marked outdated, and
    /// removed from the top level.
    pub fn search_cards(&self, identity: &str) -> Result<Vec<Card>, CardManagerError> {
        let token = self.fresh_token()?;
        debug!(identity, "searching cards");

        let models = self.transport.search(identity, token.as_str())?;
        let mut cards = Vec::with_capacity(models.len());
        for model in &models {
            cards.push(self.parse_and_verify(model)?);
        }
        Ok(Self::link_superseded(cards))
    }

    /// Resolve the card this one superseded, one step, verified and marked
    /// outdated. `None` when the card has no predecessor.
    pub fn get_previous_card(&self, card: &Card) -> Result<Option<Card>, CardManagerError> {
        let Some(previous_id) = &card.previous_card_id else {
            return Ok(None);
        };
        let mut previous = self.get_card(previous_id)?;
        previous.is_outdated = true;
        Ok(Some(previous))
    }

    /// Walk the supersession chain backwards, newest predecessor first.
    ///
    /// Traversal is explicitly bounded: more than `max_depth` predecessors,
    /// or a repeated identifier, aborts the walk instead of chasing an
    /// unbounded or cyclic chain.
    pub fn previous_chain(
        &self,
        card: &Card,
        max_depth: usize,
    ) -> Result<Vec<Card>, CardManagerError> {
        let mut chain = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(card.identifier.clone());

        let mut cursor = card.previous_card_id.clone();
        while let Some(previous_id) = cursor {
            if chain.len() >= max_depth {
                return Err(CardManagerError::ChainTooDeep { limit: max_depth });
            }
            if !seen.insert(previous_id.clone()) {
                return Err(CardManagerError::ServiceMisbehavior(format!(
                    "previous-card chain revisits card {previous_id}"
                )));
            }
            let mut previous = self.get_card(&previous_id)?;
            previous.is_outdated = true;
            cursor = previous.previous_card_id.clone();
            chain.push(previous);
        }
        Ok(chain)
    }

    fn parse_and_verify(&self, model: &RawSignedModel) -> Result<Card, CardManagerError> {
        let card = Card::parse(self.crypto.as_ref(), model)?;
        if let Err(errors) = self.verifier.verify(&card) {
            warn!(card_id = %card.identifier, %errors, "card failed verification");
            return Err(errors.into());
        }
        Ok(card)
    }

    fn fresh_token(&self) -> Result<AccessToken, CardManagerError> {
        let token = self.token_provider.get_token(false)?;
        if token.is_expired() {
            debug!("cached access token expired, forcing reload");
            return Ok(self.token_provider.get_token(true)?);
        }
        Ok(token)
    }

    fn link_superseded(cards: Vec<Card>) -> Vec<Card> {
        let superseded_ids: HashSet<String> = cards
            .iter()
            .filter_map(|card| card.previous_card_id.clone())
            .collect();

        let (superseded, mut current): (Vec<Card>, Vec<Card>) = cards
            .into_iter()
            .partition(|card| superseded_ids.contains(&card.identifier));

        let mut predecessors: HashMap<String, Arc<Card>> = HashMap::new();
        for mut card in superseded {
            card.is_outdated = true;
            predecessors.insert(card.identifier.clone(), Arc::new(card));
        }

        for card in &mut current {
            if let Some(previous_id) = &card.previous_card_id {
                if let Some(previous) = predecessors.get(previous_id) {
                    card.previous_card = Some(Arc::clone(previous));
                }
            }
        }
        current
    }
}
