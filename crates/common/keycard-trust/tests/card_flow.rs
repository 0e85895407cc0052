//! End-to-end flows through the card manager against an in-memory service.

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use keycard_crypto::{CardCrypto, Ed25519CardCrypto, KeyPair};
use keycard_trust::{
    AccessToken, AccessTokenProvider, Card, CardManager, CardManagerError, CardTransport,
    CardVerifier, ConstAccessTokenProvider, ModelSigner, TransportError, TrustAnchor,
};
use keycard_types::{parse_snapshot, RawCardContent, RawSignedModel, SignerType};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

fn crypto() -> Arc<dyn CardCrypto> {
    Arc::new(Ed25519CardCrypto)
}

fn card_id_of(model: &RawSignedModel) -> String {
    hex::encode(Ed25519CardCrypto.sha256(&model.content_snapshot))
}

fn token_provider(identity: &str) -> Arc<dyn AccessTokenProvider> {
    Arc::new(ConstAccessTokenProvider::new(AccessToken::new(
        identity, "jwt", None,
    )))
}

/// In-memory card service: stores published envelopes, co-signs them with
/// its platform key, and serves get/search out of the store.
struct InMemoryCardService {
    store: Mutex<HashMap<String, RawSignedModel>>,
    platform: KeyPair,
}

impl InMemoryCardService {
    fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            platform: KeyPair::generate(),
        }
    }
}

impl CardTransport for InMemoryCardService {
    fn publish(
        &self,
        model: &RawSignedModel,
        bearer: &str,
    ) -> Result<RawSignedModel, TransportError> {
        if bearer.is_empty() {
            return Err(TransportError::new("missing bearer token"));
        }
        let mut echoed = model.clone();
        ModelSigner::new(crypto())
            .sign(
                &mut echoed,
                "platform",
                SignerType::Virgil,
                None,
                &self.platform.private_key,
            )
            .map_err(|e| TransportError::new(e.to_string()))?;
        self.store
            .lock()
            .unwrap()
            .insert(card_id_of(&echoed), echoed.clone());
        Ok(echoed)
    }

    fn get(&self, card_id: &str, _bearer: &str) -> Result<RawSignedModel, TransportError> {
        self.store
            .lock()
            .unwrap()
            .get(card_id)
            .cloned()
            .ok_or_else(|| TransportError::new(format!("card {card_id} not found")))
    }

    fn search(
        &self,
        identity: &str,
        _bearer: &str,
    ) -> Result<Vec<RawSignedModel>, TransportError> {
        let store = self.store.lock().unwrap();
        let mut found = Vec::new();
        for model in store.values() {
            let content: RawCardContent = parse_snapshot(&model.content_snapshot)
                .map_err(|e| TransportError::new(e.to_string()))?;
            if content.identity == identity {
                found.push(model.clone());
            }
        }
        // Stable order so assertions do not depend on hash iteration.
        found.sort_by_key(card_id_of);
        Ok(found)
    }
}

fn manager_for(service: Arc<InMemoryCardService>, identity: &str) -> CardManager {
    CardManager::new(
        crypto(),
        CardVerifier::self_signed_only(crypto()),
        service,
        token_provider(identity),
    )
}

#[test]
fn publish_then_get_returns_verified_card() {
    let service = Arc::new(InMemoryCardService::new());
    let manager = manager_for(Arc::clone(&service), "alice");
    let kp = KeyPair::generate();

    let model = manager
        .generate_raw_card(&kp.private_key, &kp.public_key, None)
        .unwrap();
    let published = manager.publish_card(&model).unwrap();
    assert_eq!(published.identity, "alice");
    assert_eq!(published.identifier, card_id_of(&model));
    // The service added its own platform signature.
    assert_eq!(published.signatures.len(), 2);

    let fetched = manager.get_card(&published.identifier).unwrap();
    assert_eq!(fetched.identifier, published.identifier);
    assert_eq!(fetched.identity, "alice");
}

#[test]
fn publish_with_authority_pinning() {
    let service = Arc::new(InMemoryCardService::new());
    let authority = KeyPair::generate();
    let authority_id = "authority-card-id".to_string();

    let callback_signer = ModelSigner::new(crypto());
    let callback_key = authority.private_key.clone();
    let callback_id = authority_id.clone();
    let verifier = CardVerifier::new(
        crypto(),
        TrustAnchor {
            card_id: authority_id,
            public_key: authority.public_key.clone(),
        },
    );
    let manager = CardManager::new(
        crypto(),
        verifier,
        Arc::clone(&service) as Arc<dyn CardTransport>,
        token_provider("alice"),
    )
    .with_sign_callback(Box::new(move |mut model| {
        callback_signer.sign(
            &mut model,
            &callback_id,
            SignerType::App,
            None,
            &callback_key,
        )?;
        Ok(model)
    }));

    let kp = KeyPair::generate();
    let model = manager
        .generate_raw_card(&kp.private_key, &kp.public_key, None)
        .unwrap();
    // Self signature plus the callback-provided authority signature.
    assert_eq!(model.signatures.len(), 2);

    let published = manager.publish_card(&model).unwrap();
    assert_eq!(published.identity, "alice");
}

#[test]
fn publish_rejects_altered_content_snapshot() {
    struct AlteringService;
    impl CardTransport for AlteringService {
        fn publish(
            &self,
            model: &RawSignedModel,
            _bearer: &str,
        ) -> Result<RawSignedModel, TransportError> {
            let mut altered = model.clone();
            altered.content_snapshot = b"{\"identity\":\"mallory\"}".to_vec();
            Ok(altered)
        }
        fn get(&self, _: &str, _: &str) -> Result<RawSignedModel, TransportError> {
            Err(TransportError::new("not implemented"))
        }
        fn search(&self, _: &str, _: &str) -> Result<Vec<RawSignedModel>, TransportError> {
            Err(TransportError::new("not implemented"))
        }
    }

    let manager = CardManager::new(
        crypto(),
        CardVerifier::self_signed_only(crypto()),
        Arc::new(AlteringService),
        token_provider("alice"),
    );
    let kp = KeyPair::generate();
    let model = manager
        .generate_raw_card(&kp.private_key, &kp.public_key, None)
        .unwrap();

    let result = manager.publish_card(&model);
    assert_matches!(result, Err(CardManagerError::ServiceMisbehavior(_)));
}

#[test]
fn get_card_rejects_substituted_card() {
    // A service that answers every get with whatever it has stored first.
    struct MisdirectingService {
        inner: InMemoryCardService,
    }
    impl CardTransport for MisdirectingService {
        fn publish(
            &self,
            model: &RawSignedModel,
            bearer: &str,
        ) -> Result<RawSignedModel, TransportError> {
            self.inner.publish(model, bearer)
        }
        fn get(&self, _card_id: &str, _bearer: &str) -> Result<RawSignedModel, TransportError> {
            let store = self.inner.store.lock().unwrap();
            store
                .values()
                .next()
                .cloned()
                .ok_or_else(|| TransportError::new("empty store"))
        }
        fn search(&self, identity: &str, bearer: &str) -> Result<Vec<RawSignedModel>, TransportError> {
            self.inner.search(identity, bearer)
        }
    }

    let service = Arc::new(MisdirectingService {
        inner: InMemoryCardService::new(),
    });
    let manager = CardManager::new(
        crypto(),
        CardVerifier::self_signed_only(crypto()),
        Arc::clone(&service) as Arc<dyn CardTransport>,
        token_provider("alice"),
    );
    let kp = KeyPair::generate();
    let model = manager
        .generate_raw_card(&kp.private_key, &kp.public_key, None)
        .unwrap();
    manager.publish_card(&model).unwrap();

    let result = manager.get_card("0000000000000000000000000000000000000000000000000000000000000000");
    assert_matches!(result, Err(CardManagerError::ServiceMisbehavior(_)));
}

#[test]
fn search_fails_closed_on_a_single_invalid_card() {
    let service = Arc::new(InMemoryCardService::new());
    let manager = manager_for(Arc::clone(&service), "alice");

    let good = KeyPair::generate();
    let model = manager
        .generate_raw_card(&good.private_key, &good.public_key, None)
        .unwrap();
    manager.publish_card(&model).unwrap();

    // Second alice card whose self-signature is corrupted after signing.
    let bad = KeyPair::generate();
    let mut bad_model = manager
        .generate_raw_card(&bad.private_key, &bad.public_key, None)
        .unwrap();
    bad_model.signatures[0].signature[0] ^= 0xFF;
    service
        .store
        .lock()
        .unwrap()
        .insert(card_id_of(&bad_model), bad_model);

    let result = manager.search_cards("alice");
    assert_matches!(result, Err(CardManagerError::Verification(_)));
}

#[test]
fn search_links_superseded_cards() {
    let service = Arc::new(InMemoryCardService::new());
    let manager = manager_for(Arc::clone(&service), "alice");

    let old_kp = KeyPair::generate();
    let old_model = manager
        .generate_raw_card(&old_kp.private_key, &old_kp.public_key, None)
        .unwrap();
    let old_card = manager.publish_card(&old_model).unwrap();

    let new_kp = KeyPair::generate();
    let new_model = manager
        .generate_raw_card(
            &new_kp.private_key,
            &new_kp.public_key,
            Some(old_card.identifier.clone()),
        )
        .unwrap();
    let new_card = manager.publish_card(&new_model).unwrap();

    let results = manager.search_cards("alice").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].identifier, new_card.identifier);

    let previous = results[0].previous_card.as_ref().unwrap();
    assert_eq!(previous.identifier, old_card.identifier);
    assert!(previous.is_outdated);
}

#[test]
fn previous_chain_is_resolved_and_bounded() {
    let service = Arc::new(InMemoryCardService::new());
    let manager = manager_for(Arc::clone(&service), "alice");

    // Three generations: a <- b <- c.
    let mut previous_id: Option<String> = None;
    let mut cards: Vec<Card> = Vec::new();
    for _ in 0..3 {
        let kp = KeyPair::generate();
        let model = manager
            .generate_raw_card(&kp.private_key, &kp.public_key, previous_id.clone())
            .unwrap();
        let card = manager.publish_card(&model).unwrap();
        previous_id = Some(card.identifier.clone());
        cards.push(card);
    }
    let newest = cards.last().unwrap();

    // One-step resolution.
    let previous = manager.get_previous_card(newest).unwrap().unwrap();
    assert_eq!(previous.identifier, cards[1].identifier);
    assert!(previous.is_outdated);
    assert!(manager.get_previous_card(&cards[0]).unwrap().is_none());

    // Full walk, newest predecessor first.
    let chain = manager
        .previous_chain(newest, keycard_trust::MAX_PREVIOUS_CHAIN_DEPTH)
        .unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].identifier, cards[1].identifier);
    assert_eq!(chain[1].identifier, cards[0].identifier);
    assert!(chain.iter().all(|card| card.is_outdated));

    // The walk refuses to exceed its bound.
    let result = manager.previous_chain(newest, 1);
    assert_matches!(result, Err(CardManagerError::ChainTooDeep { limit: 1 }));
}

#[test]
fn expired_token_forces_reload() {
    struct RefreshingProvider;
    impl AccessTokenProvider for RefreshingProvider {
        fn get_token(&self, force_reload: bool) -> Result<AccessToken, TransportError> {
            if force_reload {
                Ok(AccessToken::new("alice", "fresh", None))
            } else {
                Ok(AccessToken::new(
                    "alice",
                    "stale",
                    Some(Utc::now() - Duration::seconds(60)),
                ))
            }
        }
    }

    struct BearerAssertingService;
    impl CardTransport for BearerAssertingService {
        fn publish(
            &self,
            model: &RawSignedModel,
            bearer: &str,
        ) -> Result<RawSignedModel, TransportError> {
            if bearer != "fresh" {
                return Err(TransportError::new("expired bearer token"));
            }
            Ok(model.clone())
        }
        fn get(&self, _: &str, _: &str) -> Result<RawSignedModel, TransportError> {
            Err(TransportError::new("not implemented"))
        }
        fn search(&self, _: &str, _: &str) -> Result<Vec<RawSignedModel>, TransportError> {
            Err(TransportError::new("not implemented"))
        }
    }

    let manager = CardManager::new(
        crypto(),
        CardVerifier::self_signed_only(crypto()),
        Arc::new(BearerAssertingService),
        Arc::new(RefreshingProvider),
    );
    let kp = KeyPair::generate();
    let model = manager
        .generate_raw_card(&kp.private_key, &kp.public_key, None)
        .unwrap();
    assert!(manager.publish_card(&model).is_ok());
}
