use chrono::{DateTime, Utc};
use keycard_types::RawSignedModel;
use thiserror::Error;

/// Opaque transport failure, surfaced unchanged through the manager.
#[derive(Debug, Clone, Error)]
#[error("card service transport failed: {message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A bearer access token scoped to one identity.
#[derive(Debug, Clone)]
pub struct AccessToken {
    identity: String,
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(
        identity: impl Into<String>,
        token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            identity: identity.into(),
            token: token.into(),
            expires_at,
        }
    }

    /// The identity this token is issued for; newly generated cards bind it.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The string form passed as the bearer credential.
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |at| at <= Utc::now())
    }
}

/// Source of access tokens for transport calls.
///
/// `force_reload` asks the provider to discard any cached token and fetch a
/// fresh one; the manager sets it after a cached token reports expired.
pub trait AccessTokenProvider: Send + Sync {
    fn get_token(&self, force_reload: bool) -> Result<AccessToken, TransportError>;
}

/// Provider returning one fixed token, for tests and short-lived tools.
#[derive(Debug, Clone)]
pub struct ConstAccessTokenProvider {
    token: AccessToken,
}

impl ConstAccessTokenProvider {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

impl AccessTokenProvider for ConstAccessTokenProvider {
    fn get_token(&self, _force_reload: bool) -> Result<AccessToken, TransportError> {
        Ok(self.token.clone())
    }
}

/// Blocking transport to the card service.
///
/// The core performs no retries and sets no timeouts; both belong to the
/// implementation behind this trait.
pub trait CardTransport: Send + Sync {
    /// Submit an envelope; the service echoes it back, possibly with an
    /// added platform signature.
    fn publish(
        &self,
        model: &RawSignedModel,
        bearer: &str,
    ) -> Result<RawSignedModel, TransportError>;

    /// Fetch one envelope by card identifier.
    fn get(&self, card_id: &str, bearer: &str) -> Result<RawSignedModel, TransportError>;

    /// Fetch every envelope bound to an identity.
    fn search(
        &self,
        identity: &str,
        bearer: &str,
    ) -> Result<Vec<RawSignedModel>, TransportError>;
}
