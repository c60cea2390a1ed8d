//! Pluggable token storage. The default in-memory store is enough for a
//! single-process client; a persistent implementation just needs to satisfy
//! [`TokenStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AuthError;

/// The token set issued by a provider's `/token` endpoint, plus enough to
/// know when the access token needs renewing without re-decoding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// An "expiring soon" helper so callers can refresh
    /// proactively instead of racing the exact expiry instant.
    pub fn is_expiring_soon(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now + threshold >= self.expires_at
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// A storage backend keyed by issuer. Implementations must never hand back
/// an expired access token: `get` returning `Some` is a promise the caller
/// can use the token as-is.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, issuer: &str) -> Result<Option<TokenSet>, AuthError>;
    async fn put(&self, issuer: &str, tokens: TokenSet) -> Result<(), AuthError>;
    async fn clear(&self, issuer: &str) -> Result<(), AuthError>;
}

/// An in-process store with no persistence across restarts.
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, TokenSet>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, issuer: &str) -> Result<Option<TokenSet>, AuthError> {
        Ok(self.tokens.read().await.get(issuer).cloned())
    }

    async fn put(&self, issuer: &str, tokens: TokenSet) -> Result<(), AuthError> {
        self.tokens.write().await.insert(issuer.to_string(), tokens);
        Ok(())
    }

    async fn clear(&self, issuer: &str) -> Result<(), AuthError> {
        self.tokens.write().await.remove(issuer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(expires_at: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: "at".to_string(),
            id_token: None,
            refresh_token: Some("rt".to_string()),
            scope: "openid profile".to_string(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn round_trips_a_token_set() {
        let store = InMemoryTokenStore::new();
        let tokens = sample(Utc::now() + Duration::minutes(5));
        store.put("https://idp.example", tokens.clone()).await.unwrap();
        assert_eq!(store.get("https://idp.example").await.unwrap(), Some(tokens));
    }

    #[tokio::test]
    async fn clear_removes_the_entry() {
        let store = InMemoryTokenStore::new();
        store.put("https://idp.example", sample(Utc::now())).await.unwrap();
        store.clear("https://idp.example").await.unwrap();
        assert_eq!(store.get("https://idp.example").await.unwrap(), None);
    }

    #[test]
    fn expiring_soon_triggers_before_the_hard_expiry() {
        let tokens = sample(Utc::now() + Duration::seconds(30));
        assert!(tokens.is_expiring_soon(Utc::now(), Duration::minutes(1)));
        assert!(!tokens.is_expired(Utc::now()));
    }
}
