//! The OIDC relying-party client: discovery, the authorization-code+PKCE
//! round trip, token refresh, and keeping a shared [`Transport`]'s
//! `Authorization` header in sync with the current access token.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use concave_transport::Transport;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::AuthError;
use crate::pkce::PkcePair;
use crate::storage::{TokenSet, TokenStore};

/// How far ahead of the hard expiry `access_token` proactively refreshes.
const REFRESH_SKEW: Duration = Duration::seconds(30);

#[derive(Debug, Clone)]
pub struct AuthClientConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl AuthClientConfig {
    pub fn new(issuer: impl Into<String>, client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            scopes: vec!["openid".to_string()],
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_scopes<I: IntoIterator<Item = S>, S: Into<String>>(mut self, scopes: I) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
struct DiscoveryDocument {
    authorization_endpoint: String,
    token_endpoint: String,
    #[serde(default)]
    userinfo_endpoint: Option<String>,
    #[serde(default)]
    end_session_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// The authorization-request URL plus the state the caller must round-trip
/// through the redirect to look up the pending exchange again.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub nonce: String,
}

struct PendingAuthorization {
    verifier: String,
    redirect_uri: String,
    nonce: String,
}

#[derive(Debug, Deserialize)]
struct IdTokenNonceClaim {
    #[serde(default)]
    nonce: Option<String>,
}

/// Pulls the `nonce` claim out of an ID token without verifying its
/// signature; signature verification happens against the provider's JWKS
/// further up the stack. This only binds the token to the authorization
/// request that produced it.
fn id_token_nonce(id_token: &str) -> Option<String> {
    let payload = id_token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice::<IdTokenNonceClaim>(&decoded).ok()?.nonce
}

pub struct AuthClient {
    config: AuthClientConfig,
    http: reqwest::Client,
    store: Arc<dyn TokenStore>,
    discovery: RwLock<Option<DiscoveryDocument>>,
    pending: RwLock<HashMap<String, PendingAuthorization>>,
    resource_transport: RwLock<Option<Arc<Transport>>>,
}

impl AuthClient {
    pub fn new(config: AuthClientConfig, store: Arc<dyn TokenStore>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            store,
            discovery: RwLock::new(None),
            pending: RwLock::new(HashMap::new()),
            resource_transport: RwLock::new(None),
        }
    }

    /// Registers the resource-API transport whose `Authorization` header
    /// should track this client's current access token.
    pub async fn bind_transport(&self, transport: Arc<Transport>) {
        *self.resource_transport.write().await = Some(transport);
    }

    async fn discovery(&self) -> Result<DiscoveryDocument, AuthError> {
        if let Some(doc) = self.discovery.read().await.clone() {
            return Ok(doc);
        }
        let url = format!("{}/.well-known/openid-configuration", self.config.issuer.trim_end_matches('/'));
        let doc: DiscoveryDocument = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| AuthError::TokenRequest(err.to_string()))?
            .error_for_status()
            .map_err(|err| AuthError::TokenRequest(err.to_string()))?
            .json()
            .await
            .map_err(|err| AuthError::TokenRequest(err.to_string()))?;
        *self.discovery.write().await = Some(doc.clone());
        Ok(doc)
    }

    /// Builds the `/authorize` redirect URL and stashes the PKCE verifier
    /// under its `state` so `handle_callback` can complete the exchange.
    pub async fn start_authorization(&self) -> Result<AuthorizationRequest, AuthError> {
        let doc = self.discovery().await?;
        let pair = PkcePair::generate();

        let mut url = url::Url::parse(&doc.authorization_endpoint)
            .map_err(|err| AuthError::TokenRequest(err.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("scope", &self.config.scopes.join(" "));
            query.append_pair("state", &pair.state);
            query.append_pair("nonce", &pair.nonce);
            query.append_pair("code_challenge", &pair.challenge);
            query.append_pair("code_challenge_method", "S256");
        }

        self.pending.write().await.insert(
            pair.state.clone(),
            PendingAuthorization { verifier: pair.verifier, redirect_uri: self.config.redirect_uri.clone(), nonce: pair.nonce.clone() },
        );

        Ok(AuthorizationRequest { url: url.to_string(), state: pair.state, nonce: pair.nonce })
    }

    /// Completes the round trip after the redirect back from the provider.
    /// `error`/`error_description` being set (the provider rejected the
    /// request, e.g. `access_denied`) takes precedence over a missing code.
    pub async fn handle_callback(
        &self,
        code: Option<&str>,
        state: &str,
        error: Option<&str>,
        error_description: Option<&str>,
    ) -> Result<TokenSet, AuthError> {
        if let Some(error) = error {
            return Err(AuthError::CallbackError {
                error: error.to_string(),
                description: error_description.unwrap_or_default().to_string(),
            });
        }

        let pending = self
            .pending
            .write()
            .await
            .remove(state)
            .ok_or(AuthError::NoPendingAuthorization)?;

        let code = code.ok_or_else(|| AuthError::TokenRequest("callback missing authorization code".to_string()))?;
        let doc = self.discovery().await?;

        let mut form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
            ("redirect_uri".to_string(), pending.redirect_uri),
            ("client_id".to_string(), self.config.client_id.clone()),
            ("code_verifier".to_string(), pending.verifier),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret".to_string(), secret.clone()));
        }

        let tokens = self.exchange(&doc.token_endpoint, &form).await?;

        if let Some(id_token) = &tokens.id_token {
            let claimed = id_token_nonce(id_token);
            if claimed.as_deref() != Some(pending.nonce.as_str()) {
                return Err(AuthError::CallbackError {
                    error: "invalid_nonce".to_string(),
                    description: "id_token nonce did not match the authorization request".to_string(),
                });
            }
        }

        self.store.put(&self.config.issuer, tokens.clone()).await?;
        self.sync_transport(&tokens).await;
        Ok(tokens)
    }

    async fn exchange(&self, token_endpoint: &str, form: &[(String, String)]) -> Result<TokenSet, AuthError> {
        let response = self
            .http
            .post(token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|err| AuthError::TokenRequest(err.to_string()))?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|err| AuthError::TokenRequest(err.to_string()))?;

        if !status.is_success() {
            if let Ok(body) = serde_json::from_slice::<OAuthErrorBody>(&bytes) {
                return Err(AuthError::CallbackError {
                    error: body.error,
                    description: body.error_description.unwrap_or_default(),
                });
            }
            tracing::warn!(%status, "token endpoint rejected the request");
            return Err(AuthError::TokenRequest(format!("token endpoint returned {status}")));
        }

        let parsed: TokenResponse =
            serde_json::from_slice(&bytes).map_err(|err| AuthError::TokenRequest(err.to_string()))?;

        Ok(TokenSet {
            access_token: parsed.access_token,
            id_token: parsed.id_token,
            refresh_token: parsed.refresh_token,
            scope: parsed.scope.unwrap_or_default(),
            expires_at: Utc::now() + Duration::seconds(parsed.expires_in),
        })
    }

    /// Returns a valid access token, transparently refreshing it first if it
    /// is expired or within [`REFRESH_SKEW`] of expiring. Never hands back a
    /// token the caller could use past its expiry.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let current = self.store.get(&self.config.issuer).await?;
        match current {
            Some(tokens) if !tokens.is_expiring_soon(Utc::now(), REFRESH_SKEW) => Ok(tokens.access_token),
            Some(tokens) if tokens.has_refresh_token() => {
                let refreshed = self.refresh(&tokens).await?;
                Ok(refreshed.access_token)
            }
            Some(_) => Err(AuthError::NoRefreshToken),
            None => Err(AuthError::NoPendingAuthorization),
        }
    }

    async fn refresh(&self, current: &TokenSet) -> Result<TokenSet, AuthError> {
        let refresh_token = current.refresh_token.clone().ok_or(AuthError::NoRefreshToken)?;
        let doc = self.discovery().await?;

        let mut form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token),
            ("client_id".to_string(), self.config.client_id.clone()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret".to_string(), secret.clone()));
        }

        let tokens = self.exchange(&doc.token_endpoint, &form).await?;
        self.store.put(&self.config.issuer, tokens.clone()).await?;
        self.sync_transport(&tokens).await;
        Ok(tokens)
    }

    async fn sync_transport(&self, tokens: &TokenSet) {
        if let Some(transport) = self.resource_transport.read().await.as_ref() {
            transport.set_header("Authorization", format!("Bearer {}", tokens.access_token)).await;
        }
    }

    /// Discards the locally held tokens and removes the bearer header from
    /// any bound transport. Does not call the provider's end-session
    /// endpoint; that requires a browser redirect the caller owns.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.store.clear(&self.config.issuer).await?;
        if let Some(transport) = self.resource_transport.read().await.as_ref() {
            transport.remove_header("Authorization").await;
        }
        Ok(())
    }

    /// Whether the tokens last returned from `/token` will expire within
    /// `threshold`, without touching the network.
    pub async fn expires_within(&self, threshold: Duration) -> Result<bool, AuthError> {
        let tokens = self.store.get(&self.config.issuer).await?;
        Ok(match tokens {
            Some(tokens) => tokens.is_expiring_soon(Utc::now(), threshold),
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryTokenStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn discovery_body(server: &MockServer) -> serde_json::Value {
        serde_json::json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "token_endpoint": format!("{}/token", server.uri()),
            "userinfo_endpoint": format!("{}/userinfo", server.uri()),
        })
    }

    /// An unsigned (`alg: none`) JWT carrying only a `nonce` claim, enough to
    /// exercise `id_token_nonce` without a real signing key.
    fn unsigned_id_token_with_nonce(nonce: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "nonce": nonce }).to_string());
        format!("{header}.{payload}.")
    }

    #[tokio::test]
    async fn start_authorization_builds_a_pkce_authorize_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(discovery_body(&server)))
            .mount(&server)
            .await;

        let config = AuthClientConfig::new(server.uri(), "client-1", "https://app.example/callback");
        let client = AuthClient::new(config, Arc::new(InMemoryTokenStore::new()));

        let request = client.start_authorization().await.unwrap();
        assert!(request.url.contains("code_challenge="));
        assert!(request.url.contains("code_challenge_method=S256"));
        assert!(request.url.contains(&format!("state={}", request.state)));
    }

    #[tokio::test]
    async fn handle_callback_rejects_an_unknown_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(discovery_body(&server)))
            .mount(&server)
            .await;

        let config = AuthClientConfig::new(server.uri(), "client-1", "https://app.example/callback");
        let client = AuthClient::new(config, Arc::new(InMemoryTokenStore::new()));

        let result = client.handle_callback(Some("abc"), "never-issued", None, None).await;
        assert!(matches!(result, Err(AuthError::NoPendingAuthorization)));
    }

    #[tokio::test]
    async fn handle_callback_surfaces_provider_errors_before_missing_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(discovery_body(&server)))
            .mount(&server)
            .await;

        let config = AuthClientConfig::new(server.uri(), "client-1", "https://app.example/callback");
        let client = AuthClient::new(config, Arc::new(InMemoryTokenStore::new()));
        let request = client.start_authorization().await.unwrap();

        let result = client
            .handle_callback(None, &request.state, Some("access_denied"), Some("user declined"))
            .await;
        match result {
            Err(AuthError::CallbackError { error, description }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(description, "user declined");
            }
            other => panic!("expected CallbackError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_code_exchange_stores_tokens_and_binds_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(discovery_body(&server)))
            .mount(&server)
            .await;

        let config = AuthClientConfig::new(server.uri(), "client-1", "https://app.example/callback");
        let store = Arc::new(InMemoryTokenStore::new());
        let client = AuthClient::new(config, store.clone());

        let resource = Arc::new(Transport::new(concave_transport::TransportConfig::new("https://api.example")));
        client.bind_transport(resource.clone()).await;

        let request = client.start_authorization().await.unwrap();
        let id_token = unsigned_id_token_with_nonce(&request.nonce);

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-1",
                "refresh_token": "refresh-1",
                "id_token": id_token,
                "scope": "openid profile",
                "token_type": "Bearer",
                "expires_in": 900
            })))
            .mount(&server)
            .await;

        let tokens = client.handle_callback(Some("code-1"), &request.state, None, None).await.unwrap();

        assert_eq!(tokens.access_token, "access-1");
        assert_eq!(store.get(server.uri().as_str()).await.unwrap().unwrap().access_token, "access-1");

        let issued = client.access_token().await.unwrap();
        assert_eq!(issued, "access-1");
    }

    #[tokio::test]
    async fn handle_callback_rejects_an_id_token_with_the_wrong_nonce() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(discovery_body(&server)))
            .mount(&server)
            .await;

        let config = AuthClientConfig::new(server.uri(), "client-1", "https://app.example/callback");
        let client = AuthClient::new(config, Arc::new(InMemoryTokenStore::new()));
        let request = client.start_authorization().await.unwrap();

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-1",
                "id_token": unsigned_id_token_with_nonce("a-different-nonce"),
                "scope": "openid",
                "expires_in": 900
            })))
            .mount(&server)
            .await;

        let result = client.handle_callback(Some("code-1"), &request.state, None, None).await;
        match result {
            Err(AuthError::CallbackError { error, .. }) => assert_eq!(error, "invalid_nonce"),
            other => panic!("expected CallbackError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn access_token_refreshes_when_expiring_soon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(discovery_body(&server)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-2",
                "refresh_token": "refresh-2",
                "scope": "openid",
                "expires_in": 900
            })))
            .mount(&server)
            .await;

        let config = AuthClientConfig::new(server.uri(), "client-1", "https://app.example/callback");
        let store = Arc::new(InMemoryTokenStore::new());
        store
            .put(
                &server.uri(),
                TokenSet {
                    access_token: "stale".to_string(),
                    id_token: None,
                    refresh_token: Some("refresh-1".to_string()),
                    scope: "openid".to_string(),
                    expires_at: Utc::now() + Duration::seconds(5),
                },
            )
            .await
            .unwrap();

        let client = AuthClient::new(config, store.clone());
        let token = client.access_token().await.unwrap();
        assert_eq!(token, "access-2");
    }
}
