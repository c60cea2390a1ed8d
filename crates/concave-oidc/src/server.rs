//! Axum HTTP surface: discovery, authorize, token, userinfo, jwks, logout.
//! Matches the pack's server-shaped repos in reaching for `axum` +
//! `axum-extra`'s cookie jar, with `tower-http` tracing middleware.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::error::OidcError;
use crate::keys::KeyManager;
use crate::pkce;
use crate::store::{ClientStore, CodeStore, ConsentStore, InteractionStore, RefreshTokenStore, UserStore};
use crate::types::{
    AuthorizationCode, Consent, GrantType, Interaction, InteractionKind, PkceMethod, RefreshToken,
    INTERACTION_TTL_MINUTES,
};

#[derive(Debug, Clone)]
pub struct OidcProviderConfig {
    pub issuer: String,
    pub login_ui_url: String,
    pub consent_ui_url: String,
    pub session_cookie_name: String,
    pub access_token_ttl: Duration,
    pub id_token_ttl: Duration,
    pub refresh_token_ttl: Option<Duration>,
    pub code_ttl: Duration,
}

impl OidcProviderConfig {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            login_ui_url: "/ui/login".to_string(),
            consent_ui_url: "/ui/consent".to_string(),
            session_cookie_name: "concave_session".to_string(),
            access_token_ttl: Duration::minutes(15),
            id_token_ttl: Duration::minutes(15),
            refresh_token_ttl: Some(Duration::days(30)),
            code_ttl: Duration::minutes(1),
        }
    }
}

struct Inner {
    config: OidcProviderConfig,
    clients: ClientStore,
    users: UserStore,
    interactions: InteractionStore,
    consents: ConsentStore,
    codes: CodeStore,
    refresh_tokens: RefreshTokenStore,
    sessions: tokio::sync::RwLock<HashMap<String, String>>,
    keys: KeyManager,
}

#[derive(Clone)]
pub struct OidcProvider(Arc<Inner>);

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    iss: String,
    aud: String,
    exp: i64,
    iat: i64,
    scope: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct IdClaims {
    sub: String,
    iss: String,
    aud: String,
    exp: i64,
    iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl OidcProvider {
    pub fn new(config: OidcProviderConfig) -> Result<Self, OidcError> {
        Ok(Self(Arc::new(Inner {
            config,
            clients: ClientStore::new(),
            users: UserStore::new(),
            interactions: InteractionStore::new(),
            consents: ConsentStore::new(),
            codes: CodeStore::new(),
            refresh_tokens: RefreshTokenStore::new(),
            sessions: tokio::sync::RwLock::new(HashMap::new()),
            keys: KeyManager::new()?,
        })))
    }

    pub fn clients(&self) -> &ClientStore {
        &self.0.clients
    }

    pub fn users(&self) -> &UserStore {
        &self.0.users
    }

    pub fn keys(&self) -> &KeyManager {
        &self.0.keys
    }

    /// Resumes a login interaction after the hosting application collects
    /// credentials out-of-band, sets the session cookie, and either finishes
    /// the authorization with a code or continues to the consent step.
    pub async fn complete_login(&self, interaction_id: &str, user_id: &str) -> Result<(Redirect, Cookie<'static>), OidcError> {
        let interaction = self
            .0
            .interactions
            .get(interaction_id)
            .await
            .ok_or_else(|| OidcError::InvalidRequest("unknown or expired interaction".into()))?;
        self.0.interactions.remove(interaction_id).await;

        let session_token = uuid::Uuid::new_v4().to_string();
        self.0.sessions.write().await.insert(session_token.clone(), user_id.to_string());
        let cookie = Cookie::new(self.0.config.session_cookie_name.clone(), session_token);

        let redirect = self.continue_after_authentication(interaction, user_id, false).await?;
        Ok((redirect, cookie))
    }

    /// Resumes a consent interaction once the user has approved a scope set.
    pub async fn complete_consent(
        &self,
        interaction_id: &str,
        user_id: &str,
        granted_scopes: Vec<String>,
    ) -> Result<Redirect, OidcError> {
        let interaction = self
            .0
            .interactions
            .get(interaction_id)
            .await
            .ok_or_else(|| OidcError::InvalidRequest("unknown or expired interaction".into()))?;
        self.0.interactions.remove(interaction_id).await;

        self.0
            .consents
            .grant(Consent {
                user_id: user_id.to_string(),
                client_id: interaction.client_id.clone(),
                scopes: granted_scopes.into_iter().collect(),
                expires_at: None,
            })
            .await;

        self.issue_code_redirect(&interaction, user_id).await
    }

    async fn continue_after_authentication(
        &self,
        interaction: Interaction,
        user_id: &str,
        force_consent: bool,
    ) -> Result<Redirect, OidcError> {
        let existing = self.0.consents.get(user_id, &interaction.client_id).await;
        let covers = existing.map(|c| c.covers(&interaction.scopes, Utc::now())).unwrap_or(false);

        if covers && !force_consent {
            self.issue_code_redirect(&interaction, user_id).await
        } else {
            let consent_interaction = Interaction { kind: InteractionKind::Consent, ..interaction };
            self.0.interactions.insert(consent_interaction.clone()).await;
            Ok(Redirect::to(&format!("{}?interaction={}", self.0.config.consent_ui_url, consent_interaction.id)))
        }
    }

    async fn issue_code_redirect(&self, interaction: &Interaction, user_id: &str) -> Result<Redirect, OidcError> {
        let now = Utc::now();
        let code = AuthorizationCode {
            code: uuid::Uuid::new_v4().simple().to_string(),
            client_id: interaction.client_id.clone(),
            user_id: user_id.to_string(),
            redirect_uri: interaction.redirect_uri.clone(),
            scopes: interaction.scopes.clone(),
            code_challenge: interaction.code_challenge.clone(),
            code_challenge_method: interaction.code_challenge_method,
            nonce: interaction.nonce.clone(),
            issued_at: now,
            expires_at: now + self.0.config.code_ttl,
        };
        self.0.codes.insert(code.clone()).await;

        let mut params = vec![("code", code.code.as_str())];
        if let Some(state) = &interaction.state {
            params.push(("state", state.as_str()));
        }
        let target = append_redirect_params(&interaction.redirect_uri, &params)
            .map_err(|err| OidcError::ServerError(err.to_string()))?;
        Ok(Redirect::to(&target))
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/.well-known/openid-configuration", get(discovery))
            .route("/authorize", get(authorize))
            .route("/token", axum::routing::post(token))
            .route("/userinfo", get(userinfo).post(userinfo))
            .route("/jwks", get(jwks))
            .route("/logout", get(logout))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }
}

async fn discovery(State(provider): State<OidcProvider>) -> Json<Value> {
    let issuer = &provider.0.config.issuer;
    Json(json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/authorize"),
        "token_endpoint": format!("{issuer}/token"),
        "userinfo_endpoint": format!("{issuer}/userinfo"),
        "jwks_uri": format!("{issuer}/jwks"),
        "end_session_endpoint": format!("{issuer}/logout"),
        "response_types_supported": ["code", "code id_token"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "code_challenge_methods_supported": ["S256"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["RS256"],
        "scopes_supported": ["openid", "profile", "email", "offline_access"],
        "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post", "none"],
    }))
}

#[derive(Debug, Deserialize)]
struct AuthorizeParams {
    response_type: String,
    client_id: String,
    redirect_uri: String,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default)]
    code_challenge: Option<String>,
    #[serde(default)]
    code_challenge_method: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
}

async fn authorize(
    State(provider): State<OidcProvider>,
    Query(params): Query<AuthorizeParams>,
    jar: CookieJar,
) -> Result<Response, ErrorResponse> {
    let client = provider
        .0
        .clients
        .get(&params.client_id)
        .await
        .ok_or_else(|| OidcError::InvalidClient("unknown client".into()))?;

    if !client.allows_redirect_uri(&params.redirect_uri) {
        return Err(OidcError::InvalidRequest("redirect_uri not registered for client".into()).into());
    }
    if params.response_type != "code" {
        return Ok(redirect_error(&params.redirect_uri, &params.state, OidcError::InvalidRequest("unsupported response_type".into())));
    }

    let scopes: Vec<String> = params.scope.split_whitespace().map(str::to_string).collect();
    if !client.allows_scopes(&scopes) {
        return Ok(redirect_error(&params.redirect_uri, &params.state, OidcError::InvalidScope("scope not granted to client".into())));
    }

    let method = match params.code_challenge_method.as_deref() {
        Some("S256") => Some(PkceMethod::S256),
        Some(_) => {
            return Ok(redirect_error(&params.redirect_uri, &params.state, OidcError::InvalidRequest("unsupported code_challenge_method".into())));
        }
        None => None,
    };
    if client.requires_pkce() && (params.code_challenge.is_none() || method.is_none()) {
        return Ok(redirect_error(&params.redirect_uri, &params.state, OidcError::InvalidRequest("PKCE required for this client".into())));
    }

    let now = Utc::now();
    let session_user = session_user_id(&provider, &jar).await;
    let force_login = params.prompt.as_deref() == Some("login");

    let user_id = match (session_user, params.prompt.as_deref()) {
        (Some(user_id), _) if !force_login => user_id,
        (None, Some("none")) => {
            return Ok(redirect_error(&params.redirect_uri, &params.state, OidcError::LoginRequired("no active session".into())));
        }
        _ => {
            let interaction = Interaction {
                id: uuid::Uuid::new_v4().to_string(),
                kind: InteractionKind::Login,
                client_id: params.client_id.clone(),
                redirect_uri: params.redirect_uri.clone(),
                scopes: scopes.clone(),
                state: params.state.clone(),
                nonce: params.nonce.clone(),
                code_challenge: params.code_challenge.clone(),
                code_challenge_method: method,
                created_at: now,
                expires_at: now + Duration::minutes(INTERACTION_TTL_MINUTES),
            };
            provider.0.interactions.insert(interaction.clone()).await;
            return Ok(Redirect::to(&format!("{}?interaction={}", provider.0.config.login_ui_url, interaction.id)).into_response());
        }
    };

    let force_consent = params.prompt.as_deref() == Some("consent");
    let interaction = Interaction {
        id: uuid::Uuid::new_v4().to_string(),
        kind: InteractionKind::Consent,
        client_id: params.client_id.clone(),
        redirect_uri: params.redirect_uri.clone(),
        scopes: scopes.clone(),
        state: params.state.clone(),
        nonce: params.nonce.clone(),
        code_challenge: params.code_challenge.clone(),
        code_challenge_method: method,
        created_at: now,
        expires_at: now + Duration::minutes(INTERACTION_TTL_MINUTES),
    };

    match provider.continue_after_authentication(interaction, &user_id, force_consent).await {
        Ok(redirect) => Ok(redirect.into_response()),
        Err(err) => Ok(redirect_error(&params.redirect_uri, &params.state, err)),
    }
}

async fn session_user_id(provider: &OidcProvider, jar: &CookieJar) -> Option<String> {
    let token = jar.get(&provider.0.config.session_cookie_name)?.value().to_string();
    provider.0.sessions.read().await.get(&token).cloned()
}

#[derive(Debug, Deserialize)]
struct TokenForm {
    grant_type: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    redirect_uri: Option<String>,
    #[serde(default)]
    code_verifier: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

async fn token(State(provider): State<OidcProvider>, headers: HeaderMap, axum::Form(form): axum::Form<TokenForm>) -> Result<Json<Value>, ErrorResponse> {
    let (client_id, client_secret) = client_credentials(&headers, &form)?;
    let client = provider
        .0
        .clients
        .get(&client_id)
        .await
        .ok_or_else(|| OidcError::InvalidClient("unknown client".into()))?;
    authenticate_client(&client, client_secret.as_deref())?;

    match form.grant_type.as_str() {
        "authorization_code" => authorization_code_grant(&provider, &client, form).await.map(Json),
        "refresh_token" => refresh_token_grant(&provider, &client, form).await.map(Json),
        // Only authorization_code/refresh_token are supported; every other
        // grant, including client_credentials, falls here rather than a wildcard
        // so this can never silently drift from the discovery document's list.
        "client_credentials" => Err(OidcError::UnsupportedGrantType("client_credentials is not supported".into()).into()),
        other => Err(OidcError::UnsupportedGrantType(format!("unsupported grant_type: {other}")).into()),
    }
}

fn client_credentials(headers: &HeaderMap, form: &TokenForm) -> Result<(String, Option<String>), ErrorResponse> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = auth.to_str() {
            if let Some(encoded) = value.strip_prefix("Basic ") {
                let decoded = STANDARD
                    .decode(encoded)
                    .map_err(|_| OidcError::InvalidClient("malformed Basic auth".into()))?;
                let decoded = String::from_utf8(decoded).map_err(|_| OidcError::InvalidClient("malformed Basic auth".into()))?;
                if let Some((id, secret)) = decoded.split_once(':') {
                    return Ok((id.to_string(), Some(secret.to_string())));
                }
            }
        }
    }

    let client_id = form.client_id.clone().ok_or_else(|| OidcError::InvalidClient("missing client_id".into()))?;
    Ok((client_id, form.client_secret.clone()))
}

fn authenticate_client(client: &crate::types::Client, secret: Option<&str>) -> Result<(), OidcError> {
    match &client.client_secret {
        Some(expected) => {
            if secret == Some(expected.as_str()) {
                Ok(())
            } else {
                Err(OidcError::InvalidClient("client secret mismatch".into()))
            }
        }
        None => Ok(()),
    }
}

async fn authorization_code_grant(provider: &OidcProvider, client: &crate::types::Client, form: TokenForm) -> Result<Value, ErrorResponse> {
    let code_value = form.code.ok_or_else(|| OidcError::InvalidRequest("missing code".into()))?;

    // Deleted unconditionally on first lookup, regardless of outcome, to prevent replay.
    let code = provider.0.codes.take(&code_value).await.ok_or_else(|| OidcError::InvalidGrant("unknown or already-used code".into()))?;

    if code.client_id != client.client_id {
        return Err(OidcError::InvalidGrant("code was not issued to this client".into()).into());
    }
    if Some(code.redirect_uri.as_str()) != form.redirect_uri.as_deref() {
        return Err(OidcError::InvalidGrant("redirect_uri mismatch".into()).into());
    }
    if code.is_expired(Utc::now()) {
        return Err(OidcError::InvalidGrant("code expired".into()).into());
    }
    if let (Some(challenge), Some(method)) = (&code.code_challenge, code.code_challenge_method) {
        let verifier = form.code_verifier.ok_or_else(|| OidcError::InvalidGrant("missing code_verifier".into()))?;
        if !pkce::verify(&verifier, challenge, method) {
            return Err(OidcError::InvalidGrant("PKCE verification failed".into()).into());
        }
    }

    issue_token_set(provider, &code.client_id, &code.user_id, &code.scopes, code.nonce.as_deref()).await
}

async fn refresh_token_grant(provider: &OidcProvider, client: &crate::types::Client, form: TokenForm) -> Result<Value, ErrorResponse> {
    let token_value = form.refresh_token.ok_or_else(|| OidcError::InvalidRequest("missing refresh_token".into()))?;
    let existing = provider.0.refresh_tokens.get(&token_value).await.ok_or_else(|| OidcError::InvalidGrant("unknown refresh_token".into()))?;

    if existing.client_id != client.client_id {
        return Err(OidcError::InvalidGrant("refresh_token was not issued to this client".into()).into());
    }
    if existing.is_expired(Utc::now()) {
        provider.0.refresh_tokens.revoke(&token_value).await;
        return Err(OidcError::InvalidGrant("refresh_token expired".into()).into());
    }

    let scopes = match &form.scope {
        Some(requested) => {
            let requested: Vec<String> = requested.split_whitespace().map(str::to_string).collect();
            if !requested.iter().all(|s| existing.scopes.contains(s)) {
                return Err(OidcError::InvalidScope("cannot widen scope on refresh".into()).into());
            }
            requested
        }
        None => existing.scopes.clone(),
    };

    // Rotate by default: the old token is revoked once the new set is issued.
    provider.0.refresh_tokens.revoke(&token_value).await;
    issue_token_set(provider, &existing.client_id, &existing.user_id, &scopes, None).await
}

async fn issue_token_set(
    provider: &OidcProvider,
    client_id: &str,
    user_id: &str,
    scopes: &[String],
    nonce: Option<&str>,
) -> Result<Value, ErrorResponse> {
    let now = Utc::now();
    let (kid, encoding_key) = provider.0.keys.encoding_key().await;
    let mut header = Header::new(provider.0.keys.algorithm());
    header.kid = Some(kid);

    let access_exp = now + provider.0.config.access_token_ttl;
    let access_claims = AccessClaims {
        sub: user_id.to_string(),
        iss: provider.0.config.issuer.clone(),
        aud: client_id.to_string(),
        exp: access_exp.timestamp(),
        iat: now.timestamp(),
        scope: scopes.join(" "),
    };
    let access_token = encode(&header, &access_claims, &encoding_key).map_err(|err| OidcError::ServerError(err.to_string()))?;

    let mut body = json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": provider.0.config.access_token_ttl.num_seconds(),
        "scope": scopes.join(" "),
    });

    if scopes.iter().any(|s| s == "openid") {
        let user = provider.0.users.get(user_id).await;
        let id_claims = IdClaims {
            sub: user_id.to_string(),
            iss: provider.0.config.issuer.clone(),
            aud: client_id.to_string(),
            exp: (now + provider.0.config.id_token_ttl).timestamp(),
            iat: now.timestamp(),
            nonce: nonce.map(str::to_string),
            email: user.as_ref().map(|u| u.email.clone()),
            email_verified: user.as_ref().map(|u| u.email_verified),
            name: user.as_ref().and_then(|u| u.name.clone()),
        };
        let id_token = encode(&header, &id_claims, &encoding_key).map_err(|err| OidcError::ServerError(err.to_string()))?;
        body["id_token"] = json!(id_token);
    }

    if scopes.iter().any(|s| s == "offline_access") {
        let refresh_token = RefreshToken {
            token: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scopes: scopes.to_vec(),
            issued_at: now,
            expires_at: provider.0.config.refresh_token_ttl.map(|ttl| now + ttl),
        };
        provider.0.refresh_tokens.insert(refresh_token.clone()).await;
        body["refresh_token"] = json!(refresh_token.token);
    }

    Ok(body)
}

async fn userinfo(State(provider): State<OidcProvider>, headers: HeaderMap) -> Result<Json<Value>, ErrorResponse> {
    let token = bearer_token(&headers).ok_or_else(|| OidcError::InvalidToken("missing bearer token".into()))?;
    let header = decode_header(&token).map_err(|err| OidcError::InvalidToken(err.to_string()))?;
    let decoding_key = provider.0.keys.decoding_key_for(header.kid.as_deref()).await?;

    let mut validation = Validation::new(provider.0.keys.algorithm());
    validation.set_audience(&[] as &[&str]);
    validation.validate_aud = false;
    let claims = decode::<AccessClaims>(&token, &decoding_key, &validation).map_err(|err| OidcError::InvalidToken(err.to_string()))?.claims;

    let user = provider.0.users.get(&claims.sub).await.ok_or_else(|| OidcError::InvalidToken("unknown subject".into()))?;
    let granted: Vec<&str> = claims.scope.split_whitespace().collect();

    let mut response = json!({ "sub": user.id });
    if granted.contains(&"profile") {
        if let Some(name) = &user.name {
            response["name"] = json!(name);
        }
    }
    if granted.contains(&"email") {
        response["email"] = json!(user.email);
        response["email_verified"] = json!(user.email_verified);
    }
    if let Value::Object(extra) = &user.extra_claims {
        if let Value::Object(response_map) = &mut response {
            for (key, value) in extra {
                response_map.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    Ok(Json(response))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn jwks(State(provider): State<OidcProvider>) -> Response {
    let jwks = provider.0.keys.jwks().await;
    let mut response = Json(jwks).into_response();
    response
        .headers_mut()
        .insert(axum::http::header::CACHE_CONTROL, "public, max-age=3600".parse().unwrap());
    response
}

#[derive(Debug, Deserialize)]
struct LogoutParams {
    #[serde(default)]
    post_logout_redirect_uri: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
}

async fn logout(State(provider): State<OidcProvider>, Query(params): Query<LogoutParams>, jar: CookieJar) -> Result<(CookieJar, Redirect), ErrorResponse> {
    let user_id = session_user_id(&provider, &jar).await;
    let cookie_name = provider.0.config.session_cookie_name.clone();
    let jar = jar.remove(Cookie::from(cookie_name));

    if let Some(user_id) = &user_id {
        provider.0.refresh_tokens.revoke_for_user(user_id).await;
    }

    let target = match (&params.post_logout_redirect_uri, &params.client_id) {
        (Some(uri), Some(client_id)) => {
            let client = provider.0.clients.get(client_id).await.ok_or_else(|| OidcError::InvalidClient("unknown client".into()))?;
            if !client.allows_post_logout_redirect_uri(uri) {
                return Err(OidcError::InvalidRequest("post_logout_redirect_uri not registered".into()).into());
            }
            uri.clone()
        }
        (Some(uri), None) => uri.clone(),
        _ => "/".to_string(),
    };

    Ok((jar, Redirect::to(&target)))
}

/// Wraps an `OidcError` as a JSON OAuth 2.0 error response.
#[derive(Debug)]
struct ErrorResponse(OidcError);

impl From<OidcError> for ErrorResponse {
    fn from(err: OidcError) -> Self {
        ErrorResponse(err)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.0 {
            OidcError::InvalidClient(_) | OidcError::InvalidToken(_) | OidcError::TokenVerification(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.0.code(), "error_description": self.0.description() }))).into_response()
    }
}

/// Appends `params` to `base`'s query string, percent-encoding keys and
/// values the way `url` does for any reserved characters they carry.
fn append_redirect_params(base: &str, params: &[(&str, &str)]) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(base)?;
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }
    Ok(url.into())
}

/// Builds a redirect back to the client carrying the OAuth 2.0 error shape
/// as query parameters, per the authorize endpoint's error contract.
fn redirect_error(redirect_uri: &str, state: &Option<String>, err: OidcError) -> Response {
    tracing::warn!(redirect_uri, error = %err, "authorize request rejected");
    let description = err.description();
    let mut params = vec![("error", err.code()), ("error_description", description.as_str())];
    if let Some(state) = state.as_deref() {
        params.push(("state", state));
    }
    match append_redirect_params(redirect_uri, &params) {
        Ok(target) => Redirect::to(&target).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, Json(json!({ "error": err.code(), "error_description": description }))).into_response(),
    }
}
