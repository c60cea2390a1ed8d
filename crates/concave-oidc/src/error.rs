use thiserror::Error;

/// OAuth 2.0 error response shape: `{error, error_description}`, surfaced as
/// JSON or appended to the redirect's query string.
#[derive(Debug, Error)]
pub enum OidcError {
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    #[error("invalid_client: {0}")]
    InvalidClient(String),

    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("invalid_scope: {0}")]
    InvalidScope(String),

    #[error("access_denied: {0}")]
    AccessDenied(String),

    #[error("login_required: {0}")]
    LoginRequired(String),

    #[error("consent_required: {0}")]
    ConsentRequired(String),

    #[error("invalid_token: {0}")]
    InvalidToken(String),

    #[error("server_error: {0}")]
    ServerError(String),

    /// Raised from the key manager when no matching key/algorithm is found.
    #[error("token verification failed: {0}")]
    TokenVerification(String),
}

impl OidcError {
    pub fn code(&self) -> &'static str {
        match self {
            OidcError::InvalidRequest(_) => "invalid_request",
            OidcError::InvalidClient(_) => "invalid_client",
            OidcError::InvalidGrant(_) => "invalid_grant",
            OidcError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OidcError::InvalidScope(_) => "invalid_scope",
            OidcError::AccessDenied(_) => "access_denied",
            OidcError::LoginRequired(_) => "login_required",
            OidcError::ConsentRequired(_) => "consent_required",
            OidcError::InvalidToken(_) | OidcError::TokenVerification(_) => "invalid_token",
            OidcError::ServerError(_) => "server_error",
        }
    }

    pub fn description(&self) -> String {
        self.to_string().splitn(2, ": ").nth(1).unwrap_or_default().to_string()
    }
}
