use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    TokenRequest(String),

    #[error("callback returned an OAuth error: {error} ({description})")]
    CallbackError { error: String, description: String },

    #[error("no pending authorization in progress")]
    NoPendingAuthorization,

    #[error("no refresh token available to renew the access token")]
    NoRefreshToken,

    #[error("storage error: {0}")]
    Storage(String),
}
