//! An OIDC relying-party client: the authorization-code-with-PKCE round
//! trip, transparent access-token refresh, and pluggable token storage.

pub mod client;
pub mod error;
pub mod pkce;
pub mod storage;

pub use client::{AuthClient, AuthClientConfig, AuthorizationRequest};
pub use error::AuthError;
pub use pkce::PkcePair;
pub use storage::{InMemoryTokenStore, TokenSet, TokenStore};
