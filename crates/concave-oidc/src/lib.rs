//! An authorization-code-with-PKCE OIDC provider: discovery, authorize,
//! token, userinfo, jwks, and logout endpoints, a rotating RSA key manager,
//! and the client/user/code/token/consent/interaction stores behind them.

pub mod error;
pub mod keys;
pub mod pkce;
pub mod server;
pub mod store;
pub mod types;

pub use error::OidcError;
pub use keys::{Jwk, JwkSet, KeyManager};
pub use server::{OidcProvider, OidcProviderConfig};
pub use types::{
    AuthorizationCode, Client, ClientAuthMethod, Consent, GrantType, Interaction, InteractionKind,
    PkceMethod, RefreshToken, User,
};
