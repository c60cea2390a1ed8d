//! Concave: a reactive client for resource APIs with optimistic offline
//! writes, a resumable subscription reconciler, an RSQL-like filter
//! micro-language, and an OIDC authorization-code client to sit in front
//! of it all.
//!
//! The crates compose bottom-up:
//! - [`concave_transport`] is the HTTP/SSE edge.
//! - [`concave_store`] durably queues mutations made while offline.
//! - [`concave_offline`] dedupes, remaps ids, and resolves conflicts for
//!   those mutations once connectivity returns.
//! - [`concave_reconciler`] folds a list fetch and a live event stream into
//!   one ordered snapshot.
//! - [`concave_query`] composes the three into `get_snapshot`/`subscribe`/
//!   `mutate` for a single resource.
//! - [`concave_filter`] builds the query strings the transport sends.
//! - [`concave_oidc`] and [`concave_auth`] are the provider and
//!   relying-party sides of authentication; independent of the rest and
//!   usable standalone.
//!
//! [`Client`] wires transport, offline storage, and auth together for the
//! common case of a single authenticated application talking to one API.

pub use concave_auth as auth;
pub use concave_filter as filter;
pub use concave_offline as offline;
pub use concave_oidc as oidc;
pub use concave_query as query;
pub use concave_reconciler as reconciler;
pub use concave_store as store;
pub use concave_transport as transport;

use std::sync::Arc;

use concave_auth::{AuthClient, AuthClientConfig, InMemoryTokenStore, TokenStore};
use concave_offline::{OfflineManager, OfflineManagerConfig};
use concave_query::LiveQuery;
use concave_store::{MutationStore, VolatileStore};
use concave_transport::{Transport, TransportConfig};

/// Top-level configuration for a [`Client`]: where the API lives, and, if
/// the application authenticates through an OIDC provider, how to reach it.
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub offline: OfflineManagerConfig,
    pub auth: Option<AuthClientConfig>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            transport: TransportConfig::new(base_url),
            offline: OfflineManagerConfig::default(),
            auth: None,
        }
    }

    pub fn with_auth(mut self, auth: AuthClientConfig) -> Self {
        self.auth = Some(auth);
        self
    }
}

/// Ties a [`Transport`], an optional [`OfflineManager`], and an optional
/// [`AuthClient`] together. `live_query` hands out a [`LiveQuery`] per
/// resource, sharing the same transport and offline manager across
/// resources the way a single application session would.
pub struct Client {
    transport: Arc<Transport>,
    offline: Option<OfflineManager>,
    auth: Option<Arc<AuthClient>>,
}

impl Client {
    /// Builds a client with an in-memory mutation store and, if `config.auth`
    /// is set, an in-memory token store bound to the shared transport.
    pub async fn new(config: ClientConfig) -> Self {
        let mutation_store: Arc<dyn MutationStore> = Arc::new(VolatileStore::new());
        Self::with_mutation_store(config, mutation_store, Arc::new(InMemoryTokenStore::new())).await
    }

    pub async fn with_mutation_store(
        config: ClientConfig,
        mutation_store: Arc<dyn MutationStore>,
        token_store: Arc<dyn TokenStore>,
    ) -> Self {
        let transport = Arc::new(Transport::new(config.transport));
        let offline = Some(OfflineManager::new(mutation_store, config.offline));

        let auth = match config.auth {
            Some(auth_config) => {
                let client = Arc::new(AuthClient::new(auth_config, token_store));
                client.bind_transport(transport.clone()).await;
                Some(client)
            }
            None => None,
        };

        Self { transport, offline, auth }
    }

    pub fn transport(&self) -> Arc<Transport> {
        self.transport.clone()
    }

    pub fn offline(&self) -> Option<&OfflineManager> {
        self.offline.as_ref()
    }

    pub fn auth(&self) -> Option<&Arc<AuthClient>> {
        self.auth.as_ref()
    }

    /// Opens a reactive view over a single resource, sharing this client's
    /// transport and offline manager.
    pub fn live_query(&self, resource: impl Into<String>) -> LiveQuery {
        LiveQuery::new(self.transport.clone(), self.offline.clone(), resource)
    }

    /// Ensures the bound transport carries a fresh `Authorization` header,
    /// refreshing the access token first if it is near expiry. A no-op if
    /// the client was built without `auth`.
    pub async fn ensure_authenticated(&self) -> Result<(), concave_auth::AuthError> {
        if let Some(auth) = &self.auth {
            auth.access_token().await?;
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost")
    }
}
