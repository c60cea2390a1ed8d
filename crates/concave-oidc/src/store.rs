//! In-memory stores for clients, users, interactions, consents, auth codes,
//! and refresh tokens. Each store is independently lockable so the server
//! handlers never hold more than one lock at a time.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::types::{AuthorizationCode, Client, Consent, Interaction, RefreshToken, User};

#[derive(Default)]
pub struct ClientStore {
    clients: RwLock<HashMap<String, Client>>,
}

impl ClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, client: Client) {
        self.clients.write().await.insert(client.client_id.clone(), client);
    }

    pub async fn get(&self, client_id: &str) -> Option<Client> {
        self.clients.read().await.get(client_id).cloned()
    }
}

#[derive(Default)]
pub struct UserStore {
    users: RwLock<HashMap<String, User>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, user: User) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    pub async fn get(&self, id: &str) -> Option<User> {
        self.users.read().await.get(id).cloned()
    }
}

#[derive(Default)]
pub struct InteractionStore {
    interactions: RwLock<HashMap<String, Interaction>>,
}

impl InteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, interaction: Interaction) {
        self.interactions.write().await.insert(interaction.id.clone(), interaction);
    }

    /// Looks up an interaction without consuming it, pruning it first if expired.
    pub async fn get(&self, id: &str) -> Option<Interaction> {
        let now = Utc::now();
        let mut interactions = self.interactions.write().await;
        match interactions.get(id) {
            Some(interaction) if interaction.is_expired(now) => {
                interactions.remove(id);
                None
            }
            Some(interaction) => Some(interaction.clone()),
            None => None,
        }
    }

    pub async fn remove(&self, id: &str) {
        self.interactions.write().await.remove(id);
    }
}

#[derive(Default)]
pub struct ConsentStore {
    consents: RwLock<HashMap<(String, String), Consent>>,
}

impl ConsentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, user_id: &str, client_id: &str) -> Option<Consent> {
        self.consents.read().await.get(&(user_id.to_string(), client_id.to_string())).cloned()
    }

    pub async fn grant(&self, consent: Consent) {
        let key = (consent.user_id.clone(), consent.client_id.clone());
        self.consents.write().await.insert(key, consent);
    }
}

/// Authorization codes are single-use: `take` removes the entry unconditionally
/// on first lookup, regardless of whether subsequent validation succeeds, to
/// prevent replay.
#[derive(Default)]
pub struct CodeStore {
    codes: RwLock<HashMap<String, AuthorizationCode>>,
}

impl CodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, code: AuthorizationCode) {
        self.codes.write().await.insert(code.code.clone(), code);
    }

    pub async fn take(&self, code: &str) -> Option<AuthorizationCode> {
        self.codes.write().await.remove(code)
    }
}

#[derive(Default)]
pub struct RefreshTokenStore {
    tokens: RwLock<HashMap<String, RefreshToken>>,
}

impl RefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, token: RefreshToken) {
        self.tokens.write().await.insert(token.token.clone(), token);
    }

    pub async fn get(&self, token: &str) -> Option<RefreshToken> {
        self.tokens.read().await.get(token).cloned()
    }

    pub async fn revoke(&self, token: &str) {
        self.tokens.write().await.remove(token);
    }

    /// Deletes every refresh token owned by a user, used on logout.
    pub async fn revoke_for_user(&self, user_id: &str) {
        self.tokens.write().await.retain(|_, token| token.user_id != user_id);
    }
}
