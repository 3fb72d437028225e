use std::collections::HashMap;

use async_trait::async_trait;
use cota_sync_core::{AuthUser, UserId};
use tokio::sync::{watch, RwLock};

use crate::{translate_error_code, AuthError, IdentityProvider, ProviderCredential};

#[derive(Debug, Clone)]
struct MemoryAccount {
    password: String,
    user: AuthUser,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, MemoryAccount>,
    federated: Option<AuthUser>,
}

/// In-process identity provider for tests and offline development. Accounts
/// live in a map keyed by email; the federated flow returns a pre-configured
/// user.
pub struct MemoryIdentityProvider {
    state: RwLock<MemoryState>,
    session: watch::Sender<Option<AuthUser>>,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            state: RwLock::new(MemoryState::default()),
            session,
        }
    }

    /// Configure the user returned by `sign_in_with_provider`.
    pub async fn set_federated_user(&self, user: AuthUser) {
        self.state.write().await.federated = Some(user);
    }

    pub async fn seed_account(&self, email: &str, password: &str, display_name: &str) -> AuthUser {
        let user = AuthUser {
            id: UserId::new(),
            email: email.to_owned(),
            display_name: display_name.to_owned(),
            photo_url: None,
        };
        self.state.write().await.accounts.insert(
            email.to_owned(),
            MemoryAccount {
                password: password.to_owned(),
                user: user.clone(),
            },
        );
        user
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let state = self.state.read().await;
        let account = state
            .accounts
            .get(email)
            .ok_or_else(|| AuthError::Rejected(translate_error_code("EMAIL_NOT_FOUND")))?;
        if account.password != password {
            return Err(AuthError::Rejected(translate_error_code("INVALID_PASSWORD")));
        }
        let user = account.user.clone();
        drop(state);

        self.session.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in_with_provider(
        &self,
        _credential: ProviderCredential,
    ) -> Result<AuthUser, AuthError> {
        let federated = self.state.read().await.federated.clone();
        let user = federated
            .ok_or_else(|| AuthError::Rejected(translate_error_code("INVALID_IDP_RESPONSE")))?;
        self.session.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthUser, AuthError> {
        if password.len() < 6 {
            return Err(AuthError::Rejected(translate_error_code("WEAK_PASSWORD")));
        }

        let mut state = self.state.write().await;
        if state.accounts.contains_key(email) {
            return Err(AuthError::Rejected(translate_error_code("EMAIL_EXISTS")));
        }
        let user = AuthUser {
            id: UserId::new(),
            email: email.to_owned(),
            display_name: display_name.to_owned(),
            photo_url: None,
        };
        state.accounts.insert(
            email.to_owned(),
            MemoryAccount {
                password: password.to_owned(),
                user: user.clone(),
            },
        );
        drop(state);

        self.session.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.session.send_replace(None);
        Ok(())
    }

    fn watch_session(&self) -> watch::Receiver<Option<AuthUser>> {
        self.session.subscribe()
    }

    async fn access_token(&self) -> Option<String> {
        self.session
            .borrow()
            .as_ref()
            .map(|user| format!("memory-token-{}", user.id))
    }
}
