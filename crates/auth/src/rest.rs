use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use cota_sync_core::{AuthUser, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use url::Url;

use crate::{translate_error_code, AuthError, IdentityProvider, ProviderCredential};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RestIdentityConfig {
    pub base_url: Url,
    pub api_key: String,
    pub timeout: Duration,
}

impl RestIdentityConfig {
    #[must_use]
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            base_url,
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
struct SessionTokens {
    id_token: String,
    #[allow(dead_code)] // held for a future token-refresh loop
    refresh_token: Option<String>,
}

/// Identity provider backed by a hosted accounts REST API
/// (`accounts:signInWithPassword`, `accounts:signUp`, `accounts:update`,
/// `accounts:signInWithIdp`). Tokens live only in memory; sign-out drops them
/// locally, the remote identity persists.
pub struct RestIdentityProvider {
    config: RestIdentityConfig,
    http: reqwest::Client,
    tokens: RwLock<Option<SessionTokens>>,
    session: watch::Sender<Option<AuthUser>>,
}

impl RestIdentityProvider {
    #[must_use]
    pub fn new(config: RestIdentityConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let (session, _) = watch::channel(None);

        Self {
            config,
            http,
            tokens: RwLock::new(None),
            session,
        }
    }

    fn endpoint(&self, operation: &str) -> Result<Url, AuthError> {
        let mut url = self
            .config
            .base_url
            .join(&format!("v1/accounts:{operation}"))
            .map_err(|_| AuthError::InvalidResponse)?;
        url.query_pairs_mut().append_pair("key", &self.config.api_key);
        Ok(url)
    }

    async fn call<B: Serialize, R: DeserializeOwned>(
        &self,
        operation: &str,
        body: &B,
    ) -> Result<R, AuthError> {
        let url = self.endpoint(operation)?;
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|error| AuthError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .json::<ErrorEnvelope>()
                .await
                .map_err(|_| AuthError::Status(status.as_u16()))?;
            let code = error_code(&body.error.message);
            return Err(AuthError::Rejected(translate_error_code(code)));
        }

        response
            .json::<R>()
            .await
            .map_err(|_| AuthError::InvalidResponse)
    }

    async fn adopt_session(&self, account: AccountResponse) -> Result<AuthUser, AuthError> {
        let user = account.to_user()?;
        *self.tokens.write().await = Some(SessionTokens {
            id_token: account.id_token.clone(),
            refresh_token: account.refresh_token.clone(),
        });
        self.session.send_replace(Some(user.clone()));
        Ok(user)
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let account: AccountResponse = self
            .call(
                "signInWithPassword",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        self.adopt_session(account).await
    }

    async fn sign_in_with_provider(
        &self,
        credential: ProviderCredential,
    ) -> Result<AuthUser, AuthError> {
        let post_body = format!(
            "id_token={}&providerId={}",
            credential.id_token, credential.provider_id
        );
        let account: AccountResponse = self
            .call(
                "signInWithIdp",
                &IdpRequest {
                    post_body: &post_body,
                    request_uri: "http://localhost",
                    return_secure_token: true,
                },
            )
            .await?;
        self.adopt_session(account).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthUser, AuthError> {
        let account: AccountResponse = self
            .call(
                "signUp",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;

        // The account exists before the profile write; a failed update rejects
        // the whole sign-up so the caller can retry with a session-less state.
        // Without `returnSecureToken` the update answers with profile fields
        // only, no tokens.
        let updated: UpdateProfileResponse = self
            .call(
                "update",
                &UpdateProfileRequest {
                    id_token: &account.id_token,
                    display_name,
                    return_secure_token: false,
                },
            )
            .await?;

        let merged = AccountResponse {
            display_name: updated.display_name.or(Some(display_name.to_owned())),
            ..account
        };
        self.adopt_session(merged).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        // No remote revocation endpoint; dropping the tokens ends the session.
        self.tokens.write().await.take();
        self.session.send_replace(None);
        tracing::debug!("session cleared");
        Ok(())
    }

    fn watch_session(&self) -> watch::Receiver<Option<AuthUser>> {
        self.session.subscribe()
    }

    async fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .map(|tokens| tokens.id_token.clone())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest<'a> {
    post_body: &'a str,
    request_uri: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest<'a> {
    id_token: &'a str,
    display_name: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl AccountResponse {
    fn to_user(&self) -> Result<AuthUser, AuthError> {
        let id = UserId::from_str(&self.local_id).map_err(|_| AuthError::InvalidResponse)?;
        let display_name = self
            .display_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.email.split('@').next().unwrap_or_default().to_owned());
        Ok(AuthUser {
            id,
            email: self.email.clone(),
            display_name,
            photo_url: self.photo_url.clone(),
        })
    }
}

/// `accounts:update` response. With `returnSecureToken: false` the provider
/// answers with profile fields only; no `idToken` is present.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileResponse {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Provider error messages come as `CODE` or `CODE : details`; only the code
/// participates in translation.
fn error_code(message: &str) -> &str {
    message
        .split([' ', ':'])
        .next()
        .unwrap_or(message)
        .trim()
}
