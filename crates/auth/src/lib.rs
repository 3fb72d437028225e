#![forbid(unsafe_code)]

use async_trait::async_trait;
use cota_sync_core::AuthUser;
use tokio::sync::watch;

mod memory;
mod rest;

pub use memory::MemoryIdentityProvider;
pub use rest::{RestIdentityConfig, RestIdentityProvider};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The provider rejected the operation; the message is already translated
    /// for display to the user.
    #[error("{0}")]
    Rejected(String),
    #[error("identity provider unreachable: {0}")]
    Transport(String),
    #[error("identity provider returned status {0}")]
    Status(u16),
    #[error("identity provider returned an unexpected payload")]
    InvalidResponse,
    #[error("no user is signed in")]
    NotSignedIn,
}

/// Credential obtained from a federated sign-in flow run by the host
/// application (the library cannot open a browser popup itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredential {
    pub provider_id: String,
    pub id_token: String,
}

/// Boundary to the hosted identity provider. Session-state changes are
/// published on a watch channel; consumers must never guess session state
/// locally.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;
    async fn sign_in_with_provider(
        &self,
        credential: ProviderCredential,
    ) -> Result<AuthUser, AuthError>;
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthUser, AuthError>;
    /// Best-effort: always clears the local session, even when the remote
    /// call fails.
    async fn sign_out(&self) -> Result<(), AuthError>;
    /// Subscribe to session changes. The receiver observes the current value
    /// immediately.
    fn watch_session(&self) -> watch::Receiver<Option<AuthUser>>;
    /// Bearer token for authorizing document-store calls.
    async fn access_token(&self) -> Option<String>;
}

/// Maps provider error codes to the human-readable messages surfaced to
/// callers. Unknown codes fall back to a generic message rather than leaking
/// raw codes into the UI.
#[must_use]
pub fn translate_error_code(code: &str) -> String {
    let message = match code {
        "EMAIL_NOT_FOUND" => "No account exists with this email.",
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => "Incorrect email or password.",
        "EMAIL_EXISTS" => "An account with this email already exists.",
        "WEAK_PASSWORD" => "Password must be at least 6 characters.",
        "INVALID_EMAIL" => "The email address is not valid.",
        "USER_DISABLED" => "This account has been disabled.",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "Too many attempts. Try again later.",
        "INVALID_IDP_RESPONSE" => "The sign-in provider rejected the request.",
        _ => "Sign-in failed. Please try again.",
    };
    message.to_owned()
}
