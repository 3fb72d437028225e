#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cota_sync_auth::{IdentityProvider, RestIdentityConfig, RestIdentityProvider};
use cota_sync_client::{RetryPolicy, SyncClient, SyncOptions, WriteFailurePolicy};
use cota_sync_media::{MediaClient, MediaConfig};
use cota_sync_storage::{RestSpaceStore, RestStoreConfig, TokenProvider};
use url::Url;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub identity_url: Url,
    pub identity_api_key: String,
    pub store_url: Url,
    pub media_cloud_name: String,
    pub media_upload_preset: String,
    pub media_folder: String,
    pub write_failure_policy: WriteFailurePolicy,
    pub retry: RetryPolicy,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_values(
            std::env::var("IDENTITY_URL").ok(),
            std::env::var("IDENTITY_API_KEY").ok(),
            std::env::var("STORE_URL").ok(),
            std::env::var("MEDIA_CLOUD_NAME").ok(),
            std::env::var("MEDIA_UPLOAD_PRESET").ok(),
            std::env::var("MEDIA_FOLDER").ok(),
            std::env::var("WRITE_FAILURE_POLICY").ok(),
            std::env::var("RETRY_MAX_ATTEMPTS").ok(),
            std::env::var("RETRY_BASE_DELAY_MS").ok(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn from_values(
        identity_url: Option<String>,
        identity_api_key: Option<String>,
        store_url: Option<String>,
        media_cloud_name: Option<String>,
        media_upload_preset: Option<String>,
        media_folder: Option<String>,
        write_failure_policy: Option<String>,
        retry_max_attempts: Option<String>,
        retry_base_delay_ms: Option<String>,
    ) -> anyhow::Result<Self> {
        let identity_url = parse_https_url(identity_url, "IDENTITY_URL")?;
        let identity_api_key =
            identity_api_key.ok_or_else(|| anyhow::anyhow!("IDENTITY_API_KEY must be set"))?;
        let store_url = parse_https_url(store_url, "STORE_URL")?;
        let media_cloud_name =
            media_cloud_name.ok_or_else(|| anyhow::anyhow!("MEDIA_CLOUD_NAME must be set"))?;
        let media_upload_preset =
            media_upload_preset.ok_or_else(|| anyhow::anyhow!("MEDIA_UPLOAD_PRESET must be set"))?;
        let media_folder = media_folder.unwrap_or_else(|| "cota".to_owned());

        Ok(Self {
            identity_url,
            identity_api_key,
            store_url,
            media_cloud_name,
            media_upload_preset,
            media_folder,
            write_failure_policy: parse_write_failure_policy(write_failure_policy)?,
            retry: parse_retry(retry_max_attempts, retry_base_delay_ms)?,
        })
    }
}

/// Assembled application: the sync client plus the media uploader. Construct
/// inside a tokio runtime; the sync client spawns its session listener.
pub struct App {
    pub identity: Arc<RestIdentityProvider>,
    pub client: Arc<SyncClient>,
    pub media: MediaClient,
}

pub fn build(config: &AppConfig) -> App {
    let identity = Arc::new(RestIdentityProvider::new(RestIdentityConfig::new(
        config.identity_url.clone(),
        config.identity_api_key.clone(),
    )));
    let tokens = Arc::new(IdentityTokens(identity.clone()));
    let store = Arc::new(RestSpaceStore::new(
        RestStoreConfig::new(config.store_url.clone()),
        tokens,
    ));
    let client = SyncClient::spawn(
        identity.clone(),
        store,
        SyncOptions {
            write_failure_policy: config.write_failure_policy,
            retry: config.retry,
        },
    );
    let media = MediaClient::new(MediaConfig::new(
        config.media_cloud_name.clone(),
        config.media_upload_preset.clone(),
        config.media_folder.clone(),
    ));

    App {
        identity,
        client,
        media,
    }
}

/// Adapts the identity provider's session token to the store's narrow
/// token seam.
struct IdentityTokens(Arc<RestIdentityProvider>);

#[async_trait]
impl TokenProvider for IdentityTokens {
    async fn access_token(&self) -> Option<String> {
        self.0.access_token().await
    }
}

fn parse_https_url(value: Option<String>, name: &str) -> anyhow::Result<Url> {
    let raw = value.ok_or_else(|| anyhow::anyhow!("{name} must be set"))?;
    let url = Url::parse(&raw).map_err(|error| anyhow::anyhow!("invalid {name} {raw:?}: {error}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow::anyhow!("invalid {name} {raw:?}: must use http or https"));
    }
    Ok(url)
}

fn parse_write_failure_policy(value: Option<String>) -> anyhow::Result<WriteFailurePolicy> {
    match value.as_deref() {
        None | Some("surface") => Ok(WriteFailurePolicy::Surface),
        Some("log") => Ok(WriteFailurePolicy::LogAndContinue),
        Some(other) => Err(anyhow::anyhow!(
            "invalid WRITE_FAILURE_POLICY {other:?}: expected \"surface\" or \"log\""
        )),
    }
}

fn parse_retry(
    max_attempts: Option<String>,
    base_delay_ms: Option<String>,
) -> anyhow::Result<RetryPolicy> {
    let defaults = RetryPolicy::default();
    let max_attempts = match max_attempts {
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|value| *value >= 1)
            .ok_or_else(|| anyhow::anyhow!("invalid RETRY_MAX_ATTEMPTS {raw:?}"))?,
        None => defaults.max_attempts,
    };
    let base_delay = match base_delay_ms {
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| anyhow::anyhow!("invalid RETRY_BASE_DELAY_MS {raw:?}"))?,
        None => defaults.base_delay,
    };
    Ok(RetryPolicy {
        max_attempts,
        base_delay,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cota_sync_client::WriteFailurePolicy;

    use super::AppConfig;

    fn base_values() -> [Option<String>; 9] {
        [
            Some("https://identity.example".to_owned()),
            Some("key-123".to_owned()),
            Some("https://store.example".to_owned()),
            Some("demo".to_owned()),
            Some("cota_upload".to_owned()),
            None,
            None,
            None,
            None,
        ]
    }

    fn config_from(values: [Option<String>; 9]) -> anyhow::Result<AppConfig> {
        let [a, b, c, d, e, f, g, h, i] = values;
        AppConfig::from_values(a, b, c, d, e, f, g, h, i)
    }

    #[test]
    fn from_values_applies_defaults() {
        let config = config_from(base_values()).expect("parse config");
        assert_eq!(config.media_folder, "cota");
        assert_eq!(config.write_failure_policy, WriteFailurePolicy::Surface);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(100));
    }

    #[test]
    fn from_values_requires_identity_url() {
        let mut values = base_values();
        values[0] = None;
        let error = config_from(values).expect_err("missing IDENTITY_URL");
        assert!(error.to_string().contains("IDENTITY_URL"));
    }

    #[test]
    fn from_values_rejects_non_http_urls() {
        let mut values = base_values();
        values[2] = Some("ftp://store.example".to_owned());
        let error = config_from(values).expect_err("invalid scheme");
        assert!(error.to_string().contains("STORE_URL"));
    }

    #[test]
    fn from_values_parses_log_policy() {
        let mut values = base_values();
        values[6] = Some("log".to_owned());
        let config = config_from(values).expect("parse config");
        assert_eq!(config.write_failure_policy, WriteFailurePolicy::LogAndContinue);
    }

    #[test]
    fn from_values_rejects_unknown_policy() {
        let mut values = base_values();
        values[6] = Some("ignore".to_owned());
        let error = config_from(values).expect_err("invalid policy");
        assert!(error.to_string().contains("WRITE_FAILURE_POLICY"));
    }

    #[test]
    fn from_values_parses_retry_overrides() {
        let mut values = base_values();
        values[7] = Some("5".to_owned());
        values[8] = Some("250".to_owned());
        let config = config_from(values).expect("parse config");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn from_values_rejects_zero_attempts() {
        let mut values = base_values();
        values[7] = Some("0".to_owned());
        let error = config_from(values).expect_err("zero attempts");
        assert!(error.to_string().contains("RETRY_MAX_ATTEMPTS"));
    }
}
