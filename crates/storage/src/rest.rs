use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cota_sync_core::{Space, SpaceId, UserId};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::{NewSpace, SpacePatch, SpaceStore, StoreError, TokenProvider};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

impl RestStoreConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Fixed-token provider for tools and tests.
pub struct StaticTokenProvider(pub Option<String>);

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Hosted document-store client. Documents live under
/// `/v1/users/{owner}/spaces`; writes carry the expected revision in
/// `If-Match` and the store answers every successful write with the stored
/// document.
pub struct RestSpaceStore {
    config: RestStoreConfig,
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl RestSpaceStore {
    #[must_use]
    pub fn new(config: RestStoreConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            http,
            tokens,
        }
    }

    fn collection_url(&self, owner: UserId) -> Result<Url, StoreError> {
        self.config
            .base_url
            .join(&format!("v1/users/{owner}/spaces"))
            .map_err(|_| StoreError::InvalidResponse)
    }

    fn document_url(&self, owner: UserId, id: SpaceId) -> Result<Url, StoreError> {
        self.config
            .base_url
            .join(&format!("v1/users/{owner}/spaces/{id}"))
            .map_err(|_| StoreError::InvalidResponse)
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, StoreError> {
        let token = self
            .tokens
            .access_token()
            .await
            .ok_or(StoreError::Unauthorized)?;
        Ok(request.bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::Unauthorized),
            StatusCode::NOT_FOUND => Err(StoreError::SpaceNotFound),
            StatusCode::CONFLICT => {
                let current = response
                    .json::<ConflictBody>()
                    .await
                    .map(|body| body.current_revision)
                    .unwrap_or(0);
                Err(StoreError::RevisionConflict { current })
            }
            _ => Err(StoreError::Backend(format!("status {}", status.as_u16()))),
        }
    }

    async fn decode_space(response: reqwest::Response) -> Result<Space, StoreError> {
        response
            .json::<Space>()
            .await
            .map_err(|_| StoreError::InvalidResponse)
    }
}

#[async_trait]
impl SpaceStore for RestSpaceStore {
    async fn list_spaces(&self, owner: UserId) -> Result<Vec<Space>, StoreError> {
        let mut url = self.collection_url(owner)?;
        url.query_pairs_mut()
            .append_pair("orderBy", "createdAt")
            .append_pair("direction", "desc");
        let request = self.authorize(self.http.request(Method::GET, url)).await?;
        let response = self.send(request).await?;
        let body = response
            .json::<ListResponse>()
            .await
            .map_err(|_| StoreError::InvalidResponse)?;
        Ok(body.spaces)
    }

    async fn get_space(&self, owner: UserId, id: SpaceId) -> Result<Space, StoreError> {
        let url = self.document_url(owner, id)?;
        let request = self.authorize(self.http.request(Method::GET, url)).await?;
        Self::decode_space(self.send(request).await?).await
    }

    async fn create_space(&self, owner: UserId, draft: NewSpace) -> Result<Space, StoreError> {
        let url = self.collection_url(owner)?;
        let request = self
            .authorize(self.http.request(Method::POST, url).json(&draft))
            .await?;
        Self::decode_space(self.send(request).await?).await
    }

    async fn update_space(
        &self,
        owner: UserId,
        id: SpaceId,
        patch: SpacePatch,
        expected_revision: i64,
    ) -> Result<Space, StoreError> {
        let url = self.document_url(owner, id)?;
        let request = self
            .authorize(
                self.http
                    .request(Method::PATCH, url)
                    .header("If-Match", expected_revision.to_string())
                    .json(&patch),
            )
            .await?;
        Self::decode_space(self.send(request).await?).await
    }

    async fn delete_space(&self, owner: UserId, id: SpaceId) -> Result<(), StoreError> {
        let url = self.document_url(owner, id)?;
        let request = self.authorize(self.http.request(Method::DELETE, url)).await?;
        self.send(request).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    spaces: Vec<Space>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConflictBody {
    current_revision: i64,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use url::Url;

    use super::{RestSpaceStore, RestStoreConfig, StaticTokenProvider};
    use crate::{SpaceStore, StoreError};
    use cota_sync_core::{SpaceId, UserId};

    fn store(token: Option<&str>) -> RestSpaceStore {
        let config =
            RestStoreConfig::new(Url::parse("https://store.example/").expect("base url"));
        RestSpaceStore::new(
            config,
            Arc::new(StaticTokenProvider(token.map(ToOwned::to_owned))),
        )
    }

    #[test]
    fn urls_nest_under_owner() {
        let store = store(Some("t"));
        let owner = UserId::new();
        let id = SpaceId::new();

        let collection = store.collection_url(owner).expect("collection url");
        assert_eq!(collection.path(), format!("/v1/users/{owner}/spaces"));

        let document = store.document_url(owner, id).expect("document url");
        assert_eq!(document.path(), format!("/v1/users/{owner}/spaces/{id}"));
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized_without_network() {
        let store = store(None);
        let owner = UserId::new();
        let error = store.list_spaces(owner).await.expect_err("no token");
        assert_eq!(error, StoreError::Unauthorized);
    }
}
