//! HTTP client for the RefDesk cloud API.
//!
//! Provides the `RemoteApi` transport trait used by the sync processor and
//! engine, and its production implementation over reqwest. Tests substitute
//! an in-memory implementation.

use crate::error::AppError;
use crate::models::EntityType;
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Remote client configuration.
#[derive(Debug, Clone)]
pub struct RemoteClientConfig {
    /// Base URL of the sync service (e.g., `https://sync.refdesk.app`).
    pub base_url: String,

    /// Bearer token for authentication.
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RemoteClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

/// One entity document as the remote service represents it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntity {
    pub id: String,

    /// Opaque JSON payload; the service owns the field mapping.
    pub payload: serde_json::Value,

    /// ISO 8601 timestamp of the last remote write.
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Action named by a delta-feed descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// One entry of the delta-changes feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDescriptor {
    pub entity_type: String,
    pub entity_id: String,
    pub action: ChangeAction,

    /// ISO 8601 timestamp of the remote write this describes.
    #[serde(default)]
    pub synced_at: Option<String>,
}

/// Full export of the remote dataset, grouped by collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteExport {
    /// Entities keyed by collection name (`papers`, `tasks`, ...).
    pub collections: HashMap<String, Vec<RemoteEntity>>,

    /// ISO 8601 timestamp the export was taken.
    #[serde(default)]
    pub exported_at: Option<String>,
}

/// Remote transport used by the sync core.
///
/// Create/Update are upsert-style on the remote side and safe to repeat;
/// at-least-once delivery from the queue relies on that.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create an entity (POST to the collection).
    async fn create_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), AppError>;

    /// Update an entity (PUT by id).
    async fn update_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), AppError>;

    /// Delete an entity by id.
    async fn delete_entity(&self, entity_type: EntityType, id: &str) -> Result<(), AppError>;

    /// Fetch one full entity document.
    async fn fetch_entity(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<RemoteEntity, AppError>;

    /// Fetch the delta feed of changes since a Unix-seconds checkpoint.
    async fn changes_since(&self, since: i64) -> Result<Vec<ChangeDescriptor>, AppError>;

    /// Fetch the complete remote dataset.
    async fn full_export(&self) -> Result<RemoteExport, AppError>;
}

/// Production `RemoteApi` implementation over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: Client,
    config: RemoteClientConfig,
}

impl RemoteClient {
    /// Create a new client with the bearer token installed as a default header.
    pub fn new(config: RemoteClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        let token_value = header::HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| AppError::invalid_input("Invalid token format"))?;
        headers.insert(header::AUTHORIZATION, token_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the base URL for API requests.
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v1{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    /// Path to one entity document, with the id URL-encoded.
    fn entity_path(entity_type: EntityType, id: &str) -> String {
        format!("/{}/{}", entity_type.collection(), urlencoding::encode(id))
    }

    /// Handle API response errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)))
        } else {
            Err(Self::error_for_status(status, response, endpoint).await)
        }
    }

    /// Expect only a success status; the body is ignored.
    async fn handle_empty(&self, response: Response, endpoint: &str) -> Result<(), AppError> {
        let status = response.status();

        if status.is_success() {
            Ok(())
        } else {
            Err(Self::error_for_status(status, response, endpoint).await)
        }
    }

    /// Map a non-success response onto the error enum.
    async fn error_for_status(status: StatusCode, response: Response, endpoint: &str) -> AppError {
        if status == StatusCode::UNAUTHORIZED {
            // 401 Unauthorized - token is expired or revoked
            return AppError::session_expired(
                "Sync token expired or revoked. Please sign in again.",
            );
        }

        let status_code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let body_message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                // The service returns errors as {"message": "..."} or {"error": "..."}
                v.get("message")
                    .or_else(|| v.get("error"))
                    .and_then(|m| m.as_str().map(String::from))
            });

        let message = match (status, &body_message) {
            (StatusCode::FORBIDDEN, _) => "Access denied".to_string(),
            (StatusCode::NOT_FOUND, _) => "Resource not found".to_string(),
            (StatusCode::TOO_MANY_REQUESTS, _) => "Rate limit exceeded".to_string(),
            (_, Some(msg)) => msg.clone(),
            _ => format!("Request failed ({}): {}", status_code, body),
        };

        AppError::remote_api_full(message, status_code, endpoint)
    }
}

#[async_trait]
impl RemoteApi for RemoteClient {
    async fn create_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), AppError> {
        let endpoint = format!("/{}", entity_type.collection());
        let url = self.api_url(&endpoint);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "id": id, "payload": payload }))
            .send()
            .await?;

        self.handle_empty(response, &endpoint).await
    }

    async fn update_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), AppError> {
        let endpoint = Self::entity_path(entity_type, id);
        let url = self.api_url(&endpoint);

        let response = self
            .client
            .put(&url)
            .json(&serde_json::json!({ "payload": payload }))
            .send()
            .await?;

        self.handle_empty(response, &endpoint).await
    }

    async fn delete_entity(&self, entity_type: EntityType, id: &str) -> Result<(), AppError> {
        let endpoint = Self::entity_path(entity_type, id);
        let url = self.api_url(&endpoint);

        let response = self.client.delete(&url).send().await?;

        self.handle_empty(response, &endpoint).await
    }

    async fn fetch_entity(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<RemoteEntity, AppError> {
        let endpoint = Self::entity_path(entity_type, id);
        let url = self.api_url(&endpoint);

        let response = self.client.get(&url).send().await?;

        self.handle_response(response, &endpoint).await
    }

    async fn changes_since(&self, since: i64) -> Result<Vec<ChangeDescriptor>, AppError> {
        let endpoint = "/changes";
        let url = self.api_url(endpoint);

        let response = self
            .client
            .get(&url)
            .query(&[("since", since.to_string())])
            .send()
            .await?;

        self.handle_response(response, endpoint).await
    }

    async fn full_export(&self) -> Result<RemoteExport, AppError> {
        let endpoint = "/export";
        let url = self.api_url(endpoint);

        let response = self.client.get(&url).send().await?;

        self.handle_response(response, endpoint).await
    }
}
