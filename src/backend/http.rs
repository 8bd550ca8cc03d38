use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;

use super::{ByteStream, ConversationStarted, GenerateBackend, GenerateRequest, ModelStatus};
use crate::error::TurnError;

/// reqwest-based client for the inference backend's HTTP API.
///
/// `reqwest::Client` is cheaply cloneable and pools connections, so one
/// instance serves the whole process.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ── Conversation endpoints ──────────────────────────────────

    /// `POST /conversation/start` → new server-side session id.
    pub async fn start_conversation(&self) -> Result<String, TurnError> {
        let response = self.client.post(self.url("/conversation/start")).send().await?;
        let started: ConversationStarted = read_json(response).await?;
        tracing::debug!(session_id = %started.session_id, status = %started.status, "conversation started");
        Ok(started.session_id)
    }

    /// `POST /conversation/{id}/clear` → drop server-side history.
    pub async fn clear_conversation(&self, session_id: &str) -> Result<(), TurnError> {
        let response = self
            .client
            .post(self.url(&format!("/conversation/{session_id}/clear")))
            .send()
            .await?;
        let _: serde_json::Value = read_json(response).await?;
        Ok(())
    }

    // ── Admin endpoints ─────────────────────────────────────────

    /// `GET /admin/model_status`.
    pub async fn model_status(&self) -> Result<ModelStatus, TurnError> {
        let response = self.client.get(self.url("/admin/model_status")).send().await?;
        read_json(response).await
    }
}

#[async_trait]
impl GenerateBackend for HttpBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<ByteStream, TurnError> {
        let response = self
            .client
            .post(self.url("/conversation/generate"))
            .json(request)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TurnError::from))
            .boxed())
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TurnError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TurnError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TurnError> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
