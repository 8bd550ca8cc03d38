pub mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::config::GenerationParams;
use crate::error::TurnError;

/// Raw response body of a streaming generate call, chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, TurnError>>;

/// The only capability the streaming consumer needs from a backend.
#[async_trait]
pub trait GenerateBackend: Send + Sync {
    /// Issue a generate request. Resolves once response headers are in;
    /// the body is consumed lazily through the returned stream.
    async fn generate(&self, request: &GenerateRequest) -> Result<ByteStream, TurnError>;
}

// ─── Wire types ──────────────────────────────────────────────────

/// Body of `POST /conversation/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub params: GenerationParams,
    /// Always true: the consumer only understands streamed bodies.
    pub stream: bool,
}

impl GenerateRequest {
    pub fn new(
        prompt: impl Into<String>,
        session_id: Option<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            session_id,
            params,
            stream: true,
        }
    }
}

/// Reply of `POST /conversation/start`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationStarted {
    pub session_id: String,
    #[serde(default)]
    pub status: String,
}

/// Reply of `GET /admin/model_status`. The backend omits fields freely,
/// so everything is defaulted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelStatus {
    #[serde(default)]
    pub loaded: bool,
    #[serde(default)]
    pub loading: bool,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub model_type: String,
    #[serde(default)]
    pub quantization: String,
    #[serde(default)]
    pub tensor_parallel_size: Option<u32>,
}
