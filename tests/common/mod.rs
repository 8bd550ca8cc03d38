#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;

use llm_stream_observatory::backend::{ByteStream, GenerateBackend, GenerateRequest};
use llm_stream_observatory::stream::Renderer;
use llm_stream_observatory::TurnError;

/// What one generate call should produce.
pub enum Script {
    /// Chunks delivered after the given delay each
    Chunks(Vec<(Duration, Vec<u8>)>),
    /// Chunks, then a mid-stream failure
    BreaksAfter(Vec<Vec<u8>>, String),
    /// Response headers never turn into a body
    Rejected(u16),
    /// Body that never yields
    Stall,
}

impl Script {
    pub fn body(chunks: &[&str]) -> Self {
        Self::Chunks(
            chunks
                .iter()
                .map(|c| (Duration::ZERO, c.as_bytes().to_vec()))
                .collect(),
        )
    }

    pub fn timed(chunks: &[(u64, &str)]) -> Self {
        Self::Chunks(
            chunks
                .iter()
                .map(|(ms, c)| (Duration::from_millis(*ms), c.as_bytes().to_vec()))
                .collect(),
        )
    }
}

/// In-memory backend replaying one script per generate call.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedBackend {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl GenerateBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<ByteStream, TurnError> {
        self.requests.lock().push(request.clone());
        let script = self.scripts.lock().pop_front().unwrap_or(Script::Stall);

        match script {
            Script::Chunks(chunks) => Ok(futures::stream::iter(chunks)
                .then(|(delay, bytes)| async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(Bytes::from(bytes))
                })
                .boxed()),
            Script::BreaksAfter(chunks, message) => {
                let items: Vec<Result<Bytes, TurnError>> = chunks
                    .into_iter()
                    .map(|c| Ok(Bytes::from(c)))
                    .chain(std::iter::once(Err(TurnError::Backend(message))))
                    .collect();
                Ok(futures::stream::iter(items).boxed())
            }
            Script::Rejected(status) => Err(TurnError::Status {
                status,
                body: "unavailable".into(),
            }),
            Script::Stall => Ok(futures::stream::pending().boxed()),
        }
    }
}

/// Renderer that remembers every text it was asked to show.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    pub renders: Arc<Mutex<Vec<String>>>,
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, accumulated: &str) {
        self.renders.lock().push(accumulated.to_owned());
    }
}

/// `Write` sink whose bytes stay readable after the renderer owns it.
#[derive(Clone, Default)]
pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl std::io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
