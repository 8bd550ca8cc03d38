use std::sync::Arc;

pub mod backend;
pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod render;
pub mod repl;
pub mod server;
pub mod stream;

pub use backend::{GenerateBackend, HttpBackend};
pub use error::TurnError;
pub use metrics::MetricsMonitor;
pub use stream::{StreamingMetricsConsumer, Turn, TurnEvent, TurnReport};

/// Shared state for the dashboard routes via `State<Arc<AppState>>`.
pub struct AppState {
    /// Same monitor the consumer writes to; the dashboard only reads.
    pub metrics: Arc<MetricsMonitor>,
}
