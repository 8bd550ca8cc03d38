use std::time::Duration;

use uuid::Uuid;

/// Lifecycle notifications for a rendering / telemetry layer.
///
/// Delivered over a `tokio::sync::broadcast` channel; see
/// `StreamingMetricsConsumer::subscribe`.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Started {
        turn_id: Uuid,
        prompt: String,
    },
    FirstToken {
        turn_id: Uuid,
        offset: Duration,
    },
    Increment {
        turn_id: Uuid,
        count: u64,
        running_total: u64,
    },
    Completed {
        turn_id: Uuid,
        total_tokens: u64,
        duration: Duration,
        /// User-facing message when the turn failed
        error: Option<String>,
        cancelled: bool,
    },
}

