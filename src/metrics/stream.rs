use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::collector::LiveMetrics;
use super::history::{HistoryEntry, HistorySeries};
use crate::AppState;

/// Live figures plus the finished-turn history, as one JSON document.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub live: LiveMetrics,
    pub history: Vec<HistoryEntry>,
    pub series: HistorySeries,
}

impl DashboardSnapshot {
    pub fn capture(state: &AppState) -> Self {
        Self {
            live: state.metrics.live(Instant::now()),
            history: state.metrics.history(),
            series: state.metrics.history_series(),
        }
    }
}

// ─── GET /api/metrics ────────────────────────────────────────────
/// Returns a single JSON snapshot, handy for curl.

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<DashboardSnapshot> {
    Json(DashboardSnapshot::capture(&state))
}

// ─── GET /api/metrics/stream ─────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes a full `DashboardSnapshot` as JSON every 500 ms.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_millis(500));

    let stream = IntervalStream::new(interval).map(move |_| {
        let snapshot = DashboardSnapshot::capture(&state);
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// ─── GET /api/health ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub streaming: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        streaming: state.metrics.is_streaming(),
    })
}
