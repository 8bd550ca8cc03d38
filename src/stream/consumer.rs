use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, LocalBoxStream};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::events::TurnEvent;
use super::framing::{frame_lines, LineStream};
use super::record::StreamRecord;
use super::throttle::RenderThrottle;
use super::Renderer;
use crate::backend::{ByteStream, GenerateBackend, GenerateRequest};
use crate::config::{GenerationParams, DEFAULT_RENDER_INTERVAL_MS};
use crate::error::TurnError;
use crate::metrics::{MetricsMonitor, MetricsSummary, TurnStatus};

/// Buffered lifecycle events per subscriber before the slowest one lags.
const EVENT_CAPACITY: usize = 256;

// ─── Public types ────────────────────────────────────────────────

/// Drives one generation turn at a time: issues the request, frames the
/// NDJSON body, keeps the metrics monitor current, throttles re-renders
/// and broadcasts lifecycle events.
pub struct StreamingMetricsConsumer {
    backend: Arc<dyn GenerateBackend>,
    monitor: Arc<MetricsMonitor>,
    renderer: Box<dyn Renderer>,
    events: broadcast::Sender<TurnEvent>,
    params: GenerationParams,
    render_interval: Duration,
}

/// One content fragment, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct Increment {
    pub text: String,
    /// 1-based position within the turn
    pub index: u64,
    pub first: bool,
}

/// Result of a turn that was not a transport or backend failure.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub turn_id: Uuid,
    pub response: String,
    pub summary: MetricsSummary,
    /// Session id announced by the backend when it differs from ours
    pub adopted_session: Option<String>,
    pub cancelled: bool,
}

/// Cross-task cancellation for an in-flight turn.
#[derive(Debug, Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.cancel();
    }
}

// ─── Consumer ────────────────────────────────────────────────────

impl StreamingMetricsConsumer {
    pub fn new(
        backend: Arc<dyn GenerateBackend>,
        monitor: Arc<MetricsMonitor>,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            monitor,
            renderer,
            events,
            params: GenerationParams::default(),
            render_interval: Duration::from_millis(DEFAULT_RENDER_INTERVAL_MS),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_render_interval(mut self, interval: Duration) -> Self {
        self.render_interval = interval;
        self
    }

    pub fn monitor(&self) -> &Arc<MetricsMonitor> {
        &self.monitor
    }

    /// Register an observer for lifecycle events of all later turns.
    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.events.subscribe()
    }

    /// Start a turn: reset live metrics, announce it, and send the
    /// request in the background. Returns immediately.
    ///
    /// The returned `Turn` borrows the consumer mutably, so a second
    /// turn cannot begin until this one is finished or dropped.
    /// Must be called from within a Tokio runtime.
    pub fn begin_turn(&mut self, prompt: &str, session_id: Option<&str>) -> Turn<'_> {
        let turn_id = Uuid::new_v4();
        let started_at = Instant::now();

        self.monitor.start_turn(turn_id, started_at);
        self.renderer.begin();
        self.emit(TurnEvent::Started {
            turn_id,
            prompt: prompt.to_owned(),
        });

        let request = GenerateRequest::new(prompt, session_id.map(str::to_owned), self.params);
        let backend = Arc::clone(&self.backend);
        tracing::debug!(%turn_id, session_id = ?request.session_id, "issuing generate request");
        let pending = tokio::spawn(async move { backend.generate(&request).await });

        let throttle = RenderThrottle::new(self.render_interval);
        Turn {
            consumer: self,
            turn_id,
            session_id: session_id.map(str::to_owned),
            started_at,
            body: Body::Pending(pending),
            lines: VecDeque::new(),
            pending_end: None,
            response: String::new(),
            increments: 0,
            throttle,
            dirty: false,
            cancel: CancellationToken::new(),
            outcome: None,
            finalized: false,
        }
    }

    fn emit(&self, event: TurnEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

// ─── Turn ────────────────────────────────────────────────────────

enum Body {
    Pending(JoinHandle<Result<ByteStream, TurnError>>),
    Open(LineStream),
    Closed,
}

enum TurnEnd {
    Finished { session_id: Option<String> },
    /// Body ended without a `finished` record
    Eof,
    Cancelled,
    Failed(TurnError),
}

/// Handle on the in-flight turn. Pull increments with `next_increment`
/// (or the `increments` stream); the turn finalizes itself on the
/// terminal record, on error, on cancellation, or when dropped.
pub struct Turn<'c> {
    consumer: &'c mut StreamingMetricsConsumer,
    turn_id: Uuid,
    session_id: Option<String>,
    started_at: Instant,

    // Body framing
    body: Body,
    lines: VecDeque<String>,
    pending_end: Option<TurnEnd>,

    // Rendering
    response: String,
    increments: u64,
    throttle: RenderThrottle,
    dirty: bool,

    cancel: CancellationToken,
    outcome: Option<Result<TurnReport, TurnError>>,
    finalized: bool,
}

impl<'c> Turn<'c> {
    pub fn id(&self) -> Uuid {
        self.turn_id
    }

    /// Response text accumulated so far.
    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn is_finished(&self) -> bool {
        self.finalized
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Abort the read and finalize as cancelled right away.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.conclude(TurnEnd::Cancelled);
    }

    /// Next content increment, or `None` once the turn has ended.
    pub async fn next_increment(&mut self) -> Option<Increment> {
        loop {
            if self.finalized {
                return None;
            }
            if self.cancel.is_cancelled() {
                self.conclude(TurnEnd::Cancelled);
                return None;
            }
            if let Some(end) = self.pending_end.take() {
                self.conclude(end);
                return None;
            }
            if let Some(line) = self.lines.pop_front() {
                if let Some(increment) = self.process_line(&line) {
                    return Some(increment);
                }
                continue;
            }
            if let Some(end) = self.fill().await {
                self.conclude(end);
                return None;
            }
        }
    }

    /// The turn's increments as a lazy, finite stream.
    pub fn increments(&mut self) -> LocalBoxStream<'_, Increment> {
        stream::unfold(self, |turn| async move {
            let increment = turn.next_increment().await?;
            Some((increment, turn))
        })
        .boxed_local()
    }

    /// Drain whatever is left and return the outcome.
    pub async fn finish(mut self) -> Result<TurnReport, TurnError> {
        while self.next_increment().await.is_some() {}
        match self.outcome.take() {
            Some(outcome) => outcome,
            None => Err(TurnError::Backend("turn ended without an outcome".into())),
        }
    }

    // ── Reading ─────────────────────────────────────────────────

    /// Wait for the next line (or the response headers) and queue it.
    /// Returns how the turn ends if it does.
    async fn fill(&mut self) -> Option<TurnEnd> {
        let cancel = self.cancel.clone();
        match &mut self.body {
            Body::Pending(request) => {
                let joined = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Some(TurnEnd::Cancelled),
                    joined = request => joined,
                };
                match joined {
                    Ok(Ok(stream)) => {
                        self.body = Body::Open(frame_lines(stream));
                        None
                    }
                    Ok(Err(err)) => Some(TurnEnd::Failed(err)),
                    Err(join) => Some(TurnEnd::Failed(TurnError::Backend(format!(
                        "request task failed: {join}"
                    )))),
                }
            }
            Body::Open(lines) => {
                let line = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Some(TurnEnd::Cancelled),
                    line = lines.next() => line,
                };
                match line {
                    Some(Ok(line)) => {
                        self.lines.push_back(line);
                        None
                    }
                    Some(Err(err)) => Some(TurnEnd::Failed(TurnError::from_body_error(err))),
                    None => {
                        self.body = Body::Closed;
                        None
                    }
                }
            }
            Body::Closed => Some(TurnEnd::Eof),
        }
    }

    fn process_line(&mut self, line: &str) -> Option<Increment> {
        let Some(record) = StreamRecord::parse(line) else {
            tracing::trace!(turn_id = %self.turn_id, line, "discarding malformed stream line");
            return None;
        };

        if let Some(message) = record.failure() {
            self.pending_end = Some(TurnEnd::Failed(TurnError::Backend(message.to_owned())));
        } else if record.is_finished() {
            self.pending_end = Some(TurnEnd::Finished {
                session_id: record.session_id.clone(),
            });
        }
        if self.pending_end.is_some() {
            // Nothing after a terminal record is consumed
            self.lines.clear();
        }

        let text = record.increment()?.to_owned();
        Some(self.apply_increment(text))
    }

    fn apply_increment(&mut self, text: String) -> Increment {
        let now = Instant::now();
        self.increments += 1;
        let first = self.increments == 1;

        // Metrics first, then render
        let update = self.consumer.monitor.record_increment(self.turn_id, now);
        if first {
            let offset = update
                .and_then(|u| u.first_token)
                .unwrap_or_else(|| now.saturating_duration_since(self.started_at));
            tracing::debug!(turn_id = %self.turn_id, ttft_ms = offset.as_secs_f64() * 1000.0, "first token");
            self.consumer.emit(TurnEvent::FirstToken {
                turn_id: self.turn_id,
                offset,
            });
        }
        self.consumer.emit(TurnEvent::Increment {
            turn_id: self.turn_id,
            count: 1,
            running_total: self.increments,
        });

        self.response.push_str(&text);
        self.dirty = true;
        if self.throttle.try_acquire(now) {
            self.render();
        }

        Increment {
            text,
            index: self.increments,
            first,
        }
    }

    fn render(&mut self) {
        self.consumer.renderer.render(&self.response);
        self.dirty = false;
    }

    // ── Finalization ────────────────────────────────────────────

    fn conclude(&mut self, end: TurnEnd) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        let now = Instant::now();

        // Stop reading; buffered remainder is discarded
        match &self.body {
            Body::Pending(request) => request.abort(),
            Body::Open(lines) if !lines.read_buffer().is_empty() => {
                tracing::debug!(
                    turn_id = %self.turn_id,
                    bytes = lines.read_buffer().len(),
                    "discarding unterminated body bytes"
                );
            }
            _ => {}
        }
        self.body = Body::Closed;
        self.lines.clear();
        self.pending_end = None;

        let status = match &end {
            TurnEnd::Finished { .. } | TurnEnd::Eof => TurnStatus::Completed,
            TurnEnd::Cancelled => TurnStatus::Cancelled,
            TurnEnd::Failed(_) => TurnStatus::Failed,
        };

        // The terminal record always flushes; abnormal ends only flush pending text
        if status == TurnStatus::Completed || self.dirty {
            self.throttle.force(now);
            self.render();
        }

        let duration = now.saturating_duration_since(self.started_at);
        let summary = self
            .consumer
            .monitor
            .finalize_turn(self.turn_id, Some(self.increments), status, now)
            .unwrap_or_else(|| {
                MetricsSummary::untracked(self.turn_id, status, self.increments, duration)
            });

        let error = match &end {
            TurnEnd::Failed(err) => Some(err.user_message()),
            _ => None,
        };
        self.consumer.emit(TurnEvent::Completed {
            turn_id: self.turn_id,
            total_tokens: summary.total_tokens,
            duration,
            error,
            cancelled: status == TurnStatus::Cancelled,
        });

        let outcome = match end {
            TurnEnd::Failed(err) => {
                tracing::warn!(turn_id = %self.turn_id, tokens = self.increments, error = %err, "turn failed");
                Err(err)
            }
            end => {
                let adopted_session = match end {
                    TurnEnd::Finished { session_id } => {
                        session_id.filter(|id| Some(id) != self.session_id.as_ref())
                    }
                    TurnEnd::Eof => {
                        tracing::warn!(turn_id = %self.turn_id, "stream closed without a finished record");
                        None
                    }
                    _ => None,
                };
                tracing::info!(
                    turn_id = %self.turn_id,
                    ?status,
                    tokens = summary.total_tokens,
                    ttft_ms = ?summary.ttft_ms,
                    e2e_ms = summary.e2e_ms,
                    "turn finished"
                );
                Ok(TurnReport {
                    turn_id: self.turn_id,
                    response: std::mem::take(&mut self.response),
                    summary,
                    adopted_session,
                    cancelled: status == TurnStatus::Cancelled,
                })
            }
        };
        self.outcome = Some(outcome);
    }
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        if !self.finalized {
            self.conclude(TurnEnd::Cancelled);
        }
    }
}
