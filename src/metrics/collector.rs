use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use super::history::{HistoryEntry, HistoryLog, HistorySeries};
use super::percentiles::PercentileSet;
use super::snapshot::TurnMetrics;
use super::window::RollingWindow;
use super::{PerformanceLevel, TurnStatus};
use crate::config::{CHART_CAPACITY, HISTORY_CAPACITY, THROUGHPUT_WINDOW};

// ─── Configuration ───────────────────────────────────────────────

/// Gaps averaged for each point on the live ITL chart line
const CHART_ITL_SPAN: usize = 5;

/// Turns averaged for the requests/sec estimate while idle
const RPS_HISTORY_SPAN: usize = 5;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe metrics engine for conversation turns.
/// The consumer calls `start_turn` / `record_increment` / `finalize_turn`,
/// the dashboard calls `live()` and `history()`.
pub struct MetricsMonitor {
    inner: Mutex<Inner>,
}

/// What one increment changed; handed back to the consumer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncrementUpdate {
    /// Set only on the first increment of the turn
    pub first_token: Option<Duration>,
    pub tokens_generated: u64,
    pub tokens_per_sec: usize,
}

/// Final figures of a turn, returned by `finalize_turn`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub turn_id: Uuid,
    pub status: TurnStatus,
    pub ttft_ms: Option<f64>,
    pub avg_itl_ms: Option<f64>,
    pub itl_us: PercentileSet,
    /// Arrivals in the trailing second at the moment the turn ended
    pub instantaneous_tps: usize,
    pub e2e_ms: f64,
    pub total_tokens: u64,
}

impl MetricsSummary {
    /// Figures for a turn the monitor no longer tracks (e.g. metrics were
    /// cleared mid-turn). Only counts and duration are known.
    pub fn untracked(turn_id: Uuid, status: TurnStatus, total_tokens: u64, e2e: Duration) -> Self {
        Self {
            turn_id,
            status,
            ttft_ms: None,
            avg_itl_ms: None,
            itl_us: PercentileSet::empty(),
            instantaneous_tps: 0,
            e2e_ms: as_ms(e2e),
            total_tokens,
        }
    }
}

/// One point on the live chart, appended per increment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub tokens_per_sec: usize,
    pub recent_itl_ms: f64,
}

/// Read-only view shipped to the dashboard on every tick.
#[derive(Debug, Clone, Serialize)]
pub struct LiveMetrics {
    pub turn_id: Option<Uuid>,
    pub streaming: bool,
    pub ttft_ms: Option<f64>,
    pub avg_itl_ms: Option<f64>,
    pub itl_us: PercentileSet,
    pub tokens_per_sec: usize,
    pub tokens_generated: u64,
    pub elapsed_ms: f64,
    pub requests_per_sec: f64,
    pub tps_level: PerformanceLevel,
    pub itl_level: Option<PerformanceLevel>,
    pub chart: Vec<ChartPoint>,
    pub last_summary: Option<MetricsSummary>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    // The one live turn, if any
    current: Option<TurnMetrics>,

    // Trailing-second arrival window for instantaneous TPS
    window: RollingWindow,

    // Live chart, reset at every turn start
    chart: VecDeque<ChartPoint>,

    // Finished turns
    history: HistoryLog,
    last_summary: Option<MetricsSummary>,
}

// ─── MetricsMonitor impl ─────────────────────────────────────────

impl MetricsMonitor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Reset live state for a new turn starting at `now`.
    ///
    /// A turn that is still live gets finalized as cancelled first, so
    /// two snapshots never interleave.
    pub fn start_turn(&self, turn_id: Uuid, now: Instant) {
        let mut inner = self.inner.lock();
        if let Some(prev) = inner.current.as_ref().map(|t| t.turn_id) {
            tracing::warn!(%prev, next = %turn_id, "turn started while another was live; cancelling the previous one");
            inner.finalize(prev, None, TurnStatus::Cancelled, now);
        }
        inner.current = Some(TurnMetrics::new(turn_id, now));
        inner.window.clear();
        inner.chart.clear();
    }

    /// Account for one increment of `turn_id`. Returns `None` when that
    /// turn is no longer the live one.
    pub fn record_increment(&self, turn_id: Uuid, now: Instant) -> Option<IncrementUpdate> {
        self.inner.lock().record_increment(turn_id, now)
    }

    /// Close `turn_id`: stamp its end time, append it to the history log
    /// and return the summary. `total_tokens_override` wins over the
    /// counted increments when it is non-zero.
    pub fn finalize_turn(
        &self,
        turn_id: Uuid,
        total_tokens_override: Option<u64>,
        status: TurnStatus,
        now: Instant,
    ) -> Option<MetricsSummary> {
        self.inner
            .lock()
            .finalize(turn_id, total_tokens_override, status, now)
    }

    /// Live view as seen from `now`.
    pub fn live(&self, now: Instant) -> LiveMetrics {
        self.inner.lock().live(now)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.lock().history.entries().cloned().collect()
    }

    /// Per-series view of the same history, for charting.
    pub fn history_series(&self) -> HistorySeries {
        self.inner.lock().history.series()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.lock().current.is_some()
    }

    /// Wipe everything, history included.
    pub fn clear(&self) {
        *self.inner.lock() = Inner::new();
    }
}

impl Default for MetricsMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            current: None,
            window: RollingWindow::new(THROUGHPUT_WINDOW),
            chart: VecDeque::with_capacity(CHART_CAPACITY + 1),
            history: HistoryLog::new(HISTORY_CAPACITY),
            last_summary: None,
        }
    }

    fn record_increment(&mut self, turn_id: Uuid, now: Instant) -> Option<IncrementUpdate> {
        let turn = self.current.as_mut().filter(|t| t.turn_id == turn_id)?;

        // ── Snapshot ────────────────────────────────────────────
        let first_token = turn.record_increment(now);
        let tokens_generated = turn.tokens_generated;
        let recent_itl = turn.recent_gap_mean(CHART_ITL_SPAN);

        // ── Rolling window ──────────────────────────────────────
        self.window.push(now);
        let tokens_per_sec = self.window.count(now);

        // ── Chart ───────────────────────────────────────────────
        self.chart.push_back(ChartPoint {
            tokens_per_sec,
            recent_itl_ms: recent_itl.map(as_ms).unwrap_or(0.0),
        });
        if self.chart.len() > CHART_CAPACITY {
            self.chart.pop_front();
        }

        Some(IncrementUpdate {
            first_token,
            tokens_generated,
            tokens_per_sec,
        })
    }

    fn finalize(
        &mut self,
        turn_id: Uuid,
        total_tokens_override: Option<u64>,
        status: TurnStatus,
        now: Instant,
    ) -> Option<MetricsSummary> {
        if self.current.as_ref()?.turn_id != turn_id {
            return None;
        }
        let mut turn = self.current.take()?;

        let e2e = turn.finish(now);
        let total_tokens = total_tokens_override
            .filter(|&n| n > 0)
            .unwrap_or(turn.tokens_generated);

        let e2e_secs = e2e.as_secs_f64();
        let tokens_per_sec = if e2e_secs > 0.0 {
            total_tokens as f64 / e2e_secs
        } else {
            0.0
        };

        let summary = MetricsSummary {
            turn_id,
            status,
            ttft_ms: turn.first_token_offset.map(as_ms),
            avg_itl_ms: turn.avg_gap().map(as_ms),
            itl_us: PercentileSet::from_durations(&turn.inter_token_gaps),
            instantaneous_tps: self.window.count(now),
            e2e_ms: as_ms(e2e),
            total_tokens,
        };

        self.history.push(HistoryEntry {
            turn_id,
            completed_at: Utc::now(),
            status,
            ttft_ms: summary.ttft_ms,
            tokens_per_sec,
            token_count: total_tokens,
            e2e_ms: summary.e2e_ms,
        });
        self.last_summary = Some(summary.clone());

        Some(summary)
    }

    fn live(&mut self, now: Instant) -> LiveMetrics {
        let tokens_per_sec = self.window.count(now);
        let chart = self.chart.iter().copied().collect();
        let last_summary = self.last_summary.clone();

        let Some(turn) = &self.current else {
            return LiveMetrics {
                turn_id: None,
                streaming: false,
                ttft_ms: None,
                avg_itl_ms: None,
                itl_us: PercentileSet::empty(),
                tokens_per_sec,
                tokens_generated: 0,
                elapsed_ms: 0.0,
                requests_per_sec: self.requests_per_sec(None),
                tps_level: PerformanceLevel::for_tps(tokens_per_sec as f64),
                itl_level: None,
                chart,
                last_summary,
            };
        };

        let elapsed = turn.elapsed(now);
        let avg_itl_ms = turn.avg_gap().map(as_ms);
        LiveMetrics {
            turn_id: Some(turn.turn_id),
            streaming: true,
            ttft_ms: turn.first_token_offset.map(as_ms),
            avg_itl_ms,
            itl_us: PercentileSet::from_durations(&turn.inter_token_gaps),
            tokens_per_sec,
            tokens_generated: turn.tokens_generated,
            elapsed_ms: as_ms(elapsed),
            requests_per_sec: self.requests_per_sec(Some(elapsed)),
            tps_level: PerformanceLevel::for_tps(tokens_per_sec as f64),
            itl_level: avg_itl_ms.map(PerformanceLevel::for_itl_ms),
            chart,
            last_summary,
        }
    }

    /// Live turn: inverse of its elapsed time. Idle: inverse of the mean
    /// E2E latency of recent turns.
    fn requests_per_sec(&self, live_elapsed: Option<Duration>) -> f64 {
        let ms = match live_elapsed {
            Some(elapsed) if !elapsed.is_zero() => as_ms(elapsed),
            _ => self.history.recent_e2e_mean(RPS_HISTORY_SPAN).unwrap_or(0.0),
        };
        if ms > 0.0 {
            1000.0 / ms
        } else {
            0.0
        }
    }
}

pub(crate) fn as_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}
