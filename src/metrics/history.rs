use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::TurnStatus;

/// One finished turn as kept in the history log.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub turn_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub status: TurnStatus,
    pub ttft_ms: Option<f64>,
    /// Average tokens/sec over the whole turn
    pub tokens_per_sec: f64,
    pub token_count: u64,
    pub e2e_ms: f64,
}

/// The four tracked series side by side, oldest turn first; fed to the
/// dashboard charts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySeries {
    pub ttft_ms: Vec<Option<f64>>,
    pub tokens_per_sec: Vec<f64>,
    pub token_counts: Vec<u64>,
    pub e2e_ms: Vec<f64>,
}

/// Bounded FIFO of finished turns.
///
/// Entries hold all four tracked series (TTFT, throughput, token count,
/// E2E latency) together, so eviction always drops them in lockstep.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    // ── Per-series views ────────────────────────────────────────

    pub fn ttft_series(&self) -> Vec<Option<f64>> {
        self.entries.iter().map(|e| e.ttft_ms).collect()
    }

    pub fn throughput_series(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.tokens_per_sec).collect()
    }

    pub fn token_counts(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.token_count).collect()
    }

    pub fn e2e_series(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.e2e_ms).collect()
    }

    pub fn series(&self) -> HistorySeries {
        HistorySeries {
            ttft_ms: self.ttft_series(),
            tokens_per_sec: self.throughput_series(),
            token_counts: self.token_counts(),
            e2e_ms: self.e2e_series(),
        }
    }

    /// Mean E2E latency of the last `n` turns, in ms.
    pub fn recent_e2e_mean(&self, n: usize) -> Option<f64> {
        if self.is_empty() || n == 0 {
            return None;
        }
        let skip = self.entries.len().saturating_sub(n);
        let recent = self.entries.len() - skip;
        let total: f64 = self.entries.iter().skip(skip).map(|e| e.e2e_ms).sum();
        Some(total / recent as f64)
    }
}
