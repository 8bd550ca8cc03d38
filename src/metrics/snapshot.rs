use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

/// Timing state of the single in-flight turn.
///
/// Created when a prompt is submitted and discarded once finalized.
/// `first_token_offset` is first-write-wins, `tokens_generated` only
/// grows, and `inter_token_gaps` is append-only with one entry per
/// increment after the first.
#[derive(Debug, Clone)]
pub struct TurnMetrics {
    pub turn_id: Uuid,
    pub request_start: Instant,
    pub first_token_offset: Option<Duration>,
    pub tokens_generated: u64,
    pub inter_token_gaps: Vec<Duration>,
    pub end_time: Option<Instant>,
    last_arrival: Option<Instant>,
}

impl TurnMetrics {
    pub fn new(turn_id: Uuid, request_start: Instant) -> Self {
        Self {
            turn_id,
            request_start,
            first_token_offset: None,
            tokens_generated: 0,
            inter_token_gaps: Vec::new(),
            end_time: None,
            last_arrival: None,
        }
    }

    /// Account for one content increment arriving at `now`.
    ///
    /// Returns the time-to-first-token when this was the first one.
    pub fn record_increment(&mut self, now: Instant) -> Option<Duration> {
        self.tokens_generated += 1;

        if let Some(prev) = self.last_arrival.replace(now) {
            self.inter_token_gaps
                .push(now.saturating_duration_since(prev));
        }

        if self.first_token_offset.is_none() {
            let offset = now.saturating_duration_since(self.request_start);
            self.first_token_offset = Some(offset);
            return Some(offset);
        }
        None
    }

    /// Mean of all gaps so far.
    pub fn avg_gap(&self) -> Option<Duration> {
        mean(&self.inter_token_gaps)
    }

    /// Mean of the last `n` gaps; drives the live ITL chart line.
    pub fn recent_gap_mean(&self, n: usize) -> Option<Duration> {
        let start = self.inter_token_gaps.len().saturating_sub(n);
        mean(&self.inter_token_gaps[start..])
    }

    /// Time since the request went out, frozen once the turn ends.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.end_time
            .unwrap_or(now)
            .saturating_duration_since(self.request_start)
    }

    /// Stamp the end time. Terminal: later calls keep the first stamp.
    pub fn finish(&mut self, now: Instant) -> Duration {
        let end = *self.end_time.get_or_insert(now);
        end.saturating_duration_since(self.request_start)
    }
}

fn mean(gaps: &[Duration]) -> Option<Duration> {
    if gaps.is_empty() {
        return None;
    }
    let total: Duration = gaps.iter().sum();
    Some(total / gaps.len() as u32)
}
