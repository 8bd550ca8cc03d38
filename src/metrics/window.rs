use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Arrival timestamps from the trailing `span` of wall-clock time.
///
/// The number of retained arrivals is used directly as the
/// instantaneous tokens/sec figure. Every read prunes first, so a
/// retained timestamp `t` always satisfies `now - t < span`.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    span: Duration,
    arrivals: VecDeque<Instant>,
}

impl RollingWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            span,
            arrivals: VecDeque::new(),
        }
    }

    /// Record one arrival at `now` and drop expired entries.
    pub fn push(&mut self, now: Instant) {
        self.arrivals.push_back(now);
        self.prune(now);
    }

    /// Arrivals within the trailing span as seen from `now`.
    pub fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.arrivals.len()
    }

    pub fn clear(&mut self) {
        self.arrivals.clear();
    }

    #[cfg(test)]
    fn oldest(&self) -> Option<Instant> {
        self.arrivals.front().copied()
    }

    fn prune(&mut self, now: Instant) {
        // Arrivals are pushed in monotonic order, so expiry is always at the front
        while let Some(&front) = self.arrivals.front() {
            if now.saturating_duration_since(front) >= self.span {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }
    }
}
