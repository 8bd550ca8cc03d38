use std::time::Duration;

use tokio::time::Instant;

/// Wall-clock rate limit on re-rendering the accumulated response.
///
/// The first request always passes; after that at most one per
/// `interval`. Forced renders reset the clock as well.
#[derive(Debug, Clone)]
pub struct RenderThrottle {
    interval: Duration,
    last_render: Option<Instant>,
}

impl RenderThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_render: None,
        }
    }

    /// Whether a render may happen at `now`; records it if so.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_render {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_render = Some(now);
        true
    }

    /// Record an unconditional render.
    pub fn force(&mut self, now: Instant) {
        self.last_render = Some(now);
    }
}
