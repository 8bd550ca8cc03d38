pub mod collector;
pub mod history;
pub mod percentiles;
pub mod snapshot;
pub mod stream;
pub mod window;

pub use collector::{ChartPoint, IncrementUpdate, LiveMetrics, MetricsMonitor, MetricsSummary};
pub use history::{HistoryEntry, HistoryLog, HistorySeries};
pub use snapshot::TurnMetrics;
pub use window::RollingWindow;

use serde::Serialize;

/// How a turn ended, as recorded in the history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Cancelled,
    Failed,
}

/// Traffic-light grading of live figures for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceLevel {
    High,
    Medium,
    Low,
}

impl PerformanceLevel {
    pub fn for_tps(tps: f64) -> Self {
        if tps > 50.0 {
            Self::High
        } else if tps > 20.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Lower inter-token latency is better.
    pub fn for_itl_ms(itl_ms: f64) -> Self {
        if itl_ms < 50.0 {
            Self::High
        } else if itl_ms < 200.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}
