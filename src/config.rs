use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ─── Fixed tuning constants ──────────────────────────────────────

/// Trailing window used for the instantaneous tokens/sec figure.
pub const THROUGHPUT_WINDOW: Duration = Duration::from_millis(1000);

/// Completed turns kept in the history log.
pub const HISTORY_CAPACITY: usize = 10;

/// Points kept on the live throughput / ITL chart.
pub const CHART_CAPACITY: usize = 10;

/// Minimum wall-clock gap between two re-renders of the response text.
pub const DEFAULT_RENDER_INTERVAL_MS: u64 = 100;

// ─── Command line ────────────────────────────────────────────────

/// Terminal client for a streaming LLM inference backend, with live
/// latency and throughput telemetry.
#[derive(Debug, Clone, Parser)]
#[command(name = "llm-stream-observatory", version)]
pub struct Cli {
    /// Base URL of the inference backend
    #[arg(long, env = "LLM_BACKEND_URL", default_value = "http://localhost:1040")]
    pub backend_url: String,

    /// Resume an existing conversation instead of starting a new one
    #[arg(long, env = "LLM_SESSION_ID")]
    pub session: Option<String>,

    #[arg(long, default_value_t = default_max_tokens())]
    pub max_tokens: u32,

    #[arg(long, default_value_t = default_temperature())]
    pub temperature: f32,

    #[arg(long, default_value_t = default_top_p())]
    pub top_p: f32,

    #[arg(long, default_value_t = default_repetition_penalty())]
    pub repetition_penalty: f32,

    /// Minimum milliseconds between two re-renders of streamed text
    #[arg(long, default_value_t = DEFAULT_RENDER_INTERVAL_MS)]
    pub render_interval_ms: u64,

    /// Serve the live metrics dashboard on this address (e.g. 127.0.0.1:3000)
    #[arg(long)]
    pub dashboard: Option<SocketAddr>,

    /// Do not print the per-turn metrics summary
    #[arg(long)]
    pub no_metrics: bool,
}

impl Cli {
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            repetition_penalty: self.repetition_penalty,
        }
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }
}

// ─── Generation parameters ───────────────────────────────────────

/// Sampling options forwarded verbatim with every generate request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Cap on generated tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling randomness
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling threshold
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Repeat-suppression strength
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,
}

fn default_max_tokens() -> u32 {
    2048
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.9
}
fn default_repetition_penalty() -> f32 {
    1.1
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            repetition_penalty: default_repetition_penalty(),
        }
    }
}

impl GenerationParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("max_tokens", self.max_tokens as f64, 1.0, 32_768.0)?;
        check_range("temperature", self.temperature as f64, 0.0, 2.0)?;
        // top_p and repetition_penalty must be strictly positive
        if self.top_p <= 0.0 {
            return Err(out_of_range("top_p", self.top_p as f64, 0.0, 1.0));
        }
        check_range("top_p", self.top_p as f64, 0.0, 1.0)?;
        if self.repetition_penalty <= 0.0 {
            return Err(out_of_range(
                "repetition_penalty",
                self.repetition_penalty as f64,
                0.0,
                2.0,
            ));
        }
        check_range(
            "repetition_penalty",
            self.repetition_penalty as f64,
            0.0,
            2.0,
        )
    }
}

fn check_range(
    name: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(out_of_range(name, value, min, max));
    }
    Ok(())
}

fn out_of_range(name: &'static str, value: f64, min: f64, max: f64) -> ConfigError {
    ConfigError::OutOfRange {
        name,
        min,
        max,
        value,
    }
}
