use std::io;

use thiserror::Error;

// ─── Turn errors ─────────────────────────────────────────────────

/// Everything that can end a turn abnormally.
///
/// Malformed stream lines are not represented here: they are dropped
/// by the consumer and never reach the caller. User cancellation is
/// not an error either, see `TurnReport::cancelled`.
#[derive(Debug, Error)]
pub enum TurnError {
    /// The request could not be sent or the body read failed mid-stream.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend reported a failure inside the stream itself.
    #[error("backend error: {0}")]
    Backend(String),

    /// A non-streaming endpoint returned a body we could not decode.
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TurnError {
    /// Short, user-facing description shown in the terminal.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(e) if e.is_connect() => {
                "cannot reach the inference backend".into()
            }
            Self::Transport(e) => format!("connection dropped: {e}"),
            Self::Status { status, .. } => format!("HTTP error! status: {status}"),
            Self::Backend(msg) => msg.clone(),
            Self::Decode(e) => format!("bad response: {e}"),
        }
    }

    /// Recover the error a framed body carried as `io::Error`.
    pub fn from_body_error(err: io::Error) -> Self {
        let message = err.to_string();
        match err.into_inner().map(|inner| inner.downcast::<TurnError>()) {
            Some(Ok(turn_err)) => *turn_err,
            _ => Self::Backend(message),
        }
    }
}

// ─── Configuration errors ────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
}
