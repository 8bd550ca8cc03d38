use serde::Deserialize;

/// One line of the generate response body.
///
/// Every field is optional on the wire; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamRecord {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub finished: Option<bool>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StreamRecord {
    /// Parse one line. `None` for anything that is not a JSON object of
    /// the expected shape; such lines are dropped by the consumer.
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }

    /// Non-empty content fragment, if any.
    pub fn increment(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_finished(&self) -> bool {
        self.finished.unwrap_or(false)
    }

    /// Backend-reported failure message, if any.
    pub fn failure(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}
