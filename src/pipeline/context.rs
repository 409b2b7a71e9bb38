use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Observability context passed explicitly into every stage call.
///
/// Carries the correlation id that ties log lines and invocation records of
/// one run together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub correlation_id: String,
    pub session_id: Option<String>,
}

impl TraceContext {
    /// Start a new trace with a fresh correlation id
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            session_id: None,
        }
    }

    /// Attach the session id
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Session id or an empty string, for log fields
    pub fn session_label(&self) -> &str {
        self.session_id.as_deref().unwrap_or("")
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}
