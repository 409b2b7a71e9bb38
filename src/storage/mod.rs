//! Checkpoint storage for research sessions.
//!
//! Keeps the latest persisted snapshot of each session plus a log of every
//! stage call. Snapshots use the same document format as
//! [`persistence`](crate::persistence), so anything saved here can be
//! exported to a state file and back.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::state::{ResearchSession, SessionStatus};

/// Listing entry for a stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub query: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ResearchSession> for SessionSummary {
    fn from(session: &ResearchSession) -> Self {
        Self {
            id: session.id().to_string(),
            query: session.query().to_string(),
            status: session.status(),
            created_at: session.created_at(),
            updated_at: session.updated_at(),
        }
    }
}

/// Log entry for one stage call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Unique invocation identifier.
    pub id: String,
    /// Session the call belonged to.
    pub session_id: Option<String>,
    /// Correlation id of the run.
    pub correlation_id: Option<String>,
    /// Stage name, e.g. `first_summary`.
    pub stage: String,
    /// Section addressed by the call, if any.
    pub section_index: Option<i64>,
    /// Stage input as JSON.
    pub input: serde_json::Value,
    /// Stage output as JSON (if successful).
    pub output: Option<serde_json::Value>,
    /// Latency in milliseconds.
    pub latency_ms: Option<i64>,
    /// Whether the call succeeded.
    pub success: bool,
    /// Error message (if failed).
    pub error: Option<String>,
    /// When the call started.
    pub created_at: DateTime<Utc>,
}

impl Invocation {
    /// Create a new invocation log entry
    pub fn new(stage: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: None,
            correlation_id: None,
            stage: stage.into(),
            section_index: None,
            input,
            output: None,
            latency_ms: None,
            success: true,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Set the session ID
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the correlation ID
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set the addressed section
    pub fn with_section(mut self, section_index: usize) -> Self {
        self.section_index = i64::try_from(section_index).ok();
        self
    }

    /// Mark as successful with output
    pub fn success(mut self, output: serde_json::Value, latency_ms: i64) -> Self {
        self.success = true;
        self.output = Some(output);
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Mark as failed with error
    pub fn failure(mut self, error: impl Into<String>, latency_ms: i64) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Storage backend for session checkpoints and stage logs.
#[async_trait]
pub trait Storage: Send + Sync {
    // Snapshot operations

    /// Insert or replace the snapshot for the session's id.
    async fn save_snapshot(&self, session: &ResearchSession) -> StorageResult<()>;
    /// Load the latest snapshot, if the session is known.
    async fn load_snapshot(&self, id: &str) -> StorageResult<Option<ResearchSession>>;
    /// List stored sessions, most recently updated first.
    async fn list_sessions(&self) -> StorageResult<Vec<SessionSummary>>;
    /// Delete a session and its invocation log.
    async fn delete_session(&self, id: &str) -> StorageResult<()>;

    // Invocation operations

    /// Record a stage call.
    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()>;
    /// Get all stage calls of a session, oldest first.
    async fn get_session_invocations(&self, session_id: &str) -> StorageResult<Vec<Invocation>>;
}
