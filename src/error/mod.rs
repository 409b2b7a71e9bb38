use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Checkpoint storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Stored snapshot is unreadable: {0}")]
    Snapshot(#[from] PersistenceError),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Language-model provider failures.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM provider unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Empty completion returned by provider")]
    EmptyResponse,

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Web search transport errors.
///
/// These never abort a research run; the section processor degrades them
/// to an empty result list.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid search response: {message}")]
    InvalidResponse { message: String },

    #[error("Search timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Illegal transitions of the research state model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Invalid state transition: outline already set")]
    OutlineAlreadySet,

    #[error("Invalid state transition: outline must contain at least one section")]
    EmptyOutline,

    #[error("Invalid state transition: section index {index} out of range (sections: {len})")]
    SectionOutOfRange { index: usize, len: usize },

    #[error("Invalid state transition: section {index} already completed")]
    SectionAlreadyCompleted { index: usize },

    #[error("Invalid state transition: section research is already closed")]
    ResearchClosed,

    #[error("Invalid state transition: section cannot complete without a summary")]
    SummaryMissing,

    #[error("Invalid state transition: reflection count {count} exceeds maximum {max}")]
    ReflectionLimitExceeded { count: u32, max: u32 },

    #[error("Invalid state transition: final report already set")]
    FinalReportAlreadySet,

    #[error("Invalid state transition: final report cannot be empty")]
    EmptyFinalReport,

    #[error("Invalid state transition: final report not set")]
    FinalReportMissing,

    #[error("Invalid state transition: session already completed")]
    AlreadyCompleted,

    #[error("Invalid state transition: expected status {expected}, found {actual}")]
    InvalidStatus { expected: String, actual: String },
}

/// Errors from saving or loading persisted session documents.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Corrupt state: {message}")]
    CorruptState { message: String },

    #[error("Unsupported schema version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Session {session_id} has no final report to write")]
    ReportMissing { session_id: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure of a single pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Stage {stage} failed: {source}")]
    Llm {
        stage: &'static str,
        #[source]
        source: LlmError,
    },

    #[error("Stage {stage} produced no usable output")]
    EmptyOutput { stage: &'static str },

    #[error("Stage {stage} could not serialize its input: {message}")]
    InvalidInput {
        stage: &'static str,
        message: String,
    },

    #[error("Stage {stage} cannot target {target}")]
    UnsupportedTarget {
        stage: &'static str,
        target: String,
    },

    #[error("{0}")]
    State(#[from] StateError),
}

/// Orchestration-level errors surfaced to the caller of a research run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Research aborted in stage '{stage}'{}: {source}", section_suffix(*.section_index))]
    StageFailed {
        stage: &'static str,
        section_index: Option<usize>,
        #[source]
        source: StageError,
    },

    #[error("Research aborted in section {section_index}: {source}")]
    SectionState {
        section_index: usize,
        #[source]
        source: StateError,
    },

    #[error("{0}")]
    State(#[from] StateError),

    #[error("No research session is loaded")]
    NoSession,

    #[error("A research session is already loaded")]
    SessionAlreadyStarted,

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },
}

fn section_suffix(index: Option<usize>) -> String {
    index
        .map(|i| format!(" (section {})", i))
        .unwrap_or_default()
}

impl PipelineError {
    /// Stage name for abort errors, if the failure originated in a stage.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            PipelineError::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Section index for errors raised while processing a section.
    pub fn section_index(&self) -> Option<usize> {
        match self {
            PipelineError::StageFailed { section_index, .. } => *section_index,
            PipelineError::SectionState { section_index, .. } => Some(*section_index),
            _ => None,
        }
    }
}

impl From<StateError> for AppError {
    fn from(err: StateError) -> Self {
        AppError::Pipeline(PipelineError::State(err))
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Result type alias for search client operations
pub type SearchClientResult<T> = Result<T, SearchError>;

/// Result type alias for state model transitions
pub type StateResult<T> = Result<T, StateError>;

/// Result type alias for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Result type alias for stage execution
pub type StageResult<T> = Result<T, StageError>;

/// Result type alias for pipeline runs
pub type PipelineResult<T> = Result<T, PipelineError>;
