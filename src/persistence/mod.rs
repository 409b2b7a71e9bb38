//! Persistence adapter.
//!
//! Sessions are stored as one JSON object: the session fields plus a
//! top-level `schema_version`. Loading rejects other versions, malformed
//! documents, missing fields and documents whose fields contradict each other.
//!
//! The module also writes the user-facing report artifact.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::OutputConfig;
use crate::error::{PersistenceError, PersistenceResult};
use crate::state::ResearchSession;

/// Version written into every saved document.
pub const SCHEMA_VERSION: u32 = 1;

const VERSION_FIELD: &str = "schema_version";

/// Longest sanitized query prefix used in file names.
const MAX_QUERY_PREFIX: usize = 30;

#[derive(Serialize)]
struct SessionDocument<'a> {
    schema_version: u32,
    #[serde(flatten)]
    session: &'a ResearchSession,
}

/// Serialize a session at any point of its lifecycle.
pub fn save(session: &ResearchSession) -> PersistenceResult<Vec<u8>> {
    let document = SessionDocument {
        schema_version: SCHEMA_VERSION,
        session,
    };
    Ok(serde_json::to_vec_pretty(&document)?)
}

/// Rebuild a session from bytes produced by [`save`].
pub fn load(bytes: &[u8]) -> PersistenceResult<ResearchSession> {
    let mut value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| corrupt(format!("invalid JSON: {}", e)))?;

    let object = value
        .as_object_mut()
        .ok_or_else(|| corrupt("document is not a JSON object"))?;

    let version = object
        .remove(VERSION_FIELD)
        .ok_or_else(|| corrupt(format!("missing field `{}`", VERSION_FIELD)))?;
    let version = version
        .as_u64()
        .ok_or_else(|| corrupt(format!("`{}` is not an integer", VERSION_FIELD)))?;
    if version != u64::from(SCHEMA_VERSION) {
        return Err(PersistenceError::UnsupportedVersion {
            found: u32::try_from(version).unwrap_or(u32::MAX),
            supported: SCHEMA_VERSION,
        });
    }

    let session: ResearchSession =
        serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))?;
    session.validate().map_err(corrupt)?;
    Ok(session)
}

/// Save a session to a file, creating parent directories.
pub fn save_to_file(session: &ResearchSession, path: &Path) -> PersistenceResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, save(session)?)?;
    Ok(())
}

/// Load a session from a file written by [`save_to_file`].
pub fn load_from_file(path: &Path) -> PersistenceResult<ResearchSession> {
    let bytes = fs::read(path)?;
    load(&bytes)
}

fn corrupt(message: impl Into<String>) -> PersistenceError {
    PersistenceError::CorruptState {
        message: message.into(),
    }
}

/// Reduce a query to a file-name-safe prefix.
///
/// Keeps alphanumerics, spaces, `-` and `_`, drops trailing whitespace,
/// turns spaces into underscores and keeps the first 30 characters.
pub fn sanitize_query(query: &str) -> String {
    let kept: String = query
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim_end()
        .replace(' ', "_")
        .chars()
        .take(MAX_QUERY_PREFIX)
        .collect()
}

/// Timestamp label used in artifact names.
pub fn timestamp_label(at: DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

pub fn report_file_name(query: &str, timestamp: &str) -> String {
    format!("deep_search_report_{}_{}.md", sanitize_query(query), timestamp)
}

pub fn state_file_name(query: &str, timestamp: &str) -> String {
    format!("state_{}_{}.json", sanitize_query(query), timestamp)
}

/// Files produced by [`write_report`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifacts {
    pub report_path: PathBuf,
    /// Present when intermediate states are saved.
    pub state_path: Option<PathBuf>,
}

/// Write the final report (and optionally the state document) to `output_dir`.
pub fn write_report(
    session: &ResearchSession,
    config: &OutputConfig,
) -> PersistenceResult<ReportArtifacts> {
    write_report_at(session, config, &timestamp_label(Local::now()))
}

fn write_report_at(
    session: &ResearchSession,
    config: &OutputConfig,
    timestamp: &str,
) -> PersistenceResult<ReportArtifacts> {
    let report = session
        .final_report()
        .ok_or_else(|| PersistenceError::ReportMissing {
            session_id: session.id().to_string(),
        })?;

    fs::create_dir_all(&config.output_dir)?;

    let report_path = config
        .output_dir
        .join(report_file_name(session.query(), timestamp));
    fs::write(&report_path, report)?;
    info!(path = %report_path.display(), "Report saved");

    let state_path = if config.save_intermediate_states {
        let path = config
            .output_dir
            .join(state_file_name(session.query(), timestamp));
        save_to_file(session, &path)?;
        info!(path = %path.display(), "State saved");
        Some(path)
    } else {
        None
    };

    Ok(ReportArtifacts {
        report_path,
        state_path,
    })
}
