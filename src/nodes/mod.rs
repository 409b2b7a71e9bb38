//! Pipeline stages.
//!
//! Every stage implements one of two capabilities:
//!
//! - [`PureStage`]: maps an input record to an output record without touching
//!   the session (search query formulation, reflection, report formatting).
//! - [`MutatingStage`]: takes exclusive access to the session and updates
//!   exactly the addressed target (outline planning, section summaries).
//!
//! Stages reach the language model only through
//! [`LanguageModel`](crate::llm::LanguageModel), so providers are swappable.

mod core;
mod formatting;
mod outline;
mod search_query;
mod summary;

pub use self::core::NodeCore;
pub use formatting::{render_fallback_report, FormattingStage, ReportInput, ReportSection};
pub use outline::{OutlineInput, OutlineStage};
pub use search_query::{FirstSearchStage, ReflectionInput, ReflectionStage, SearchPlan, SectionBrief};
pub use summary::{FirstSummaryStage, ReflectionSummaryInput, ReflectionSummaryStage, SummaryInput};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StageResult;
use crate::pipeline::TraceContext;
use crate::state::ResearchSession;

/// What a mutating stage is allowed to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTarget {
    /// The session as a whole (outline planning).
    Session,
    /// One section's research progress.
    Section(usize),
}

impl StageTarget {
    /// Section index, if this target addresses a section
    pub fn section_index(&self) -> Option<usize> {
        match self {
            StageTarget::Session => None,
            StageTarget::Section(index) => Some(*index),
        }
    }
}

impl std::fmt::Display for StageTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageTarget::Session => write!(f, "session"),
            StageTarget::Section(index) => write!(f, "section {}", index),
        }
    }
}

/// A stage that transforms input into output without touching the session.
#[async_trait]
pub trait PureStage: Send + Sync {
    type Input: Serialize + Send + Sync;
    type Output: Serialize + Send;

    /// Stable stage name used in logs and errors
    fn name(&self) -> &'static str;

    async fn run(&self, input: &Self::Input, ctx: &TraceContext) -> StageResult<Self::Output>;
}

/// A stage that updates the session in place.
///
/// Implementations must only change what `target` addresses.
#[async_trait]
pub trait MutatingStage: Send + Sync {
    type Input: Serialize + Send + Sync;

    /// Stable stage name used in logs and errors
    fn name(&self) -> &'static str;

    async fn mutate_state(
        &self,
        input: &Self::Input,
        session: &mut ResearchSession,
        target: StageTarget,
        ctx: &TraceContext,
    ) -> StageResult<()>;
}

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Remove `<think>...</think>` reasoning blocks emitted by reasoning models.
pub(crate) fn strip_reasoning_blocks(text: &str) -> String {
    let mut rest = text;

    // A dangling close tag means the opening tag was cut off upstream.
    if let Some(end) = rest.find(THINK_CLOSE) {
        if !rest[..end].contains(THINK_OPEN) {
            rest = &rest[end + THINK_CLOSE.len()..];
        }
    }

    let mut out = String::with_capacity(rest.len());
    while let Some(start) = rest.find(THINK_OPEN) {
        out.push_str(&rest[..start]);
        rest = match rest[start..].find(THINK_CLOSE) {
            Some(end) => &rest[start + end + THINK_CLOSE.len()..],
            None => "",
        };
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Remove a Markdown code fence wrapping the whole text, if present.
pub(crate) fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let body = match trimmed.find('\n') {
        Some(i) => &trimmed[i + 1..],
        None => "",
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Raw JSON (fast path)
/// 2. A ```json or plain ``` block whose body is JSON
/// 3. The outermost object or array embedded in prose
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    let fenced = if trimmed.contains("```json") {
        trimmed
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
    } else if trimmed.contains("```") {
        trimmed.split("```").nth(1)
    } else {
        None
    };
    if let Some(block) = fenced.map(str::trim) {
        if block.starts_with('{') || block.starts_with('[') {
            return Ok(block);
        }
    }

    let start = trimmed.find(|c| c == '{' || c == '[');
    if let Some(start) = start {
        let close = if trimmed[start..].starts_with('{') {
            '}'
        } else {
            ']'
        };
        if let Some(end) = trimmed.rfind(close) {
            if end > start {
                return Ok(&trimmed[start..=end]);
            }
        }
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

/// Parse a typed value out of a cleaned completion.
pub(crate) fn parse_json_output<T: DeserializeOwned>(completion: &str) -> Result<T, String> {
    let json = extract_json_from_completion(completion)?;
    serde_json::from_str(json).map_err(|e| format!("Invalid JSON in completion: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        value: u32,
    }

    #[test]
    fn test_strip_reasoning_blocks() {
        assert_eq!(
            strip_reasoning_blocks("<think>pondering</think>\n{\"value\": 1}"),
            "{\"value\": 1}"
        );
        assert_eq!(strip_reasoning_blocks("a <think>x</think>b<think>y</think> c"), "a b c");
        assert_eq!(strip_reasoning_blocks("cut off</think>answer"), "answer");
        assert_eq!(strip_reasoning_blocks("answer <think>never closed"), "answer");
        assert_eq!(strip_reasoning_blocks("plain"), "plain");
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```markdown\n# Title\n\nBody\n```"), "# Title\n\nBody");
        assert_eq!(strip_code_fences("```\ntext\n```\n"), "text");
        assert_eq!(strip_code_fences("# No fence"), "# No fence");
    }

    #[test]
    fn test_extract_raw_json() {
        assert_eq!(extract_json_from_completion("  {\"a\":1} ").unwrap(), "{\"a\":1}");
        assert_eq!(extract_json_from_completion("[1,2]").unwrap(), "[1,2]");
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here you go:\n```json\n{\"value\": 3}\n```\nDone.";
        assert_eq!(extract_json_from_completion(text).unwrap(), "{\"value\": 3}");

        let text = "```\n[{\"title\": \"x\"}]\n```";
        assert_eq!(extract_json_from_completion(text).unwrap(), "[{\"title\": \"x\"}]");
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let text = "Reasoning: the best query is below. {\"value\": 7} Hope that helps.";
        assert_eq!(extract_json_from_completion(text).unwrap(), "{\"value\": 7}");
    }

    #[test]
    fn test_extract_json_missing() {
        let err = extract_json_from_completion("no structure here").unwrap_err();
        assert!(err.starts_with("No JSON found in response"));
    }

    #[test]
    fn test_parse_json_output() {
        let payload: Payload = parse_json_output("```json\n{\"value\": 42}\n```").unwrap();
        assert_eq!(payload, Payload { value: 42 });

        let err = parse_json_output::<Payload>("{\"other\": true}").unwrap_err();
        assert!(err.contains("Invalid JSON"));
    }

    #[test]
    fn test_stage_target_display() {
        assert_eq!(StageTarget::Session.to_string(), "session");
        assert_eq!(StageTarget::Section(2).to_string(), "section 2");
        assert_eq!(StageTarget::Section(2).section_index(), Some(2));
        assert_eq!(StageTarget::Session.section_index(), None);
    }
}
