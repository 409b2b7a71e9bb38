use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    extract_json_from_completion, strip_code_fences, MutatingStage, NodeCore, SectionBrief,
    StageTarget,
};
use crate::error::{StageError, StageResult};
use crate::llm::{CompletionOptions, LanguageModel};
use crate::pipeline::TraceContext;
use crate::prompts::{FIRST_SUMMARY_PROMPT, REFLECTION_SUMMARY_PROMPT};
use crate::state::ResearchSession;

/// Evidence gathered for a section by one search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryInput {
    #[serde(flatten)]
    pub section: SectionBrief,
    pub search_query: String,
    /// Result contents, already truncated.
    pub search_results: Vec<String>,
}

/// New evidence plus the summary it should be folded into
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReflectionSummaryInput {
    #[serde(flatten)]
    pub evidence: SummaryInput,
    #[serde(rename = "paragraph_latest_state")]
    pub latest_summary: String,
}

/// Pull the summary text out of a completion.
///
/// JSON output is read from `key`; anything else is used verbatim.
fn extract_summary(completion: &str, key: &str) -> String {
    let parsed = extract_json_from_completion(completion)
        .ok()
        .and_then(|json| serde_json::from_str::<serde_json::Value>(json).ok());

    match parsed {
        Some(value) => match value.get(key).and_then(|v| v.as_str()) {
            Some(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => strip_code_fences(completion),
        },
        None => strip_code_fences(completion),
    }
}

fn section_index(stage: &'static str, target: StageTarget) -> StageResult<usize> {
    target
        .section_index()
        .ok_or_else(|| StageError::UnsupportedTarget {
            stage,
            target: target.to_string(),
        })
}

/// Writes the first summary for a section.
pub struct FirstSummaryStage {
    core: NodeCore,
}

impl FirstSummaryStage {
    pub fn new(llm: Arc<dyn LanguageModel>, options: CompletionOptions) -> Self {
        Self {
            core: NodeCore::new(llm, options),
        }
    }
}

#[async_trait]
impl MutatingStage for FirstSummaryStage {
    type Input = SummaryInput;

    fn name(&self) -> &'static str {
        "first_summary"
    }

    async fn mutate_state(
        &self,
        input: &SummaryInput,
        session: &mut ResearchSession,
        target: StageTarget,
        ctx: &TraceContext,
    ) -> StageResult<()> {
        let index = section_index(self.name(), target)?;
        session.section(index)?;

        let completion = self
            .core
            .complete(self.name(), FIRST_SUMMARY_PROMPT, input, ctx)
            .await?;
        let summary = extract_summary(&completion, "paragraph_latest_state");
        if summary.is_empty() {
            return Err(StageError::EmptyOutput { stage: self.name() });
        }

        debug!(section_index = index, chars = summary.len(), "First summary written");
        session.research_mut(index)?.replace_summary(summary)?;
        Ok(())
    }
}

/// Folds reflection evidence into a section's existing summary.
pub struct ReflectionSummaryStage {
    core: NodeCore,
}

impl ReflectionSummaryStage {
    pub fn new(llm: Arc<dyn LanguageModel>, options: CompletionOptions) -> Self {
        Self {
            core: NodeCore::new(llm, options),
        }
    }
}

#[async_trait]
impl MutatingStage for ReflectionSummaryStage {
    type Input = ReflectionSummaryInput;

    fn name(&self) -> &'static str {
        "reflection_summary"
    }

    async fn mutate_state(
        &self,
        input: &ReflectionSummaryInput,
        session: &mut ResearchSession,
        target: StageTarget,
        ctx: &TraceContext,
    ) -> StageResult<()> {
        let index = section_index(self.name(), target)?;
        session.section(index)?;

        let completion = self
            .core
            .complete(self.name(), REFLECTION_SUMMARY_PROMPT, input, ctx)
            .await?;
        let summary = extract_summary(&completion, "updated_paragraph_latest_state");
        if summary.is_empty() {
            return Err(StageError::EmptyOutput { stage: self.name() });
        }

        session.research_mut(index)?.replace_summary(summary)?;
        info!(section_index = index, "Section summary refined");
        Ok(())
    }
}
