use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{parse_json_output, NodeCore, PureStage};
use crate::error::StageResult;
use crate::llm::{CompletionOptions, LanguageModel};
use crate::pipeline::TraceContext;
use crate::prompts::{FIRST_SEARCH_PROMPT, REFLECTION_PROMPT};
use crate::state::Section;

/// Title and planning hints of one section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionBrief {
    pub title: String,
    #[serde(rename = "content")]
    pub expected_content: String,
}

impl From<&Section> for SectionBrief {
    fn from(section: &Section) -> Self {
        Self {
            title: section.title().to_string(),
            expected_content: section.expected_content().to_string(),
        }
    }
}

/// Input for reflection: the section plus its current summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReflectionInput {
    #[serde(flatten)]
    pub section: SectionBrief,
    #[serde(rename = "paragraph_latest_state")]
    pub latest_summary: String,
}

/// A search query and why it was chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPlan {
    #[serde(default)]
    pub search_query: String,
    #[serde(default)]
    pub reasoning: String,
}

impl SearchPlan {
    fn fallback(query: String, reasoning: &str) -> Self {
        Self {
            search_query: query,
            reasoning: reasoning.to_string(),
        }
    }
}

fn parse_plan(completion: &str, stage: &str, fallback: impl FnOnce() -> SearchPlan) -> SearchPlan {
    match parse_json_output::<SearchPlan>(completion) {
        Ok(plan) if !plan.search_query.trim().is_empty() => SearchPlan {
            search_query: plan.search_query.trim().to_string(),
            reasoning: plan.reasoning,
        },
        Ok(_) => {
            warn!(stage, "Completion had no search query, using fallback");
            fallback()
        }
        Err(e) => {
            warn!(stage, error = %e, "Unparseable search plan, using fallback");
            fallback()
        }
    }
}

/// Formulates the initial search query for a section.
pub struct FirstSearchStage {
    core: NodeCore,
}

impl FirstSearchStage {
    pub fn new(llm: Arc<dyn LanguageModel>, options: CompletionOptions) -> Self {
        Self {
            core: NodeCore::new(llm, options),
        }
    }
}

#[async_trait]
impl PureStage for FirstSearchStage {
    type Input = SectionBrief;
    type Output = SearchPlan;

    fn name(&self) -> &'static str {
        "first_search"
    }

    async fn run(&self, input: &SectionBrief, ctx: &TraceContext) -> StageResult<SearchPlan> {
        let completion = self
            .core
            .complete(self.name(), FIRST_SEARCH_PROMPT, input, ctx)
            .await?;

        let plan = parse_plan(&completion, self.name(), || {
            SearchPlan::fallback(
                input.title.clone(),
                "Search plan could not be parsed; searching the section title",
            )
        });
        debug!(query = %plan.search_query, "Initial search query formulated");
        Ok(plan)
    }
}

/// Formulates a follow-up query from the section's current summary.
pub struct ReflectionStage {
    core: NodeCore,
}

impl ReflectionStage {
    pub fn new(llm: Arc<dyn LanguageModel>, options: CompletionOptions) -> Self {
        Self {
            core: NodeCore::new(llm, options),
        }
    }
}

#[async_trait]
impl PureStage for ReflectionStage {
    type Input = ReflectionInput;
    type Output = SearchPlan;

    fn name(&self) -> &'static str {
        "reflection"
    }

    async fn run(&self, input: &ReflectionInput, ctx: &TraceContext) -> StageResult<SearchPlan> {
        let completion = self
            .core
            .complete(self.name(), REFLECTION_PROMPT, input, ctx)
            .await?;

        let plan = parse_plan(&completion, self.name(), || {
            SearchPlan::fallback(
                format!("{} further details", input.section.title),
                "Reflection could not be parsed; broadening the section title",
            )
        });
        debug!(query = %plan.search_query, "Reflection query formulated");
        Ok(plan)
    }
}
