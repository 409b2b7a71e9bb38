use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{parse_json_output, MutatingStage, NodeCore, StageTarget};
use crate::error::{StageError, StageResult};
use crate::llm::{CompletionOptions, LanguageModel};
use crate::pipeline::TraceContext;
use crate::prompts::OUTLINE_PROMPT;
use crate::state::{ResearchSession, Section};

/// Input for outline planning
#[derive(Debug, Clone, Serialize)]
pub struct OutlineInput {
    pub query: String,
    /// Advisory cap written into the prompt.
    pub max_sections: usize,
}

impl OutlineInput {
    pub fn new(query: impl Into<String>, max_sections: usize) -> Self {
        Self {
            query: query.into(),
            max_sections,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlannedSection {
    #[serde(default)]
    title: String,
    #[serde(default, alias = "expected_content")]
    content: String,
}

/// Plans the report outline and installs it on the session.
pub struct OutlineStage {
    core: NodeCore,
}

impl OutlineStage {
    pub fn new(llm: Arc<dyn LanguageModel>, options: CompletionOptions) -> Self {
        Self {
            core: NodeCore::new(llm, options),
        }
    }

    fn report_title(query: &str) -> String {
        format!("Deep Research Report: {}", query)
    }
}

/// Turn the completion into sections, falling back to a generic two-part outline.
fn parse_outline(completion: &str, query: &str) -> Vec<Section> {
    let planned: Vec<PlannedSection> = match parse_json_output(completion) {
        Ok(planned) => planned,
        Err(e) => {
            warn!(error = %e, "Unparseable outline, using default sections");
            return default_outline(query);
        }
    };

    let sections: Vec<Section> = planned
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let title = if p.title.trim().is_empty() {
                format!("Section {}", i + 1)
            } else {
                p.title.trim().to_string()
            };
            Section::new(title, p.content.trim())
        })
        .collect();

    if sections.is_empty() {
        warn!("Outline contained no sections, using default sections");
        return default_outline(query);
    }
    sections
}

fn default_outline(query: &str) -> Vec<Section> {
    vec![
        Section::new(
            "Overview",
            format!("General overview and background of '{}'", query),
        ),
        Section::new(
            "Detailed Analysis",
            format!("In-depth analysis of '{}'", query),
        ),
    ]
}

#[async_trait]
impl MutatingStage for OutlineStage {
    type Input = OutlineInput;

    fn name(&self) -> &'static str {
        "outline"
    }

    async fn mutate_state(
        &self,
        input: &OutlineInput,
        session: &mut ResearchSession,
        target: StageTarget,
        ctx: &TraceContext,
    ) -> StageResult<()> {
        if target != StageTarget::Session {
            return Err(StageError::UnsupportedTarget {
                stage: self.name(),
                target: target.to_string(),
            });
        }

        let completion = self
            .core
            .complete(self.name(), OUTLINE_PROMPT, input, ctx)
            .await?;
        let sections = parse_outline(&completion, &input.query);

        if sections.len() > input.max_sections {
            warn!(
                planned = sections.len(),
                max_sections = input.max_sections,
                "Outline exceeds the advisory section cap"
            );
        }

        let count = sections.len();
        session.set_outline(Self::report_title(&input.query), sections)?;

        info!(
            session_id = %session.id(),
            sections = count,
            "Report outline planned"
        );
        Ok(())
    }
}
