use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use super::{strip_code_fences, NodeCore, PureStage};
use crate::error::{StageError, StageResult};
use crate::llm::{CompletionOptions, LanguageModel};
use crate::pipeline::TraceContext;
use crate::prompts::FORMATTING_PROMPT;
use crate::state::ResearchSession;

/// One finished section handed to the formatter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    pub title: String,
    #[serde(rename = "paragraph_latest_state")]
    pub content: String,
}

/// Everything needed to render the final document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportInput {
    pub report_title: String,
    pub sections: Vec<ReportSection>,
}

impl ReportInput {
    /// Collect titles and latest summaries in outline order
    pub fn from_session(session: &ResearchSession) -> Self {
        Self {
            report_title: session.report_title().to_string(),
            sections: session
                .sections()
                .iter()
                .map(|s| ReportSection {
                    title: s.title().to_string(),
                    content: s.research().latest_summary().to_string(),
                })
                .collect(),
        }
    }
}

/// Deterministic Markdown rendering used when the formatter fails. Never fails.
pub fn render_fallback_report(input: &ReportInput) -> String {
    let mut report = format!("# {}\n\n", input.report_title);
    for section in &input.sections {
        report.push_str(&format!("## {}\n\n{}\n\n", section.title, section.content));
    }
    report
}

/// Renders the final report through the language model.
pub struct FormattingStage {
    core: NodeCore,
}

impl FormattingStage {
    pub fn new(llm: Arc<dyn LanguageModel>, options: CompletionOptions) -> Self {
        Self {
            core: NodeCore::new(llm, options),
        }
    }
}

#[async_trait]
impl PureStage for FormattingStage {
    type Input = ReportInput;
    type Output = String;

    fn name(&self) -> &'static str {
        "formatting"
    }

    async fn run(&self, input: &ReportInput, ctx: &TraceContext) -> StageResult<String> {
        let completion = self
            .core
            .complete(self.name(), FORMATTING_PROMPT, input, ctx)
            .await?;

        let document = strip_code_fences(&completion);
        if document.is_empty() {
            return Err(StageError::EmptyOutput { stage: self.name() });
        }
        if document.starts_with('#') {
            Ok(document)
        } else {
            Ok(format!("# {}\n\n{}", input.report_title, document))
        }
    }
}
