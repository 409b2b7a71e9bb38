use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{StageRecorder, TraceContext};
use crate::config::ResearchConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::llm::{CompletionOptions, LanguageModel};
use crate::nodes::{
    FirstSearchStage, FirstSummaryStage, ReflectionInput, ReflectionStage,
    ReflectionSummaryInput, ReflectionSummaryStage, SectionBrief, StageTarget, SummaryInput,
};
use crate::search::SearchProvider;
use crate::state::{ResearchSession, SearchEvent, SearchResult};

/// Drives one section from planned to research-complete.
///
/// The initial phase (query, search, first summary) runs once, then exactly
/// `max_reflections` reflection rounds run one after another. Search failures
/// are recorded as empty search events; stage failures abort the section.
pub struct SectionProcessor {
    first_search: FirstSearchStage,
    first_summary: FirstSummaryStage,
    reflection: ReflectionStage,
    reflection_summary: ReflectionSummaryStage,
    search: Arc<dyn SearchProvider>,
    config: ResearchConfig,
    recorder: StageRecorder,
}

impl SectionProcessor {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        config: ResearchConfig,
        options: CompletionOptions,
    ) -> Self {
        Self {
            first_search: FirstSearchStage::new(llm.clone(), options),
            first_summary: FirstSummaryStage::new(llm.clone(), options),
            reflection: ReflectionStage::new(llm.clone(), options),
            reflection_summary: ReflectionSummaryStage::new(llm, options),
            search,
            config,
            recorder: StageRecorder::default(),
        }
    }

    /// Use `recorder` for stage calls
    pub fn with_recorder(mut self, recorder: StageRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Process the section at `index`.
    ///
    /// Already completed sections are left alone. A section that has a
    /// summary skips the initial phase and only runs its remaining
    /// reflection rounds, which makes this safe to call on resumed sessions.
    ///
    /// State errors come back as [`PipelineError::SectionState`] so callers
    /// can tell which section failed.
    pub async fn process(
        &self,
        session: &mut ResearchSession,
        index: usize,
        ctx: &TraceContext,
    ) -> PipelineResult<()> {
        self.process_section(session, index, ctx)
            .await
            .map_err(|e| match e {
                PipelineError::State(source) => PipelineError::SectionState {
                    section_index: index,
                    source,
                },
                other => other,
            })
    }

    async fn process_section(
        &self,
        session: &mut ResearchSession,
        index: usize,
        ctx: &TraceContext,
    ) -> PipelineResult<()> {
        let section = session.section(index)?;
        if section.research().is_completed() {
            debug!(section_index = index, "Section already completed, skipping");
            return Ok(());
        }

        let brief = SectionBrief::from(section);
        let needs_initial = section.research().latest_summary().is_empty();
        let max_reflections = self.config.max_reflections;

        info!(
            section_index = index,
            title = %brief.title,
            correlation_id = %ctx.correlation_id,
            "Processing section"
        );

        if needs_initial {
            self.initial_phase(session, index, &brief, ctx).await?;
        }

        while session.section(index)?.research().reflection_count() < max_reflections {
            self.reflection_round(session, index, &brief, ctx).await?;
            session
                .research_mut(index)?
                .complete_reflection_round(max_reflections)?;
        }

        session.research_mut(index)?.mark_completed(max_reflections)?;

        info!(
            section_index = index,
            searches = session.section(index)?.research().search_history().len(),
            reflections = max_reflections,
            "Section research completed"
        );
        Ok(())
    }

    async fn initial_phase(
        &self,
        session: &mut ResearchSession,
        index: usize,
        brief: &SectionBrief,
        ctx: &TraceContext,
    ) -> PipelineResult<()> {
        let plan = self
            .recorder
            .run_pure(&self.first_search, brief, Some(index), ctx)
            .await?;

        let search_results = self.gather_evidence(session, index, &plan.search_query).await?;

        let input = SummaryInput {
            section: brief.clone(),
            search_query: plan.search_query,
            search_results,
        };
        self.recorder
            .run_mutating(
                &self.first_summary,
                &input,
                session,
                StageTarget::Section(index),
                ctx,
            )
            .await
    }

    async fn reflection_round(
        &self,
        session: &mut ResearchSession,
        index: usize,
        brief: &SectionBrief,
        ctx: &TraceContext,
    ) -> PipelineResult<()> {
        let latest_summary = session
            .section(index)?
            .research()
            .latest_summary()
            .to_string();

        let reflection_input = ReflectionInput {
            section: brief.clone(),
            latest_summary,
        };
        let plan = self
            .recorder
            .run_pure(&self.reflection, &reflection_input, Some(index), ctx)
            .await?;

        let search_results = self.gather_evidence(session, index, &plan.search_query).await?;

        let input = ReflectionSummaryInput {
            evidence: SummaryInput {
                section: brief.clone(),
                search_query: plan.search_query,
                search_results,
            },
            latest_summary: reflection_input.latest_summary,
        };
        self.recorder
            .run_mutating(
                &self.reflection_summary,
                &input,
                session,
                StageTarget::Section(index),
                ctx,
            )
            .await
    }

    /// Search, record the event and return prompt-ready result texts.
    async fn gather_evidence(
        &self,
        session: &mut ResearchSession,
        index: usize,
        query: &str,
    ) -> PipelineResult<Vec<String>> {
        let results = self.search_or_degrade(query, index).await;
        let formatted = format_results_for_prompt(&results, self.config.max_content_length);
        session
            .research_mut(index)?
            .record_search(SearchEvent::new(query, results))?;
        Ok(formatted)
    }

    /// Run a search; timeouts and errors yield no results.
    async fn search_or_degrade(&self, query: &str, index: usize) -> Vec<SearchResult> {
        let timeout = self.config.search_timeout();
        let max_results = self.config.max_search_results;

        match tokio::time::timeout(timeout, self.search.search(query, max_results, timeout)).await
        {
            Ok(Ok(mut results)) => {
                results.truncate(max_results);
                debug!(section_index = index, results = results.len(), "Search returned");
                results
            }
            Ok(Err(e)) => {
                warn!(
                    section_index = index,
                    query = %query,
                    error = %e,
                    "Search failed, continuing without evidence"
                );
                Vec::new()
            }
            Err(_) => {
                warn!(
                    section_index = index,
                    query = %query,
                    timeout_secs = timeout.as_secs(),
                    "Search timed out, continuing without evidence"
                );
                Vec::new()
            }
        }
    }
}

/// Cap `content` at `max_length` characters, preferring a word boundary.
///
/// A cut at the last space is used when it keeps more than 80% of the
/// budget; `...` marks truncation.
pub fn truncate_content(content: &str, max_length: usize) -> String {
    if content.chars().count() <= max_length {
        return content.to_string();
    }

    let truncated: String = content.chars().take(max_length).collect();
    if let Some(pos) = truncated.rfind(' ') {
        let kept = truncated[..pos].chars().count();
        if kept as f64 > max_length as f64 * 0.8 {
            return format!("{}...", &truncated[..pos]);
        }
    }
    format!("{}...", truncated)
}

/// Result contents for a synthesis prompt; empty contents are skipped.
pub fn format_results_for_prompt(results: &[SearchResult], max_length: usize) -> Vec<String> {
    results
        .iter()
        .filter(|r| !r.content.is_empty())
        .map(|r| truncate_content(&r.content, max_length))
        .collect()
}
