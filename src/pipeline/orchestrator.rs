use std::sync::Arc;
use tracing::{info, warn};

use super::{SectionProcessor, StageRecorder, TraceContext};
use crate::config::ResearchConfig;
use crate::error::{PipelineError, PipelineResult, StateError};
use crate::llm::{CompletionOptions, LanguageModel};
use crate::nodes::{
    render_fallback_report, FormattingStage, OutlineInput, OutlineStage, ReportInput, StageTarget,
};
use crate::search::SearchProvider;
use crate::state::{ProgressSummary, ResearchSession, SessionStatus};
use crate::storage::Storage;

/// Runs a research session end to end.
///
/// Holds one instance of each stage and at most one live session. Sections
/// are processed strictly one at a time in outline order; callers that need
/// to stop early can drive the run with [`Orchestrator::process_next_section`]
/// and stop between sections.
pub struct Orchestrator {
    outline: OutlineStage,
    sections: SectionProcessor,
    formatting: FormattingStage,
    config: ResearchConfig,
    recorder: StageRecorder,
    storage: Option<Arc<dyn Storage>>,
    session: Option<ResearchSession>,
    ctx: TraceContext,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        config: ResearchConfig,
        options: CompletionOptions,
    ) -> Self {
        Self {
            outline: OutlineStage::new(llm.clone(), options),
            sections: SectionProcessor::new(llm.clone(), search, config.clone(), options),
            formatting: FormattingStage::new(llm, options),
            config,
            recorder: StageRecorder::default(),
            storage: None,
            session: None,
            ctx: TraceContext::new(),
        }
    }

    /// Checkpoint snapshots and log stage calls to `storage`.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.recorder = StageRecorder::new(Some(storage.clone()));
        self.sections = self.sections.with_recorder(self.recorder.clone());
        self.storage = Some(storage);
        self
    }

    /// Run a complete research session for `query` and return the report.
    pub async fn research(&mut self, query: &str) -> PipelineResult<String> {
        self.start(query)?;
        self.run_to_completion().await
    }

    /// Continue a previously saved session and return the report.
    pub async fn resume(&mut self, session: ResearchSession) -> PipelineResult<String> {
        self.load_session(session)?;
        self.run_to_completion().await
    }

    /// Create a fresh session. Fails while another session is unfinished.
    pub fn start(&mut self, query: &str) -> PipelineResult<&ResearchSession> {
        if query.trim().is_empty() {
            return Err(PipelineError::Validation {
                field: "query".to_string(),
                reason: "Query cannot be empty".to_string(),
            });
        }
        self.install(ResearchSession::new(query.trim()))?;
        info!(
            session_id = %self.ctx.session_label(),
            correlation_id = %self.ctx.correlation_id,
            query = %query,
            "Research session started"
        );
        self.session.as_ref().ok_or(PipelineError::NoSession)
    }

    /// Adopt an existing session, e.g. one loaded from a state file.
    ///
    /// Sessions with more reflection rounds than `max_reflections` allows
    /// are rejected.
    pub fn load_session(&mut self, session: ResearchSession) -> PipelineResult<()> {
        info!(
            session_id = %session.id(),
            status = %session.status(),
            progress = session.progress().progress_percentage,
            "Research session loaded"
        );
        let max = self.config.max_reflections;
        for (index, section) in session.sections().iter().enumerate() {
            let count = section.research().reflection_count();
            if count > max {
                return Err(PipelineError::Validation {
                    field: "sections".to_string(),
                    reason: format!(
                        "section {} ('{}') has {} reflection rounds, more than the configured {}",
                        index,
                        section.title(),
                        count,
                        max
                    ),
                });
            }
        }
        self.install(session)
    }

    fn install(&mut self, session: ResearchSession) -> PipelineResult<()> {
        if let Some(current) = &self.session {
            if current.status() != SessionStatus::Completed {
                return Err(PipelineError::SessionAlreadyStarted);
            }
        }
        self.ctx = TraceContext::new().with_session(session.id());
        self.session = Some(session);
        Ok(())
    }

    /// Plan the outline of the current session.
    pub async fn plan_outline(&mut self) -> PipelineResult<()> {
        let session = self.session.as_mut().ok_or(PipelineError::NoSession)?;
        let input = OutlineInput::new(session.query(), self.config.max_sections);

        self.recorder
            .run_mutating(
                &self.outline,
                &input,
                session,
                StageTarget::Session,
                &self.ctx,
            )
            .await?;

        self.checkpoint().await;
        Ok(())
    }

    /// Process the next pending section.
    ///
    /// Returns the index of the processed section, or `None` when every
    /// section is done. The session is checkpointed even when the section
    /// fails, so a later resume starts from the last committed state.
    pub async fn process_next_section(&mut self) -> PipelineResult<Option<usize>> {
        let session = self.session.as_mut().ok_or(PipelineError::NoSession)?;
        if session.status() != SessionStatus::InProgress {
            return Ok(None);
        }
        let Some(index) = session.next_pending_section() else {
            return Ok(None);
        };

        let total = session.sections().len();
        info!(
            section = index + 1,
            total,
            correlation_id = %self.ctx.correlation_id,
            "Researching section"
        );

        let result = self.sections.process(session, index, &self.ctx).await;
        self.checkpoint().await;
        result.map(|_| Some(index))
    }

    /// Assemble the final report and complete the session.
    ///
    /// A formatting failure falls back to a deterministic rendering, so this
    /// only fails on ordering errors.
    pub async fn finalize(&mut self) -> PipelineResult<&str> {
        let session = self.session.as_mut().ok_or(PipelineError::NoSession)?;
        if !session.all_sections_completed() {
            return Err(PipelineError::Validation {
                field: "sections".to_string(),
                reason: format!(
                    "{} of {} sections completed",
                    session.progress().completed_sections,
                    session.sections().len()
                ),
            });
        }

        let input = ReportInput::from_session(session);
        let report = match self
            .recorder
            .run_pure(&self.formatting, &input, None, &self.ctx)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Report formatting failed, using plain rendering");
                render_fallback_report(&input)
            }
        };

        session.set_final_report(report)?;
        session.mark_completed()?;
        info!(
            session_id = %session.id(),
            sections = session.sections().len(),
            "Research completed"
        );

        self.checkpoint().await;
        self.final_report()
    }

    /// Drive the current session from wherever it is to completion.
    pub async fn run_to_completion(&mut self) -> PipelineResult<String> {
        let status = self
            .session
            .as_ref()
            .map(ResearchSession::status)
            .ok_or(PipelineError::NoSession)?;

        if status == SessionStatus::Created {
            self.plan_outline().await?;
        }
        if status != SessionStatus::Completed {
            while self.process_next_section().await?.is_some() {}
            self.finalize().await?;
        }
        self.final_report().map(str::to_string)
    }

    fn final_report(&self) -> PipelineResult<&str> {
        let session = self.session.as_ref().ok_or(PipelineError::NoSession)?;
        session
            .final_report()
            .ok_or(PipelineError::State(StateError::FinalReportMissing))
    }

    /// Progress of the current session; all zeros when there is none.
    pub fn progress(&self) -> ProgressSummary {
        self.session
            .as_ref()
            .map(ResearchSession::progress)
            .unwrap_or_default()
    }

    pub fn session(&self) -> Option<&ResearchSession> {
        self.session.as_ref()
    }

    /// Hand the session back to the caller, leaving the orchestrator idle.
    pub fn take_session(&mut self) -> Option<ResearchSession> {
        self.session.take()
    }

    pub fn trace_context(&self) -> &TraceContext {
        &self.ctx
    }

    async fn checkpoint(&self) {
        let (Some(storage), Some(session)) = (&self.storage, &self.session) else {
            return;
        };
        if let Err(e) = storage.save_snapshot(session).await {
            warn!(
                session_id = %session.id(),
                error = %e,
                "Failed to checkpoint session"
            );
        }
    }
}
