//! Research pipeline control flow.
//!
//! [`Orchestrator`] sequences outline planning, per-section research and
//! final assembly. [`SectionProcessor`] drives a single section through its
//! initial search and the bounded reflection loop. Every stage call goes
//! through [`StageRecorder`], which times it, logs it inside a tracing span
//! and attaches the stage name and section index to failures.

mod context;
mod orchestrator;
mod section;

pub use context::TraceContext;
pub use orchestrator::Orchestrator;
pub use section::{format_results_for_prompt, truncate_content, SectionProcessor};

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::{PipelineError, PipelineResult, StageError};
use crate::nodes::{MutatingStage, PureStage, StageTarget};
use crate::state::ResearchSession;
use crate::storage::{Invocation, Storage};

/// Runs stages with timing, tracing and optional invocation logging.
#[derive(Clone, Default)]
pub struct StageRecorder {
    storage: Option<Arc<dyn Storage>>,
}

impl StageRecorder {
    pub fn new(storage: Option<Arc<dyn Storage>>) -> Self {
        Self { storage }
    }

    /// Run a pure stage.
    pub async fn run_pure<S: PureStage>(
        &self,
        stage: &S,
        input: &S::Input,
        section_index: Option<usize>,
        ctx: &TraceContext,
    ) -> PipelineResult<S::Output> {
        let span = info_span!(
            "stage",
            stage = stage.name(),
            section_index = ?section_index,
            correlation_id = %ctx.correlation_id
        );
        let start = Instant::now();
        let result = stage.run(input, ctx).instrument(span).await;
        let latency = start.elapsed().as_millis() as i64;

        let outcome = result
            .as_ref()
            .map(|output| serialize_for_log(output, stage.name()));
        self.record(stage.name(), input, section_index, ctx, outcome, latency)
            .await;

        result.map_err(|source| PipelineError::StageFailed {
            stage: stage.name(),
            section_index,
            source,
        })
    }

    /// Run a mutating stage against `session`.
    pub async fn run_mutating<S: MutatingStage>(
        &self,
        stage: &S,
        input: &S::Input,
        session: &mut ResearchSession,
        target: StageTarget,
        ctx: &TraceContext,
    ) -> PipelineResult<()> {
        let section_index = target.section_index();
        let span = info_span!(
            "stage",
            stage = stage.name(),
            section_index = ?section_index,
            correlation_id = %ctx.correlation_id
        );
        let start = Instant::now();
        let result = stage
            .mutate_state(input, session, target, ctx)
            .instrument(span)
            .await;
        let latency = start.elapsed().as_millis() as i64;

        let outcome = result
            .as_ref()
            .map(|_| mutation_output(session, target));
        self.record(stage.name(), input, section_index, ctx, outcome, latency)
            .await;

        result.map_err(|source| PipelineError::StageFailed {
            stage: stage.name(),
            section_index,
            source,
        })
    }

    async fn record<I: Serialize>(
        &self,
        stage: &'static str,
        input: &I,
        section_index: Option<usize>,
        ctx: &TraceContext,
        outcome: Result<serde_json::Value, &StageError>,
        latency: i64,
    ) {
        match &outcome {
            Ok(_) => info!(
                stage,
                section_index = ?section_index,
                correlation_id = %ctx.correlation_id,
                latency_ms = latency,
                "Stage completed"
            ),
            Err(e) => error!(
                stage,
                section_index = ?section_index,
                correlation_id = %ctx.correlation_id,
                error = %e,
                latency_ms = latency,
                "Stage failed"
            ),
        }

        let Some(storage) = &self.storage else {
            return;
        };

        let mut invocation = Invocation::new(stage, serialize_for_log(input, stage))
            .with_correlation(&ctx.correlation_id);
        if let Some(session_id) = &ctx.session_id {
            invocation = invocation.with_session(session_id);
        }
        if let Some(index) = section_index {
            invocation = invocation.with_section(index);
        }
        invocation = match outcome {
            Ok(output) => invocation.success(output, latency),
            Err(e) => invocation.failure(e.to_string(), latency),
        };

        if let Err(e) = storage.log_invocation(&invocation).await {
            warn!(stage, error = %e, "Failed to log stage invocation");
        }
    }
}

/// What a mutating stage changed, for the invocation log.
fn mutation_output(session: &ResearchSession, target: StageTarget) -> serde_json::Value {
    match target {
        StageTarget::Session => serde_json::json!({
            "report_title": session.report_title(),
            "sections": session.sections().len(),
        }),
        StageTarget::Section(index) => serde_json::json!({
            "latest_summary": session
                .sections()
                .get(index)
                .map(|s| s.research().latest_summary())
                .unwrap_or_default(),
        }),
    }
}

/// Serialize a value for the invocation log, logging failures.
pub(crate) fn serialize_for_log<T: Serialize>(value: &T, context: &str) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(
            error = %e,
            context = %context,
            "Failed to serialize value for invocation log"
        );
        serde_json::json!({
            "serialization_error": e.to_string(),
            "context": context
        })
    })
}
