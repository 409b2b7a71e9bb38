//! Infrastructure shared by all stages.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::strip_reasoning_blocks;
use crate::error::{StageError, StageResult};
use crate::llm::{CompletionOptions, LanguageModel};
use crate::pipeline::TraceContext;

/// Language model handle and sampling options composed into every stage.
#[derive(Clone)]
pub struct NodeCore {
    llm: Arc<dyn LanguageModel>,
    options: CompletionOptions,
}

impl NodeCore {
    /// Create a new core with the given model and options.
    pub fn new(llm: Arc<dyn LanguageModel>, options: CompletionOptions) -> Self {
        Self { llm, options }
    }

    /// Get a reference to the language model.
    #[inline]
    pub fn llm(&self) -> &dyn LanguageModel {
        self.llm.as_ref()
    }

    #[inline]
    pub fn options(&self) -> &CompletionOptions {
        &self.options
    }

    /// Send `input` as a JSON user prompt and return the cleaned completion.
    ///
    /// Input that cannot be serialized fails with [`StageError::InvalidInput`]
    /// before the model is called. Provider failures are propagated; output
    /// that is empty once reasoning blocks are removed is reported as
    /// [`StageError::EmptyOutput`].
    pub async fn complete<T: Serialize + Sync>(
        &self,
        stage: &'static str,
        system_prompt: &str,
        input: &T,
        ctx: &TraceContext,
    ) -> StageResult<String> {
        let user_prompt = user_prompt(input, stage)?;

        debug!(
            stage,
            correlation_id = %ctx.correlation_id,
            prompt_chars = user_prompt.len(),
            "Requesting completion"
        );

        let raw = self
            .llm
            .complete(system_prompt, &user_prompt, &self.options)
            .await
            .map_err(|source| StageError::Llm { stage, source })?;

        let cleaned = strip_reasoning_blocks(&raw);
        if cleaned.is_empty() {
            return Err(StageError::EmptyOutput { stage });
        }
        Ok(cleaned)
    }
}

fn user_prompt<T: Serialize>(input: &T, stage: &'static str) -> StageResult<String> {
    serde_json::to_string(input).map_err(|e| StageError::InvalidInput {
        stage,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::MockLanguageModel;
    use serde_json::json;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_complete_sends_json_prompt_and_strips_reasoning() {
        let mut llm = MockLanguageModel::new();
        llm.expect_complete()
            .withf(|system, user, _| system == "sys" && user == r#"{"title":"T"}"#)
            .times(1)
            .returning(|_, _, _| Ok("<think>hmm</think>answer".to_string()));

        let core = NodeCore::new(Arc::new(llm), CompletionOptions::default());
        let out = core
            .complete("summary", "sys", &json!({"title": "T"}), &TraceContext::new())
            .await
            .unwrap();
        assert_eq!(out, "answer");
    }

    #[tokio::test]
    async fn test_complete_propagates_llm_failure() {
        let mut llm = MockLanguageModel::new();
        llm.expect_complete()
            .returning(|_, _, _| Err(LlmError::Timeout { timeout_ms: 10 }));

        let core = NodeCore::new(Arc::new(llm), CompletionOptions::default());
        let err = core
            .complete("summary", "sys", &json!({}), &TraceContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Llm { stage: "summary", .. }));
    }

    #[tokio::test]
    async fn test_complete_rejects_reasoning_only_output() {
        let mut llm = MockLanguageModel::new();
        llm.expect_complete()
            .returning(|_, _, _| Ok("<think>only thoughts</think>".to_string()));

        let core = NodeCore::new(Arc::new(llm), CompletionOptions::default());
        let err = core
            .complete("summary", "sys", &json!({}), &TraceContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::EmptyOutput { stage: "summary" }));
    }

    #[tokio::test]
    async fn test_unserializable_input_never_reaches_model() {
        let mut llm = MockLanguageModel::new();
        llm.expect_complete().times(0);

        // JSON object keys must be strings.
        let input: HashMap<(u32, u32), u32> = HashMap::from([((1, 2), 3)]);

        let core = NodeCore::new(Arc::new(llm), CompletionOptions::default());
        let err = core
            .complete("summary", "sys", &input, &TraceContext::new())
            .await
            .unwrap_err();
        match err {
            StageError::InvalidInput { stage, message } => {
                assert_eq!(stage, "summary");
                assert!(message.contains("key must be a string"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
