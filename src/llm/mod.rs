//! Language-model capability.
//!
//! Stages talk to the model only through [`LanguageModel`], so any
//! chat-completion backend (or a scripted fake in tests) can be plugged in.

mod client;
mod types;

pub use client::ChatClient;
pub use types::*;

use async_trait::async_trait;

use crate::error::LlmResult;

/// Text completion from a system prompt and a user prompt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return the raw completion text.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> LlmResult<String>;

    /// Describe the backing model.
    fn model_info(&self) -> ModelInfo;
}
