//! # Deep Research
//!
//! Turns a free-text research query into a structured Markdown report.
//!
//! A run plans an outline of sections, then researches each section in
//! order: one initial web search and summary, followed by a fixed number of
//! reflection rounds that reformulate the query, search again and rewrite
//! the summary. The finished sections are assembled into one document.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator ─▶ OutlineStage
//!      │
//!      ├─▶ SectionProcessor ─▶ FirstSearch / FirstSummary
//!      │                   └─▶ Reflection / ReflectionSummary (× max_reflections)
//!      │            │
//!      │            ├─▶ LanguageModel (chat completions over HTTP)
//!      │            └─▶ SearchProvider (Tavily)
//!      │
//!      ├─▶ FormattingStage (plain rendering on failure)
//!      └─▶ Storage (SQLite checkpoints + stage log)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use deep_research::{ChatClient, CompletionOptions, Config, Orchestrator, TavilyClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let llm = ChatClient::new(&config.llm, config.request.clone())?;
//!     let search = TavilyClient::new(&config.search)?;
//!     let options = CompletionOptions::default()
//!         .with_temperature(config.llm.temperature)
//!         .with_max_tokens(config.llm.max_tokens);
//!
//!     let mut orchestrator =
//!         Orchestrator::new(Arc::new(llm), Arc::new(search), config.research, options);
//!     let report = orchestrator.research("Quantum computing overview").await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

/// Environment configuration.
pub mod config;
/// Error types and result aliases for every layer.
pub mod error;
/// Language-model capability and the chat-completions client.
pub mod llm;
/// Pipeline stages: outline, query formulation, summaries, formatting.
pub mod nodes;
/// Session documents and report artifacts on disk.
pub mod persistence;
/// Section processing and end-to-end orchestration.
pub mod pipeline;
/// System prompts for each stage.
pub mod prompts;
/// Web search capability and the Tavily client.
pub mod search;
/// Research state model.
pub mod state;
/// SQLite checkpoint store and stage invocation log.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult, PipelineError};
pub use llm::{ChatClient, CompletionOptions, LanguageModel};
pub use pipeline::{Orchestrator, SectionProcessor, TraceContext};
pub use search::{SearchProvider, TavilyClient};
pub use state::{ProgressSummary, ResearchSession, SessionStatus};
pub use storage::{SqliteStorage, Storage};
