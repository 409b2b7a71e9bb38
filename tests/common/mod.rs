//! Shared fakes for integration tests.
//!
//! `ScriptedLlm` answers each stage by recognising its system prompt and
//! building a plausible JSON reply from the user prompt. `FakeSearch` returns
//! canned results, fails every call, or never answers.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use deep_research::config::ResearchConfig;
use deep_research::error::{LlmError, LlmResult, SearchClientResult, SearchError};
use deep_research::llm::{CompletionOptions, LanguageModel, ModelInfo};
use deep_research::prompts;
use deep_research::search::SearchProvider;
use deep_research::state::SearchResult;

/// Pipeline stage recognised from its system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Outline,
    FirstSearch,
    FirstSummary,
    Reflection,
    ReflectionSummary,
    Formatting,
}

impl Stage {
    fn from_prompt(system_prompt: &str) -> Option<Self> {
        [
            (prompts::OUTLINE_PROMPT, Stage::Outline),
            (prompts::FIRST_SEARCH_PROMPT, Stage::FirstSearch),
            (prompts::FIRST_SUMMARY_PROMPT, Stage::FirstSummary),
            (prompts::REFLECTION_PROMPT, Stage::Reflection),
            (prompts::REFLECTION_SUMMARY_PROMPT, Stage::ReflectionSummary),
            (prompts::FORMATTING_PROMPT, Stage::Formatting),
        ]
        .into_iter()
        .find(|(prompt, _)| *prompt == system_prompt)
        .map(|(_, stage)| stage)
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Always,
    /// Fail only the n-th call (1-based) of the stage.
    OnCall(usize),
}

/// Language model fake driven by stage.
pub struct ScriptedLlm {
    outline: Vec<(String, String)>,
    failures: HashMap<Stage, Failure>,
    calls: Mutex<Vec<Stage>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            outline: vec![
                ("Background".to_string(), "Where the topic comes from".to_string()),
                ("Outlook".to_string(), "Where the topic is heading".to_string()),
            ],
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Plan exactly these `(title, content)` sections.
    pub fn with_outline(mut self, sections: &[(&str, &str)]) -> Self {
        self.outline = sections
            .iter()
            .map(|(t, c)| (t.to_string(), c.to_string()))
            .collect();
        self
    }

    /// Fail every call of `stage`.
    pub fn failing(mut self, stage: Stage) -> Self {
        self.failures.insert(stage, Failure::Always);
        self
    }

    /// Fail only the `n`-th call of `stage`.
    pub fn failing_on_call(mut self, stage: Stage, n: usize) -> Self {
        self.failures.insert(stage, Failure::OnCall(n));
        self
    }

    /// Stages called so far, in order.
    pub fn calls(&self) -> Vec<Stage> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, stage: Stage) -> usize {
        self.calls().iter().filter(|s| **s == stage).count()
    }

    fn respond(&self, stage: Stage, input: &Value) -> String {
        let title = input["title"].as_str().unwrap_or_default();
        match stage {
            Stage::Outline => {
                let sections: Vec<Value> = self
                    .outline
                    .iter()
                    .map(|(t, c)| json!({"title": t, "content": c}))
                    .collect();
                Value::Array(sections).to_string()
            }
            Stage::FirstSearch => json!({
                "search_query": format!("{} basics", title),
                "reasoning": "start broad"
            })
            .to_string(),
            Stage::FirstSummary => json!({
                "paragraph_latest_state": format!("Summary of {}.", title)
            })
            .to_string(),
            Stage::Reflection => json!({
                "search_query": format!("{} details", title),
                "reasoning": "fill gaps"
            })
            .to_string(),
            Stage::ReflectionSummary => {
                let previous = input["paragraph_latest_state"].as_str().unwrap_or_default();
                json!({
                    "updated_paragraph_latest_state": format!("{} Refined.", previous)
                })
                .to_string()
            }
            Stage::Formatting => {
                let mut doc = format!("# {}\n\n", input["report_title"].as_str().unwrap_or_default());
                for section in input["sections"].as_array().cloned().unwrap_or_default() {
                    doc.push_str(&format!(
                        "## {}\n\n{}\n\n",
                        section["title"].as_str().unwrap_or_default(),
                        section["paragraph_latest_state"].as_str().unwrap_or_default()
                    ));
                }
                doc
            }
        }
    }
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _options: &CompletionOptions,
    ) -> LlmResult<String> {
        let stage = Stage::from_prompt(system_prompt).ok_or_else(|| LlmError::InvalidResponse {
            message: "unknown system prompt".to_string(),
        })?;

        let nth = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(stage);
            calls.iter().filter(|s| **s == stage).count()
        };

        match self.failures.get(&stage) {
            Some(Failure::Always) => {
                return Err(LlmError::Unavailable {
                    message: format!("{:?} unavailable", stage),
                    retries: 0,
                })
            }
            Some(Failure::OnCall(n)) if *n == nth => {
                return Err(LlmError::Unavailable {
                    message: format!("{:?} unavailable", stage),
                    retries: 0,
                })
            }
            _ => {}
        }

        let input: Value = serde_json::from_str(user_prompt).unwrap_or(Value::Null);
        Ok(self.respond(stage, &input))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "scripted".to_string(),
            model: "scripted".to_string(),
            base_url: "memory://".to_string(),
        }
    }
}

/// How `FakeSearch` answers a query.
enum SearchBehavior {
    Results(Vec<SearchResult>),
    TimeOut,
    Hang,
}

/// Search fake returning the same results for every query, or failing.
pub struct FakeSearch {
    behavior: SearchBehavior,
    queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    fn new(behavior: SearchBehavior) -> Self {
        Self {
            behavior,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Two results per query.
    pub fn with_results() -> Self {
        Self::new(SearchBehavior::Results(vec![
            SearchResult::new("https://example.com/a", "Result A", "Evidence from A.")
                .with_score(0.9),
            SearchResult::new("https://example.com/b", "Result B", "Evidence from B.")
                .with_score(0.7),
        ]))
    }

    /// Every call reports a provider timeout.
    pub fn timing_out() -> Self {
        Self::new(SearchBehavior::TimeOut)
    }

    /// Every call waits an hour and ignores its timeout.
    pub fn hanging() -> Self {
        Self::new(SearchBehavior::Hang)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        timeout: Duration,
    ) -> SearchClientResult<Vec<SearchResult>> {
        self.queries.lock().unwrap().push(query.to_string());
        match &self.behavior {
            SearchBehavior::Results(results) => {
                Ok(results.iter().take(max_results).cloned().collect())
            }
            SearchBehavior::TimeOut => Err(SearchError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
            SearchBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

/// Research bounds used across integration tests.
pub fn research_config(max_reflections: u32) -> ResearchConfig {
    ResearchConfig {
        max_reflections,
        search_timeout_secs: 5,
        ..ResearchConfig::default()
    }
}
