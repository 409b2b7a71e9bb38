//! Research state model.
//!
//! A [`ResearchSession`] is the durable record of one research run: the user
//! query, the planned outline, per-section research progress and the final
//! report. Fields are private; every mutation goes through a method that
//! enforces the lifecycle invariants and fails with [`StateError`] otherwise.
//!
//! ```text
//! Created --set_outline--> InProgress --set_final_report + mark_completed--> Completed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StateError, StateResult};

/// Lifecycle status of a research session. Transitions are monotonic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session exists, outline not yet planned.
    #[default]
    Created,
    /// Outline planned, sections being researched.
    InProgress,
    /// Final report written.
    Completed,
}

impl SessionStatus {
    /// Get the status name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(SessionStatus::Created),
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// A single hit returned by the search collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub content: String,
    /// Relevance score reported by the provider, if any.
    pub relevance_score: Option<f64>,
}

impl SearchResult {
    /// Create a result without a relevance score
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            relevance_score: None,
        }
    }

    /// Set the relevance score
    pub fn with_score(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }
}

/// One search performed for a section. Empty `results` records a degraded search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEvent {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub performed_at: DateTime<Utc>,
}

impl SearchEvent {
    /// Record a search performed now
    pub fn new(query: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            query: query.into(),
            results,
            performed_at: Utc::now(),
        }
    }

    /// Whether the search yielded no evidence
    pub fn is_degraded(&self) -> bool {
        self.results.is_empty()
    }
}

/// Research progress owned by exactly one section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchProgress {
    search_history: Vec<SearchEvent>,
    reflection_count: u32,
    latest_summary: String,
    completed: bool,
}

impl ResearchProgress {
    /// Searches performed for this section, oldest first.
    pub fn search_history(&self) -> &[SearchEvent] {
        &self.search_history
    }

    /// Reflection rounds executed so far.
    pub fn reflection_count(&self) -> u32 {
        self.reflection_count
    }

    /// Most recent synthesis for the section; empty until the first summary.
    pub fn latest_summary(&self) -> &str {
        &self.latest_summary
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Append a search event. History is append-only.
    pub fn record_search(&mut self, event: SearchEvent) -> StateResult<()> {
        self.ensure_open()?;
        self.search_history.push(event);
        Ok(())
    }

    /// Replace the latest summary.
    pub fn replace_summary(&mut self, summary: impl Into<String>) -> StateResult<()> {
        self.ensure_open()?;
        self.latest_summary = summary.into();
        Ok(())
    }

    /// Count one executed reflection round, bounded by `max_reflections`.
    pub fn complete_reflection_round(&mut self, max_reflections: u32) -> StateResult<()> {
        self.ensure_open()?;
        if self.reflection_count >= max_reflections {
            return Err(StateError::ReflectionLimitExceeded {
                count: self.reflection_count + 1,
                max: max_reflections,
            });
        }
        self.reflection_count += 1;
        Ok(())
    }

    /// Mark research finished. Requires a non-empty summary.
    pub fn mark_completed(&mut self, max_reflections: u32) -> StateResult<()> {
        self.ensure_open()?;
        if self.latest_summary.trim().is_empty() {
            return Err(StateError::SummaryMissing);
        }
        if self.reflection_count > max_reflections {
            return Err(StateError::ReflectionLimitExceeded {
                count: self.reflection_count,
                max: max_reflections,
            });
        }
        self.completed = true;
        Ok(())
    }

    fn ensure_open(&self) -> StateResult<()> {
        if self.completed {
            return Err(StateError::ResearchClosed);
        }
        Ok(())
    }
}

/// One planned subdivision of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    title: String,
    expected_content: String,
    research: ResearchProgress,
}

impl Section {
    /// Create a freshly planned section
    pub fn new(title: impl Into<String>, expected_content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            expected_content: expected_content.into(),
            research: ResearchProgress::default(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Planning hints produced by the outline stage.
    pub fn expected_content(&self) -> &str {
        &self.expected_content
    }

    pub fn research(&self) -> &ResearchProgress {
        &self.research
    }

    /// A section counts as done once completed with a non-empty summary.
    pub fn is_completed(&self) -> bool {
        self.research.completed && !self.research.latest_summary.is_empty()
    }
}

/// Snapshot of how far a session has progressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total_sections: usize,
    pub completed_sections: usize,
    pub progress_percentage: f64,
    pub is_completed: bool,
}

/// The complete research record for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchSession {
    id: String,
    query: String,
    report_title: String,
    sections: Vec<Section>,
    status: SessionStatus,
    final_report: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResearchSession {
    /// Create a new session for `query` with no outline.
    pub fn new(query: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.into(),
            report_title: String::new(),
            sections: Vec::new(),
            status: SessionStatus::Created,
            final_report: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn report_title(&self) -> &str {
        &self.report_title
    }

    /// Sections in document order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, index: usize) -> StateResult<&Section> {
        self.sections
            .get(index)
            .ok_or(StateError::SectionOutOfRange {
                index,
                len: self.sections.len(),
            })
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn final_report(&self) -> Option<&str> {
        self.final_report.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Install the planned outline. Allowed once, from `Created`.
    pub fn set_outline(
        &mut self,
        report_title: impl Into<String>,
        sections: Vec<Section>,
    ) -> StateResult<()> {
        if self.status != SessionStatus::Created || !self.sections.is_empty() {
            return Err(StateError::OutlineAlreadySet);
        }
        if sections.is_empty() {
            return Err(StateError::EmptyOutline);
        }
        self.report_title = report_title.into();
        self.sections = sections;
        self.status = SessionStatus::InProgress;
        self.touch();
        Ok(())
    }

    /// Exclusive access to one section's research progress.
    pub fn research_mut(&mut self, index: usize) -> StateResult<&mut ResearchProgress> {
        self.expect_status(SessionStatus::InProgress)?;
        let len = self.sections.len();
        let section = self
            .sections
            .get_mut(index)
            .ok_or(StateError::SectionOutOfRange { index, len })?;
        if section.research.completed {
            return Err(StateError::SectionAlreadyCompleted { index });
        }
        self.updated_at = Utc::now();
        Ok(&mut section.research)
    }

    /// Index of the first section that still needs processing.
    pub fn next_pending_section(&self) -> Option<usize> {
        self.sections.iter().position(|s| !s.research.completed)
    }

    /// Whether every section has finished its research.
    pub fn all_sections_completed(&self) -> bool {
        !self.sections.is_empty() && self.sections.iter().all(Section::is_completed)
    }

    /// Write the final report. Allowed once, while `InProgress`.
    pub fn set_final_report(&mut self, report: impl Into<String>) -> StateResult<()> {
        if self.final_report.is_some() {
            return Err(StateError::FinalReportAlreadySet);
        }
        self.expect_status(SessionStatus::InProgress)?;
        let report = report.into();
        if report.trim().is_empty() {
            return Err(StateError::EmptyFinalReport);
        }
        self.final_report = Some(report);
        self.touch();
        Ok(())
    }

    /// Flip the session to `Completed`. Requires the final report.
    pub fn mark_completed(&mut self) -> StateResult<()> {
        if self.status == SessionStatus::Completed {
            return Err(StateError::AlreadyCompleted);
        }
        if self.final_report.as_deref().map_or(true, str::is_empty) {
            return Err(StateError::FinalReportMissing);
        }
        self.status = SessionStatus::Completed;
        self.touch();
        Ok(())
    }

    /// Progress computed from the current snapshot.
    pub fn progress(&self) -> ProgressSummary {
        let total = self.sections.len();
        let completed = self.sections.iter().filter(|s| s.is_completed()).count();
        ProgressSummary {
            total_sections: total,
            completed_sections: completed,
            progress_percentage: if total > 0 {
                completed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            is_completed: self.status == SessionStatus::Completed,
        }
    }

    /// Check the cross-field invariants of a session built from untrusted data.
    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query is empty".to_string());
        }
        let has_report = self.final_report.as_deref().is_some_and(|r| !r.is_empty());
        match self.status {
            SessionStatus::Completed if !has_report => {
                return Err("completed session has no final report".to_string())
            }
            SessionStatus::Created | SessionStatus::InProgress if has_report => {
                return Err(format!("{} session already has a final report", self.status))
            }
            SessionStatus::Created if !self.sections.is_empty() => {
                return Err("created session already has sections".to_string())
            }
            SessionStatus::InProgress | SessionStatus::Completed if self.sections.is_empty() => {
                return Err(format!("{} session has no sections", self.status))
            }
            _ => {}
        }
        for (index, section) in self.sections.iter().enumerate() {
            if section.research.completed && section.research.latest_summary.is_empty() {
                return Err(format!("section {} is completed without a summary", index));
            }
        }
        Ok(())
    }

    fn expect_status(&self, expected: SessionStatus) -> StateResult<()> {
        if self.status != expected {
            return Err(StateError::InvalidStatus {
                expected: expected.to_string(),
                actual: self.status.to_string(),
            });
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
