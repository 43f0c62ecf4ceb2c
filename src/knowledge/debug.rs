//! Debug investigation: "has this error been fixed before?"
//!
//! Runs three typed searches against one project (past errors, related
//! tasks, code changes) and decides whether the best past error is close
//! enough to count as a proven fix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::search::{SearchEngine, SearchRequest};
use super::types::{ChunkType, DomainTag, ProjectScope, ScoredChunk};
use crate::config::DebugConfig;
use crate::error::Result;

/// Raw similarity at which the best past error counts as a proven fix.
pub const PROVEN_FIX_THRESHOLD: f32 = 0.70;

/// Characters of the error echoed in the summary heading.
const SUMMARY_ERROR_CHARS: usize = 80;
/// Characters of the closest below-threshold error shown in the summary.
const SUMMARY_EXCERPT_CHARS: usize = 200;

/// Per-phase result counts and raw similarity floors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugLimits {
    pub errors: usize,
    pub tasks: usize,
    pub code: usize,
    pub errors_floor: f32,
    pub tasks_floor: f32,
    pub code_floor: f32,
}

impl Default for DebugLimits {
    fn default() -> Self {
        Self::from(&DebugConfig::default())
    }
}

impl From<&DebugConfig> for DebugLimits {
    fn from(config: &DebugConfig) -> Self {
        Self {
            errors: config.errors_top_k,
            tasks: config.tasks_top_k,
            code: config.code_top_k,
            errors_floor: config.errors_min_similarity,
            tasks_floor: config.tasks_min_similarity,
            code_floor: config.code_min_similarity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugQuery {
    pub error: String,
    pub project: String,
    pub domain: Option<DomainTag>,
    /// Added to the code-change query to favour changes to this file.
    pub file_path: Option<String>,
}

impl DebugQuery {
    pub fn new(error: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            project: project.into(),
            domain: None,
            file_path: None,
        }
    }

    pub fn domain(mut self, domain: Option<DomainTag>) -> Self {
        self.domain = domain;
        self
    }

    pub fn file_path(mut self, file_path: Option<String>) -> Self {
        self.file_path = file_path.filter(|p| !p.is_empty());
        self
    }

    fn request(&self, query: String, chunk_type: ChunkType, top_k: usize, floor: f32) -> SearchRequest {
        SearchRequest::new(query, ProjectScope::project(self.project.clone()))
            .chunk_type(chunk_type)
            .domain(self.domain)
            .top_k(top_k)
            .min_similarity(Some(floor))
    }
}

/// Outcome of an investigation. Also the shape the remote service returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugReport {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_domain",
        skip_serializing_if = "Option::is_none"
    )]
    pub domain: Option<DomainTag>,
    #[serde(default)]
    pub past_errors: Vec<ScoredChunk>,
    #[serde(default)]
    pub related_tasks: Vec<ScoredChunk>,
    #[serde(default, alias = "recent_code_changes")]
    pub code_changes: Vec<ScoredChunk>,
    #[serde(default)]
    pub proven_fix: Option<ScoredChunk>,
    #[serde(default)]
    pub has_proven_fix: bool,
}

impl DebugReport {
    /// Best-scoring past error, whether or not it clears the threshold.
    pub fn closest_past_error(&self) -> Option<&ScoredChunk> {
        self.past_errors.first()
    }

    /// Multi-line human-readable report.
    pub fn summary(&self) -> String {
        let heading: String = self.error.chars().take(SUMMARY_ERROR_CHARS).collect();
        let mut lines = vec![format!("Debug investigation: {heading}")];
        if !self.project.is_empty() {
            lines.push(format!("Project: {}", self.project));
        }
        if let Some(path) = &self.file_path {
            lines.push(format!("File: {path}"));
        }
        if let Some(domain) = self.domain {
            lines.push(format!("Domain: {domain}"));
        }
        lines.push(format!("Past errors found: {}", self.past_errors.len()));
        lines.push(format!("Related tasks: {}", self.related_tasks.len()));
        lines.push(format!("Code changes: {}", self.code_changes.len()));

        match (&self.proven_fix, self.closest_past_error()) {
            (Some(fix), _) if self.has_proven_fix => {
                lines.push(format!(
                    "Proven fix available ({:.0}% match, {}):",
                    fix.display_similarity() * 100.0,
                    fix.source_id
                ));
                lines.push(fix.content.clone());
            }
            (_, Some(closest)) => {
                let excerpt: String = closest.content.chars().take(SUMMARY_EXCERPT_CHARS).collect();
                lines.push(format!(
                    "No proven fix. Closest past error ({:.0}% similar, {}): {excerpt}",
                    closest.display_similarity() * 100.0,
                    closest.source_id
                ));
            }
            (_, None) => lines.push("No proven fix. No similar past errors recorded.".into()),
        }
        lines.join("\n")
    }
}

fn deserialize_optional_domain<'de, D>(deserializer: D) -> std::result::Result<Option<DomainTag>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// The proven fix, if the top-scoring error clears [`PROVEN_FIX_THRESHOLD`].
pub fn select_proven_fix(past_errors: &[ScoredChunk]) -> Option<&ScoredChunk> {
    past_errors
        .first()
        .filter(|top| top.similarity >= PROVEN_FIX_THRESHOLD)
}

pub struct DebugInvestigator<'a> {
    engine: SearchEngine<'a>,
    limits: DebugLimits,
}

impl<'a> DebugInvestigator<'a> {
    pub fn new(engine: SearchEngine<'a>, limits: DebugLimits) -> Self {
        Self { engine, limits }
    }

    pub fn investigate(&self, query: &DebugQuery) -> Result<DebugReport> {
        self.investigate_at(query, Utc::now())
    }

    pub fn investigate_at(&self, query: &DebugQuery, now: DateTime<Utc>) -> Result<DebugReport> {
        let past_errors = self
            .engine
            .search_at(
                &query.request(
                    query.error.clone(),
                    ChunkType::ErrorResolution,
                    self.limits.errors,
                    self.limits.errors_floor,
                ),
                now,
            )?
            .results;
        let related_tasks = self
            .engine
            .search_at(
                &query.request(
                    query.error.clone(),
                    ChunkType::TaskOutcome,
                    self.limits.tasks,
                    self.limits.tasks_floor,
                ),
                now,
            )?
            .results;

        let code_query = match &query.file_path {
            Some(path) => format!("{} {path}", query.error),
            None => query.error.clone(),
        };
        let code_changes = self
            .engine
            .search_at(
                &query.request(code_query, ChunkType::CodeChange, self.limits.code, self.limits.code_floor),
                now,
            )?
            .results;

        let proven_fix = select_proven_fix(&past_errors).cloned();
        let has_proven_fix = proven_fix.is_some();

        tracing::info!(
            project = %query.project,
            past_errors = past_errors.len(),
            related_tasks = related_tasks.len(),
            code_changes = code_changes.len(),
            has_proven_fix,
            "debug investigation complete"
        );

        Ok(DebugReport {
            error: query.error.clone(),
            project: query.project.clone(),
            file_path: query.file_path.clone(),
            domain: query.domain,
            past_errors,
            related_tasks,
            code_changes,
            proven_fix,
            has_proven_fix,
        })
    }

    /// Whether a proven fix exists. Runs only the past-error phase, honouring
    /// the query's domain filter.
    pub fn quick_check(&self, query: &DebugQuery) -> Result<bool> {
        let request = query.request(
            query.error.clone(),
            ChunkType::ErrorResolution,
            1,
            self.limits.errors_floor,
        );
        let result = self.engine.search(&request)?;
        Ok(select_proven_fix(&result.results).is_some())
    }
}
