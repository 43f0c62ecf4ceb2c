//! Core knowledge type definitions.
//!
//! [`ChunkType`] carries the product policy for each kind of record: how long
//! it is kept and how much it counts when ranking. Both live in
//! [`ChunkType::policy`] so they cannot drift apart.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{KnowledgeError, Result};

/// Content beyond this many characters is cut at ingestion.
pub const MAX_CONTENT_CHARS: usize = 4000;

pub const MAX_SOURCE_ID_CHARS: usize = 256;

/// The kinds of origin event a chunk can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// How a past error was fixed. Never pruned.
    ErrorResolution,
    TaskOutcome,
    DirectiveSummary,
    Conversation,
    CodeChange,
}

/// How long a chunk survives [`crate::knowledge::store::ChunkStore::prune`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Permanent,
    Days(i64),
}

impl Retention {
    pub fn window(&self) -> Option<Duration> {
        match self {
            Self::Permanent => None,
            Self::Days(d) => Some(Duration::days(*d)),
        }
    }

    /// True once the chunk's age exceeds the window.
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.window().is_some_and(|w| now - created_at > w)
    }
}

/// Retention class and ranking weight of one chunk type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypePolicy {
    pub retention: Retention,
    pub score_weight: f64,
}

impl ChunkType {
    pub const ALL: [ChunkType; 5] = [
        Self::ErrorResolution,
        Self::TaskOutcome,
        Self::DirectiveSummary,
        Self::Conversation,
        Self::CodeChange,
    ];

    /// Proven fixes must outrank equally similar chatter, so error
    /// resolutions carry the largest weight and are kept forever.
    pub const fn policy(self) -> TypePolicy {
        match self {
            Self::ErrorResolution => TypePolicy {
                retention: Retention::Permanent,
                score_weight: 1.3,
            },
            Self::TaskOutcome => TypePolicy {
                retention: Retention::Days(90),
                score_weight: 1.1,
            },
            Self::DirectiveSummary => TypePolicy {
                retention: Retention::Days(90),
                score_weight: 1.0,
            },
            Self::Conversation => TypePolicy {
                retention: Retention::Days(30),
                score_weight: 1.0,
            },
            Self::CodeChange => TypePolicy {
                retention: Retention::Days(30),
                score_weight: 0.9,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ErrorResolution => "error_resolution",
            Self::TaskOutcome => "task_outcome",
            Self::DirectiveSummary => "directive_summary",
            Self::Conversation => "conversation",
            Self::CodeChange => "code_change",
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChunkType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown chunk type: {s}"))
    }
}

/// Coarse subject area, assigned once at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DomainTag {
    Frontend,
    Backend,
    Devops,
    Security,
    Testing,
    #[default]
    General,
}

impl DomainTag {
    pub const ALL: [DomainTag; 6] = [
        Self::Frontend,
        Self::Backend,
        Self::Devops,
        Self::Security,
        Self::Testing,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Devops => "devops",
            Self::Security => "security",
            Self::Testing => "testing",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for DomainTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DomainTag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // The remote service reports an untagged chunk as "".
        if s.is_empty() {
            return Ok(Self::General);
        }
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown domain tag: {s}"))
    }
}

/// Which projects a read may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectScope {
    Project(String),
    /// Explicit cross-project read.
    AllProjects,
}

impl ProjectScope {
    pub fn project(name: impl Into<String>) -> Self {
        Self::Project(name.into())
    }

    pub fn as_project(&self) -> Option<&str> {
        match self {
            Self::Project(p) => Some(p),
            Self::AllProjects => None,
        }
    }
}

/// A stored unit of knowledge, matching the `knowledge_chunks` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Upsert key; one row per origin event.
    pub source_id: String,
    pub chunk_type: ChunkType,
    pub content: String,
    pub project: String,
    pub domain_tag: DomainTag,
    /// Free-form JSON object.
    pub metadata: serde_json::Value,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// A chunk as returned by search, with its raw and weighted scores.
///
/// Shared by the local engine and the remote client, so every field the
/// remote service may omit has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    #[serde(default)]
    pub source_id: String,
    pub chunk_type: ChunkType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub project: String,
    #[serde(default, deserialize_with = "deserialize_domain")]
    pub domain_tag: DomainTag,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Raw cosine similarity in `[-1, 1]`.
    #[serde(default, alias = "raw_similarity")]
    pub similarity: f32,
    /// `similarity × type weight × recency boost`.
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ScoredChunk {
    /// Similarity clamped to `[0, 1]` for display.
    pub fn display_similarity(&self) -> f32 {
        self.similarity.clamp(0.0, 1.0)
    }

    pub fn is_error_resolution(&self) -> bool {
        self.chunk_type == ChunkType::ErrorResolution
    }
}

fn deserialize_domain<'de, D>(deserializer: D) -> std::result::Result<DomainTag, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.as_deref()
        .unwrap_or("")
        .parse()
        .map_err(serde::de::Error::custom)
}

/// Reject ids that are empty, oversized, padded, or contain control characters.
pub fn validate_source_id(source_id: &str) -> Result<()> {
    if source_id.is_empty() {
        return Err(KnowledgeError::validation("source_id must not be empty"));
    }
    if source_id.chars().count() > MAX_SOURCE_ID_CHARS {
        return Err(KnowledgeError::validation(format!(
            "source_id longer than {MAX_SOURCE_ID_CHARS} characters"
        )));
    }
    if source_id.trim() != source_id {
        return Err(KnowledgeError::validation(
            "source_id must not have surrounding whitespace",
        ));
    }
    if source_id.chars().any(char::is_control) {
        return Err(KnowledgeError::validation(
            "source_id must not contain control characters",
        ));
    }
    Ok(())
}

/// Stable id for content ingested without one: `hash:` + 12 hex chars of the
/// SHA-256 of its first 500 characters.
pub fn derive_source_id(content: &str) -> String {
    let prefix: String = content.chars().take(500).collect();
    let digest = Sha256::digest(prefix.as_bytes());
    let hex: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
    format!("hash:{hex}")
}

/// Cut `content` to [`MAX_CONTENT_CHARS`] on a char boundary.
pub fn truncate_content(content: &str) -> &str {
    match content.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((end, _)) => &content[..end],
        None => content,
    }
}

/// Storage timestamp format: fixed-width UTC so text order equals time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_table_matches_product_rules() {
        let expected = [
            (ChunkType::ErrorResolution, Retention::Permanent, 1.3),
            (ChunkType::TaskOutcome, Retention::Days(90), 1.1),
            (ChunkType::DirectiveSummary, Retention::Days(90), 1.0),
            (ChunkType::Conversation, Retention::Days(30), 1.0),
            (ChunkType::CodeChange, Retention::Days(30), 0.9),
        ];
        for (chunk_type, retention, weight) in expected {
            let policy = chunk_type.policy();
            assert_eq!(policy.retention, retention, "{chunk_type}");
            assert_eq!(policy.score_weight, weight, "{chunk_type}");
        }
    }

    #[test]
    fn error_resolution_has_the_top_weight() {
        let top = ChunkType::ALL
            .into_iter()
            .max_by(|a, b| a.policy().score_weight.total_cmp(&b.policy().score_weight))
            .unwrap();
        assert_eq!(top, ChunkType::ErrorResolution);
    }

    #[test]
    fn retention_expiry() {
        let now = Utc::now();
        let month = Retention::Days(30);
        assert!(month.is_expired(now - Duration::days(31), now));
        assert!(!month.is_expired(now - Duration::days(29), now));
        assert!(!Retention::Permanent.is_expired(now - Duration::days(3650), now));
    }

    #[test]
    fn chunk_type_parses_and_displays() {
        for t in ChunkType::ALL {
            assert_eq!(t.to_string().parse::<ChunkType>().unwrap(), t);
        }
        assert!("gossip".parse::<ChunkType>().is_err());
    }

    #[test]
    fn empty_domain_string_is_general() {
        assert_eq!("".parse::<DomainTag>().unwrap(), DomainTag::General);
        assert_eq!("devops".parse::<DomainTag>().unwrap(), DomainTag::Devops);
    }

    #[test]
    fn source_id_validation() {
        assert!(validate_source_id("err-jwt-1").is_ok());
        assert!(validate_source_id("").is_err());
        assert!(validate_source_id(" padded").is_err());
        assert!(validate_source_id("line\nbreak").is_err());
        assert!(validate_source_id(&"x".repeat(MAX_SOURCE_ID_CHARS + 1)).is_err());
    }

    #[test]
    fn derived_source_id_is_stable() {
        let a = derive_source_id("Fix: add timeout");
        assert_eq!(a, derive_source_id("Fix: add timeout"));
        assert_ne!(a, derive_source_id("Fix: add retry"));
        assert!(a.starts_with("hash:"));
        assert_eq!(a.len(), "hash:".len() + 12);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(MAX_CONTENT_CHARS + 10);
        let cut = truncate_content(&long);
        assert_eq!(cut.chars().count(), MAX_CONTENT_CHARS);
        assert_eq!(truncate_content("short"), "short");
    }

    #[test]
    fn timestamps_sort_as_text() {
        let early = Utc::now() - Duration::days(1);
        let late = Utc::now();
        assert!(format_timestamp(early) < format_timestamp(late));
        let parsed = parse_timestamp(&format_timestamp(late)).unwrap();
        assert_eq!(parsed.timestamp_micros(), late.timestamp_micros());
    }

    #[test]
    fn scored_chunk_reads_remote_shape() {
        let json = serde_json::json!({
            "content": "Fix: add timeout",
            "chunk_type": "error_resolution",
            "source_id": "e1",
            "score": 1.04,
            "raw_similarity": 0.8,
            "domain_tag": ""
        });
        let chunk: ScoredChunk = serde_json::from_value(json).unwrap();
        assert!((chunk.similarity - 0.8).abs() < 1e-6);
        assert_eq!(chunk.domain_tag, DomainTag::General);
        assert!(chunk.is_error_resolution());
        assert!(chunk.created_at.is_none());
    }

    #[test]
    fn display_similarity_is_clamped() {
        let chunk = ScoredChunk {
            source_id: "c".into(),
            chunk_type: ChunkType::Conversation,
            content: "c".into(),
            project: "p".into(),
            domain_tag: DomainTag::General,
            metadata: serde_json::json!({}),
            similarity: -0.4,
            score: -0.4,
            created_at: None,
        };
        assert_eq!(chunk.display_similarity(), 0.0);
    }
}
