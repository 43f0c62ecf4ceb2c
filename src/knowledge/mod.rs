//! The knowledge engine: typed chunks, durable storage, ranked search and
//! debug investigation.

pub mod base;
pub mod classify;
pub mod debug;
pub mod search;
pub mod store;
pub mod types;

pub use base::{IngestOutcome, KnowledgeBase, KnowledgeStatus, NewChunk, ReEmbedReport};
pub use classify::classify;
pub use debug::{DebugInvestigator, DebugLimits, DebugQuery, DebugReport, PROVEN_FIX_THRESHOLD};
pub use search::{SearchEngine, SearchMode, SearchRequest, SearchResult};
pub use store::{CandidateFilter, CandidateSet, ChunkStore, PruneReport, UpsertOutcome};
pub use types::{ChunkType, DomainTag, KnowledgeChunk, ProjectScope, Retention, ScoredChunk};
