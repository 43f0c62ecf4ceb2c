//! Institutional memory for a software team: "have we fixed this before?"
//!
//! Hindsight stores past error resolutions, task outcomes, directive
//! summaries, conversations and code changes as embedded chunks in a local
//! SQLite file, and answers similarity queries over them. Its main question
//! is debug investigation: given a new error, find the closest past error
//! and decide whether it is close enough to count as a **proven fix**.
//!
//! | Chunk type | Retention | Ranking weight |
//! |------------|-----------|----------------|
//! | `error_resolution` | permanent | 1.3 |
//! | `task_outcome` | 90 days | 1.1 |
//! | `directive_summary` | 90 days | 1.0 |
//! | `conversation` | 30 days | 1.0 |
//! | `code_change` | 30 days | 0.9 |
//!
//! # Architecture
//!
//! - **Storage**: one SQLite file in WAL mode, one connection behind a
//!   bounded-wait lock
//! - **Embeddings**: all-MiniLM-L6-v2 via ONNX Runtime when the model is
//!   present, else incremental TF-IDF, else a deterministic hash (384 dims)
//! - **Search**: cosine similarity weighted by chunk type and recency
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`embedding`]: Tiered text-to-vector embedding and the vector codec
//! - [`error`]: The library error taxonomy
//! - [`knowledge`]: Chunk store, search, classification, debug investigation
//! - [`remote`]: HTTP client for a remote knowledge service

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod remote;

pub use error::{KnowledgeError, Result};
pub use knowledge::KnowledgeBase;
