//! CLI `ingest` command: store one chunk of knowledge.

use anyhow::{Context, Result};
use clap::Args;
use std::io::Read;

use hindsight::config::HindsightConfig;
use hindsight::knowledge::{ChunkType, NewChunk};

#[derive(Args)]
pub struct IngestArgs {
    /// error_resolution, task_outcome, directive_summary, conversation or code_change
    #[arg(long = "type", short = 't')]
    pub chunk_type: ChunkType,
    /// Chunk text. Read from stdin when omitted.
    pub content: Option<String>,
    /// Upsert key. Derived from the content when omitted.
    #[arg(long)]
    pub source_id: Option<String>,
    #[arg(long, short)]
    pub project: Option<String>,
    /// JSON object stored alongside the chunk
    #[arg(long)]
    pub metadata: Option<String>,
    #[arg(long)]
    pub json: bool,
}

pub fn ingest(config: &HindsightConfig, args: IngestArgs) -> Result<()> {
    let content = match args.content {
        Some(content) => content,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read content from stdin")?;
            buf
        }
    };

    let mut chunk = NewChunk::new(args.chunk_type, content);
    if let Some(source_id) = args.source_id {
        chunk = chunk.source_id(source_id);
    }
    if let Some(project) = args.project {
        chunk = chunk.project(project);
    }
    if let Some(raw) = args.metadata {
        let metadata: serde_json::Value =
            serde_json::from_str(&raw).context("--metadata is not valid JSON")?;
        chunk = chunk.metadata(metadata);
    }

    let kb = super::open(config)?;
    let outcome = kb.ingest(chunk)?;
    kb.close()?;

    if args.json {
        return super::print_json(&outcome);
    }
    println!(
        "{:?} {} [{}, domain: {}, embedding: {}]",
        outcome.outcome, outcome.source_id, args.chunk_type, outcome.domain_tag, outcome.embedding_tier
    );
    Ok(())
}
