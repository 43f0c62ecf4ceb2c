use anyhow::Result;
use clap::Args;

use hindsight::config::HindsightConfig;
use hindsight::knowledge::{DomainTag, ProjectScope, SearchMode, SearchRequest};

#[derive(Args)]
pub struct SearchArgs {
    pub query: String,
    /// all, errors, tasks, code, conversations or directives
    #[arg(long, short, default_value = "all")]
    pub mode: SearchMode,
    #[arg(long, short)]
    pub domain: Option<DomainTag>,
    #[arg(long, short = 'k')]
    pub top_k: Option<usize>,
    #[arg(long, short, conflicts_with = "all_projects")]
    pub project: Option<String>,
    /// Search every project instead of one
    #[arg(long)]
    pub all_projects: bool,
    #[arg(long)]
    pub min_similarity: Option<f32>,
    #[arg(long)]
    pub json: bool,
}

fn build_request(config: &HindsightConfig, args: SearchArgs) -> SearchRequest {
    let scope = if args.all_projects {
        ProjectScope::AllProjects
    } else {
        ProjectScope::project(
            args.project
                .unwrap_or_else(|| config.storage.default_project.clone()),
        )
    };
    let floor = args
        .min_similarity
        .unwrap_or(config.retrieval.min_similarity);
    SearchRequest::new(args.query, scope)
        .mode(args.mode)
        .domain(args.domain)
        .top_k(args.top_k.unwrap_or(config.retrieval.default_top_k))
        .min_similarity(Some(floor))
}

/// Run a search from the terminal.
pub fn search(config: &HindsightConfig, args: SearchArgs) -> Result<()> {
    let kb = super::open(config)?;
    let json = args.json;
    let request = build_request(config, args);

    let result = kb.search(&request)?;
    kb.close()?;

    if json {
        return super::print_json(&result);
    }

    if !result.has_results() {
        println!("No results found.");
        return Ok(());
    }

    println!(
        "Found {} result(s) [mode: {}, embedding: {}]\n",
        result.count(),
        result.mode,
        kb.active_tier()
    );
    super::print_results(&result.results);

    if !result.skipped_records.is_empty() {
        println!(
            "Skipped {} corrupt record(s); run `hindsight doctor`.",
            result.skipped_records.len()
        );
    }
    if !kb.embedder().supports_fuzzy_recall() {
        println!("Note: hash embeddings only match identical text. Run `hindsight model download`.");
    }

    Ok(())
}
