//! CLI `debug` command: look for a proven fix for an error.
//!
//! Exit status: 0 when the investigation ran (or `--quick` found a proven
//! fix), 1 when `--quick` found none, 2 when the command itself failed.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use hindsight::config::HindsightConfig;
use hindsight::knowledge::{DebugQuery, DomainTag};

#[derive(Args)]
pub struct DebugArgs {
    /// Error description, message or stack trace
    pub error: String,
    #[arg(long, short)]
    pub project: Option<String>,
    #[arg(long, short)]
    pub domain: Option<DomainTag>,
    /// File the error points at
    #[arg(long)]
    pub file: Option<String>,
    /// Only answer whether a proven fix exists (exit 0 if so, 1 if not, 2 on error)
    #[arg(long)]
    pub quick: bool,
    #[arg(long)]
    pub json: bool,
}

const NO_PROVEN_FIX: u8 = 1;
const FAILED: u8 = 2;

/// Run `debug` and map the outcome to its exit status.
pub fn run(config: &HindsightConfig, args: DebugArgs) -> ExitCode {
    let outcome = debug(config, args);
    if let Err(e) = &outcome {
        eprintln!("Error: {e:?}");
    }
    ExitCode::from(status_code(&outcome))
}

fn status_code(outcome: &Result<bool>) -> u8 {
    match outcome {
        Ok(true) => 0,
        Ok(false) => NO_PROVEN_FIX,
        Err(_) => FAILED,
    }
}

/// Returns false only when `--quick` found no proven fix.
fn debug(config: &HindsightConfig, args: DebugArgs) -> Result<bool> {
    let kb = super::open(config)?;
    let project = args
        .project
        .unwrap_or_else(|| config.storage.default_project.clone());
    let query = DebugQuery::new(args.error, project)
        .domain(args.domain)
        .file_path(args.file);

    if args.quick {
        let found = kb.quick_check(&query)?;
        kb.close()?;
        if args.json {
            super::print_json(&serde_json::json!({ "has_proven_fix": found }))?;
        } else {
            println!("{}", if found { "proven fix found" } else { "no proven fix" });
        }
        return Ok(found);
    }

    let report = kb.investigate(&query)?;
    kb.close()?;

    if args.json {
        super::print_json(&report)?;
        return Ok(true);
    }

    println!("{}", report.summary());
    if !report.related_tasks.is_empty() {
        println!("\nRelated tasks:\n");
        super::print_results(&report.related_tasks);
    }
    if !report.code_changes.is_empty() {
        println!("\nCode changes:\n");
        super::print_results(&report.code_changes);
    }
    Ok(true)
}
