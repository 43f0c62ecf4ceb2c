//! CLI `remote` commands: query a remote knowledge service.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use hindsight::config::HindsightConfig;
use hindsight::knowledge::{DebugQuery, DomainTag, ProjectScope, SearchMode, SearchRequest};
use hindsight::remote::RemoteClient;

#[derive(Args)]
pub struct RemoteArgs {
    /// Service URL (default from config or HINDSIGHT_REMOTE_URL)
    #[arg(long)]
    pub url: Option<String>,
    /// Log in with this passphrase before the request
    #[arg(long)]
    pub passphrase: Option<String>,
    #[command(subcommand)]
    pub action: RemoteAction,
}

#[derive(Subcommand)]
pub enum RemoteAction {
    /// Search the remote knowledge base
    Search {
        query: String,
        #[arg(long, short, default_value = "all")]
        mode: SearchMode,
        #[arg(long, short)]
        domain: Option<DomainTag>,
        #[arg(long, short = 'k', default_value_t = 5)]
        top_k: usize,
        #[arg(long)]
        json: bool,
    },
    /// Run a remote debug investigation
    Debug {
        error: String,
        #[arg(long)]
        file: Option<String>,
        #[arg(long, short)]
        domain: Option<DomainTag>,
        #[arg(long)]
        json: bool,
    },
    /// Show remote knowledge base status
    Status {
        #[arg(long)]
        json: bool,
    },
}

pub async fn remote(config: &HindsightConfig, args: RemoteArgs) -> Result<()> {
    let mut remote_config = config.remote.clone();
    if let Some(url) = args.url {
        remote_config.base_url = url;
    }
    let mut client = RemoteClient::new(&remote_config)?;

    if let Some(passphrase) = args.passphrase {
        if !client.authenticate(&passphrase).await? {
            bail!("authentication failed at {}", client.base_url());
        }
    }

    match args.action {
        RemoteAction::Search {
            query,
            mode,
            domain,
            top_k,
            json,
        } => {
            let request = SearchRequest::new(query, ProjectScope::AllProjects)
                .mode(mode)
                .domain(domain)
                .top_k(top_k);
            let result = client.search(&request).await?;
            if json {
                return super::print_json(&result);
            }
            if !result.has_results() {
                println!("No results found.");
                return Ok(());
            }
            println!("Found {} result(s) [mode: {}]\n", result.count(), result.mode);
            super::print_results(&result.results);
        }
        RemoteAction::Debug {
            error,
            file,
            domain,
            json,
        } => {
            let query = DebugQuery::new(error, "").domain(domain).file_path(file);
            let report = client.debug(&query).await?;
            if json {
                return super::print_json(&report);
            }
            println!("{}", report.summary());
        }
        RemoteAction::Status { json } => {
            let status = client.status().await?;
            if json {
                return super::print_json(&status);
            }
            println!("Remote:            {}", client.base_url());
            println!("Ready:             {}", status.ready);
            println!("Total chunks:      {}", status.total_chunks);
            for (chunk_type, count) in &status.by_type {
                println!("  {chunk_type:<18} {count}");
            }
        }
    }
    Ok(())
}
