//! CLI `re-embed` command: regenerate all embeddings with the best available tier.

use anyhow::{Context, Result};
use indicatif::ProgressBar;

use hindsight::config::HindsightConfig;

pub fn re_embed(config: &HindsightConfig) -> Result<()> {
    let kb = super::open(config)?;

    let total = kb.status(None)?.total_chunks;
    if total == 0 {
        println!("No chunks to re-embed.");
        return kb.close().context("failed to close knowledge base");
    }

    println!("Re-embedding {total} chunks with the {} tier...", kb.active_tier());

    let pb = ProgressBar::new(total);
    pb.set_style(super::bar_style("  {bar:40.cyan/blue} {pos}/{len} ({eta})")?);

    let report = kb.re_embed_with_progress(|done, _| pb.set_position(done as u64))?;
    pb.finish_and_clear();
    kb.close()?;

    println!(
        "Re-embedded {}/{} chunks. Stored tier is now {}.",
        report.updated, report.total, report.embedding_tier
    );
    Ok(())
}
