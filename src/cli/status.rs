use anyhow::Result;

use hindsight::config::HindsightConfig;

/// Print chunk counts per type, for one project or all of them.
pub fn status(config: &HindsightConfig, project: Option<&str>, json: bool) -> Result<()> {
    let kb = super::open(config)?;
    let status = kb.status(project)?;
    kb.close()?;

    if json {
        return super::print_json(&status);
    }

    match project {
        Some(p) => println!("Knowledge base status (project: {p})"),
        None => println!("Knowledge base status (all projects)"),
    }
    println!();
    println!("Total chunks:      {}", status.total_chunks);
    for (chunk_type, count) in &status.by_type {
        println!("  {chunk_type:<18} {count}");
    }
    if let Some(tier) = status.embedding_tier {
        println!("Embedding tier:    {tier}");
    }
    Ok(())
}
