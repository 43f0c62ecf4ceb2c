//! CLI maintenance commands: `prune` and `forget`.

use anyhow::Result;

use hindsight::config::HindsightConfig;

/// Delete every chunk past its retention window.
pub fn prune(config: &HindsightConfig, json: bool) -> Result<()> {
    let kb = super::open(config)?;
    let report = kb.prune()?;
    kb.close()?;

    if json {
        return super::print_json(&report);
    }

    if report.removed == 0 {
        println!("No expired chunks.");
        return Ok(());
    }
    println!("Pruned {} expired chunk(s):", report.removed);
    for (chunk_type, count) in &report.by_type {
        println!("  {chunk_type}: {count}");
    }
    Ok(())
}

/// Delete one chunk by `source_id`, or everything in a project.
pub fn forget(config: &HindsightConfig, source_id: Option<&str>, project: Option<&str>) -> Result<()> {
    let kb = super::open(config)?;
    let result = match (source_id, project) {
        (Some(id), None) => {
            if kb.delete(id)? {
                println!("Forgot {id}.");
            } else {
                println!("No chunk with source_id {id}.");
            }
            Ok(())
        }
        (None, Some(project)) => {
            let n = kb.delete_project(project)?;
            println!("Forgot {n} chunk(s) in project {project}.");
            Ok(())
        }
        _ => Err(anyhow::anyhow!("give either a source_id or --project")),
    };
    kb.close()?;
    result
}
