//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use hindsight::config::HindsightConfig;
use hindsight::embedding::Embedder;
use hindsight::knowledge::ChunkStore;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &HindsightConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `hindsight ingest` to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let store = ChunkStore::open(&db_path, config.lock_timeout())
        .context("failed to open database (may be corrupt)")?;
    let report = store.health().context("failed to run health check")?;
    store.close()?;

    let embedder = Embedder::from_config(&config.embedding);
    let active = embedder.active_tier();

    println!("Hindsight Health Report");
    println!("=======================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("Chunks:            {}", report.chunk_count);
    println!();
    println!("Embedding tier:");
    println!("  Stored:          {}", report.embedding_tier.as_deref().unwrap_or("(not set)"));
    println!("  Available:       {active}");
    match report.embedding_tier.as_deref() {
        Some(stored) if stored != active.as_str() => {
            println!("  WARNING: tier mismatch! Run `hindsight re-embed` to update vectors.");
        }
        Some(_) => println!("  Status:          OK (match)"),
        None => {}
    }
    if !active.supports_fuzzy_recall() {
        println!("  Hash tier only matches identical text. Run `hindsight model download`.");
    }
    println!();

    if report.corrupt_embeddings.is_empty() {
        println!("Embeddings:        OK");
    } else {
        println!(
            "Embeddings:        {} corrupt record(s), skipped by search:",
            report.corrupt_embeddings.len()
        );
        for source_id in &report.corrupt_embeddings {
            println!("  {source_id}");
        }
        println!("  Run `hindsight re-embed` to rewrite them.");
    }

    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db {}", db_path.display());
        println!("  2. Or re-ingest from your sources after removing the file.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
