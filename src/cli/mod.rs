pub mod debug;
pub mod doctor;
pub mod ingest;
pub mod maintenance;
pub mod re_embed;
pub mod remote;
pub mod search;
pub mod status;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use hindsight::config::{EmbeddingConfig, HindsightConfig};
use hindsight::embedding::onnx::{MODEL_FILE, TOKENIZER_FILE};
use hindsight::knowledge::{KnowledgeBase, ScoredChunk};

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Open the configured knowledge base.
pub fn open(config: &HindsightConfig) -> Result<KnowledgeBase> {
    KnowledgeBase::open(config).with_context(|| {
        format!(
            "failed to open knowledge base at {}",
            config.resolved_db_path().display()
        )
    })
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// First `max` characters of `content` on one line.
pub fn preview(content: &str, max: usize) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() > max {
        let cut: String = flat.chars().take(max).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

/// Print ranked results the same way for local and remote searches.
pub fn print_results(results: &[ScoredChunk]) {
    for (i, result) in results.iter().enumerate() {
        println!(
            "  {}. [{}] {} (similarity: {:.2}, score: {:.4})",
            i + 1,
            result.chunk_type,
            result.source_id,
            result.display_similarity(),
            result.score,
        );
        println!("     {}", preview(&result.content, 120));
        println!();
    }
}

pub fn bar_style(template: &str) -> Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template(template)
        .context("invalid progress bar template")?
        .progress_chars("##-"))
}

/// Download the ONNX embedding model and tokenizer to the cache directory.
pub async fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let cache_dir = hindsight::config::expand_tilde(&config.cache_dir);
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

    let model_path = cache_dir.join(MODEL_FILE);
    let tokenizer_path = cache_dir.join(TOKENIZER_FILE);

    if model_path.exists() {
        println!("Model already exists at {}", model_path.display());
    } else {
        println!("Downloading {MODEL_FILE} (~90MB)...");
        download_file(MODEL_URL, &model_path).await?;
        println!("Model saved to {}", model_path.display());
    }

    if tokenizer_path.exists() {
        println!("Tokenizer already exists at {}", tokenizer_path.display());
    } else {
        println!("Downloading {TOKENIZER_FILE}...");
        download_file(TOKENIZER_URL, &tokenizer_path).await?;
        println!("Tokenizer saved to {}", tokenizer_path.display());
    }

    println!("Model download complete. Run `hindsight re-embed` to upgrade stored vectors.");
    Ok(())
}

/// Download a file from a URL with progress bar. Uses atomic write (tmp + rename).
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(bar_style("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")?);
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk)
            .await
            .context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}
