use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HindsightConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub debug: DebugConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub default_project: String,
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `auto`, `onnx`, `tfidf` or `hash`.
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    /// Raw similarity floor for `search`. 0 keeps every positive match.
    pub min_similarity: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DebugConfig {
    pub errors_top_k: usize,
    pub tasks_top_k: usize,
    pub code_top_k: usize,
    pub errors_min_similarity: f32,
    pub tasks_min_similarity: f32,
    pub code_min_similarity: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Bearer token from an earlier login. Empty means unauthenticated.
    pub token: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_hindsight_dir()
            .join("knowledge.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            default_project: "default".into(),
            lock_timeout_ms: 5000,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_hindsight_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "auto".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            min_similarity: 0.35,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            errors_top_k: 5,
            tasks_top_k: 3,
            code_top_k: 3,
            errors_min_similarity: 0.30,
            tasks_min_similarity: 0.35,
            code_min_similarity: 0.30,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4200".into(),
            timeout_secs: 30,
            token: String::new(),
        }
    }
}

/// Returns `~/.hindsight/`, or `./.hindsight/` when no home directory is known.
pub fn default_hindsight_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hindsight")
}

/// Returns the default config file path: `~/.hindsight/config.toml`
pub fn default_config_path() -> PathBuf {
    default_hindsight_dir().join("config.toml")
}

impl HindsightConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            HindsightConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `HINDSIGHT_*` environment overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HINDSIGHT_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("HINDSIGHT_PROJECT") {
            self.storage.default_project = val;
        }
        if let Ok(val) = std::env::var("HINDSIGHT_LOG_LEVEL") {
            self.logging.log_level = val;
        }
        if let Ok(val) = std::env::var("HINDSIGHT_EMBEDDING") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("HINDSIGHT_REMOTE_URL") {
            self.remote.base_url = val;
        }
        if let Ok(val) = std::env::var("HINDSIGHT_REMOTE_TOKEN") {
            self.remote.token = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.lock_timeout_ms)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
