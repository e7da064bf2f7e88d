use std::path::Path;

// ---------------------------------------------------------------------------
// Config — file-based config loader (docvault.json) with env-var fallback
// ---------------------------------------------------------------------------

/// Embedding sub-config (mirrors the `embedding` key in docvault.json).
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct EmbeddingFileConfig {
    /// `provider:model` spec, e.g. `openai:text-embedding-3-small`.
    pub spec: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub dimension: Option<u32>,
    pub batch_size: Option<usize>,
}

impl EmbeddingFileConfig {
    /// Spec string: JSON field → `DOCVAULT_EMBEDDING_SPEC` env var → `None`
    /// (no embedding model configured; the store degrades to FTS-only search).
    pub fn resolve_spec(&self) -> Option<String> {
        if let Some(s) = &self.spec {
            if !s.trim().is_empty() {
                return Some(s.trim().to_string());
            }
        }
        std::env::var("DOCVAULT_EMBEDDING_SPEC")
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    /// API key: JSON field → `{PROVIDER}_API_KEY` env var → `None`.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(k) = &self.api_key {
            return Some(k.trim().to_string());
        }
        let env_name = format!("{}_API_KEY", provider.to_uppercase());
        std::env::var(&env_name).ok().filter(|v| !v.trim().is_empty())
    }

    /// Base URL: JSON field → `DOCVAULT_EMBEDDING_BASE_URL` env var → provider default.
    pub fn resolve_base_url(&self, default: &str) -> String {
        if let Some(u) = &self.base_url {
            if !u.trim().is_empty() {
                return u.clone();
            }
        }
        std::env::var("DOCVAULT_EMBEDDING_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    /// Embedding dimension: JSON field → `DOCVAULT_EMBEDDING_DIMENSION` env var → 1536.
    pub fn resolve_dimension(&self) -> u32 {
        if let Some(d) = self.dimension {
            return d;
        }
        std::env::var("DOCVAULT_EMBEDDING_DIMENSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1536)
    }

    /// Batch size for embed_documents calls: JSON field → env var → 64.
    pub fn resolve_batch_size(&self) -> usize {
        if let Some(n) = self.batch_size {
            return n;
        }
        std::env::var("DOCVAULT_EMBEDDING_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(64)
    }
}

/// Scheduler sub-config (mirrors the `scheduler` key in docvault.json).
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct SchedulerFileConfig {
    pub max_concurrency: Option<usize>,
    pub max_fetch_retries: Option<u32>,
    pub fetch_timeout_secs: Option<u64>,
}

impl SchedulerFileConfig {
    /// Worker pool size: JSON field → `DOCVAULT_SCHEDULER_CONCURRENCY` env var → 3.
    pub fn resolve_max_concurrency(&self) -> usize {
        if let Some(n) = self.max_concurrency {
            return n;
        }
        std::env::var("DOCVAULT_SCHEDULER_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3)
    }

    pub fn resolve_max_fetch_retries(&self) -> u32 {
        if let Some(n) = self.max_fetch_retries {
            return n;
        }
        std::env::var("DOCVAULT_MAX_FETCH_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3)
    }

    /// Per-fetch timeout: JSON field → env var → 30s.
    pub fn resolve_fetch_timeout_secs(&self) -> u64 {
        if let Some(n) = self.fetch_timeout_secs {
            return n;
        }
        std::env::var("DOCVAULT_FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30)
    }
}

/// Top-level config loaded from `docvault.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct DocVaultConfig {
    pub embedding: EmbeddingFileConfig,
    pub scheduler: SchedulerFileConfig,
}

/// Load `docvault.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `./docvault.json`
/// 2. `../docvault.json`
/// 3. `DOCVAULT_CONFIG` env var path
///
/// Missing file → `DocVaultConfig::default()` (silent, all env-var fallbacks apply).
/// Parse error → log a warning, return `DocVaultConfig::default()`.
pub fn load_config() -> DocVaultConfig {
    let candidates: Vec<std::path::PathBuf> = {
        let mut v = vec![
            std::path::PathBuf::from("docvault.json"),
            std::path::PathBuf::from("../docvault.json"),
        ];
        if let Ok(env_path) = std::env::var("DOCVAULT_CONFIG") {
            v.insert(0, std::path::PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<DocVaultConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("docvault.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "docvault.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return DocVaultConfig::default();
                }
            },
            Err(_) => continue,
        }
    }

    DocVaultConfig::default()
}

// ---------------------------------------------------------------------------

pub const ENV_STORE_PATH: &str = "DOCVAULT_STORE_PATH";
pub const ENV_VECTOR_URI: &str = "DOCVAULT_VECTOR_URI";

/// Root directory for the relational catalog (sqlite db file) and any other
/// on-disk store state.
///
/// Default: `~/.docvault/store`.
pub fn store_path() -> std::path::PathBuf {
    if let Ok(v) = std::env::var(ENV_STORE_PATH) {
        let v = v.trim();
        if !v.is_empty() {
            return std::path::PathBuf::from(v);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".docvault")
        .join("store")
}

/// Directory/URI for the LanceDB vector index backing the chunk embedding
/// table (generalized from the teacher's single fixed-schema memory store).
///
/// Default: `{store_path}/vectors`.
pub fn vector_uri() -> String {
    if let Ok(v) = std::env::var(ENV_VECTOR_URI) {
        let v = v.trim();
        if !v.is_empty() {
            return v.to_string();
        }
    }
    store_path().join("vectors").to_string_lossy().to_string()
}

/// Optional override for where the sqlite catalog database file lives,
/// independent of `store_path` (useful for test fixtures).
pub fn sqlite_path(base: &Path) -> std::path::PathBuf {
    base.join("catalog.sqlite3")
}
