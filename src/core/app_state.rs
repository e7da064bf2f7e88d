use std::sync::Arc;

use crate::core::config::DocVaultConfig;
use crate::core::tools_registry::ToolRegistry;
use crate::embedder::Embedder;
use crate::scheduler::Scheduler;
use crate::store::Store;

/// Shared application state handed to every MCP tool call and HTTP handler.
///
/// Generalizes the teacher's `AppState` (moka caches + a handful of optional
/// subsystems behind `Option<Arc<_>>>`) from a stateless scrape proxy into the
/// owner of the store, scheduler, and embedder.
#[derive(Clone)]
pub struct AppState {
    pub http_client: reqwest::Client,
    pub tool_registry: Arc<ToolRegistry>,
    pub store: Arc<Store>,
    pub scheduler: Arc<Scheduler>,
    /// None when no embedding model is configured; the retriever then
    /// degrades to FTS-only search.
    pub embedder: Option<Arc<dyn Embedder>>,
    /// key: `(library, version, query, limit)` serialized
    pub search_cache: moka::future::Cache<String, Vec<crate::core::types::SearchResult>>,
    pub config: Arc<DocVaultConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("embedder_enabled", &self.embedder.is_some())
            .finish()
    }
}

impl AppState {
    pub fn new(
        http_client: reqwest::Client,
        store: Arc<Store>,
        scheduler: Arc<Scheduler>,
        embedder: Option<Arc<dyn Embedder>>,
        config: DocVaultConfig,
    ) -> Self {
        let tool_registry = Arc::new(ToolRegistry::load());
        Self {
            http_client,
            tool_registry,
            store,
            scheduler,
            embedder,
            search_cache: moka::future::Cache::builder()
                .max_capacity(10_000)
                .time_to_live(std::time::Duration::from_secs(60 * 10))
                .build(),
            config: Arc::new(config),
        }
    }
}
