//! The persistent library/version/page/chunk graph with its hybrid index.
//! A `Store` owns one sqlite catalog connection pool and one LanceDB vector
//! index; both live under the same store path.

pub mod catalog;
pub mod chunks;
pub mod embedding_config;
pub mod schema;
pub mod search;
pub mod vectors;
pub mod version_order;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::errors::{AppError, AppResult};
use crate::core::types::{
    Chunk, ChunkHit, EmbeddingConfig, FindVersionResult, LibrarySummary, Page, ScrapeResult,
    ScraperOptions, Version, VersionStatus,
};
use crate::embedder::Embedder;

use vectors::VectorIndex;

pub struct Store {
    pool: SqlitePool,
    vectors: VectorIndex,
}

impl Store {
    pub async fn open(sqlite_path: &std::path::Path, vector_uri: &str, vector_dimension: u32) -> AppResult<Self> {
        if let Some(parent) = sqlite_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Other(e.into()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", sqlite_path.display()))
            .map_err(|e| AppError::Other(e.into()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Other(e.into()))?;

        schema::migrate(&pool).await.map_err(|e| AppError::Other(e.into()))?;

        let vectors = VectorIndex::open(vector_uri, vector_dimension)
            .await
            .map_err(AppError::Other)?;

        Ok(Self { pool, vectors })
    }

    pub async fn ensure_embedding_config(&self, candidate: &EmbeddingConfig) -> AppResult<()> {
        embedding_config::ensure(&self.pool, candidate).await
    }

    pub async fn embedding_config(&self) -> AppResult<Option<EmbeddingConfig>> {
        embedding_config::get(&self.pool).await
    }

    pub async fn resolve_version(&self, library: &str, version: Option<&str>) -> AppResult<String> {
        catalog::resolve_version(&self.pool, library, version).await
    }

    pub async fn get_version(&self, version_id: &str) -> AppResult<Version> {
        catalog::get_version(&self.pool, version_id).await
    }

    pub async fn update_version_status(
        &self,
        version_id: &str,
        new: VersionStatus,
        error_message: Option<&str>,
    ) -> AppResult<VersionStatus> {
        catalog::update_version_status(&self.pool, version_id, new, error_message).await
    }

    pub async fn update_version_progress(&self, version_id: &str, pages: u32, max_pages: u32) -> AppResult<()> {
        catalog::update_version_progress(&self.pool, version_id, pages, max_pages).await
    }

    pub async fn set_scraper_options(
        &self,
        version_id: &str,
        source_url: &str,
        options: &ScraperOptions,
    ) -> AppResult<()> {
        catalog::set_scraper_options(&self.pool, version_id, source_url, options).await
    }

    pub async fn get_versions_by_status(&self, status: VersionStatus) -> AppResult<Vec<Version>> {
        catalog::get_versions_by_status(&self.pool, status).await
    }

    pub async fn find_versions_by_source_url(&self, source_url: &str) -> AppResult<Vec<Version>> {
        catalog::find_versions_by_source_url(&self.pool, source_url).await
    }

    /// Deletes a version along with its pages, chunks, and vectors. Pages
    /// are dropped through `delete_pages` first so the vector index doesn't
    /// end up with entries the sqlite cascade can no longer reach.
    pub async fn remove_version(&self, version_id: &str) -> AppResult<()> {
        self.delete_pages(version_id).await?;
        catalog::remove_version(&self.pool, version_id).await
    }

    pub async fn list_libraries(&self) -> AppResult<Vec<LibrarySummary>> {
        catalog::list_libraries(&self.pool).await
    }

    pub async fn list_versions(&self, library: &str) -> AppResult<Vec<crate::core::types::VersionSummary>> {
        catalog::list_versions_by_library_name(&self.pool, library).await
    }

    pub async fn get_library_name(&self, library_id: &str) -> AppResult<String> {
        catalog::get_library_name(&self.pool, library_id).await
    }

    /// Startup-only recovery escape hatch; see `catalog::force_reset_to_queued`.
    pub async fn force_reset_to_queued(&self, version_id: &str) -> AppResult<()> {
        catalog::force_reset_to_queued(&self.pool, version_id).await
    }

    pub async fn find_version(&self, library: &str, target: Option<&str>) -> AppResult<FindVersionResult> {
        catalog::find_version(&self.pool, library, target).await
    }

    pub async fn suggest_library_names(&self, attempted: &str) -> AppResult<Vec<String>> {
        catalog::suggest_library_names(&self.pool, attempted).await
    }

    pub async fn add_documents(
        &self,
        version_id: &str,
        depth: u32,
        scrape: &ScrapeResult,
        embedder: Option<&Arc<dyn Embedder>>,
    ) -> AppResult<String> {
        chunks::add_documents(&self.pool, &self.vectors, version_id, depth, scrape, embedder).await
    }

    pub async fn delete_page(&self, page_id: &str) -> AppResult<()> {
        chunks::delete_page(&self.pool, &self.vectors, page_id).await
    }

    pub async fn delete_pages(&self, version_id: &str) -> AppResult<u64> {
        chunks::delete_pages(&self.pool, &self.vectors, version_id).await
    }

    pub async fn get_pages_by_version_id(&self, version_id: &str) -> AppResult<Vec<Page>> {
        chunks::get_pages_by_version_id(&self.pool, version_id).await
    }

    pub async fn find_chunks_by_url(&self, version_id: &str, url: &str) -> AppResult<Vec<Chunk>> {
        chunks::find_chunks_by_url(&self.pool, version_id, url).await
    }

    pub async fn find_chunks_by_ids(&self, ids: &[String]) -> AppResult<Vec<Chunk>> {
        chunks::find_chunks_by_ids(&self.pool, ids).await
    }

    pub async fn find_chunk(&self, chunk_id: &str) -> AppResult<Option<Chunk>> {
        chunks::find_chunk(&self.pool, chunk_id).await
    }

    pub async fn find_parent_chunk(&self, chunk_id: &str) -> AppResult<Option<Chunk>> {
        chunks::find_parent_chunk(&self.pool, chunk_id).await
    }

    pub async fn find_preceding_sibling_chunks(&self, chunk_id: &str, limit: usize) -> AppResult<Vec<Chunk>> {
        chunks::find_preceding_sibling_chunks(&self.pool, chunk_id, limit).await
    }

    pub async fn find_subsequent_sibling_chunks(&self, chunk_id: &str, limit: usize) -> AppResult<Vec<Chunk>> {
        chunks::find_subsequent_sibling_chunks(&self.pool, chunk_id, limit).await
    }

    pub async fn find_child_chunks(&self, chunk_id: &str, limit: usize) -> AppResult<Vec<Chunk>> {
        chunks::find_child_chunks(&self.pool, chunk_id, limit).await
    }

    pub async fn all_chunks_for_page(&self, page_id: &str) -> AppResult<Vec<Chunk>> {
        chunks::all_chunks_for_page_public(&self.pool, page_id).await
    }

    pub async fn find_by_content(
        &self,
        embedder: Option<&Arc<dyn Embedder>>,
        version_id: &str,
        query: &str,
        k: usize,
    ) -> AppResult<Vec<ChunkHit>> {
        search::find_by_content(&self.pool, &self.vectors, embedder, version_id, query, k).await
    }
}
