//! Wire types shared between the store, scheduler, retriever, and the MCP/HTTP
//! surfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A version's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    NotIndexed,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Updating,
}

impl VersionStatus {
    /// The legal transition table. Any pair not covered here must be
    /// rejected by `update_version_status`.
    pub fn can_transition_to(self, next: VersionStatus) -> bool {
        use VersionStatus::*;
        matches!(
            (self, next),
            (NotIndexed, Queued)
                | (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Completed, Updating)
                | (Updating, Running)
                | (Updating, Cancelled)
                | (Failed, Queued)
                | (Cancelled, Queued)
        )
    }

    /// True for statuses considered "an active job" for a version (at most
    /// one may exist system-wide per version id).
    pub fn is_active(self) -> bool {
        matches!(self, VersionStatus::Queued | VersionStatus::Running | VersionStatus::Updating)
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VersionStatus::NotIndexed => "not_indexed",
            VersionStatus::Queued => "queued",
            VersionStatus::Running => "running",
            VersionStatus::Completed => "completed",
            VersionStatus::Failed => "failed",
            VersionStatus::Cancelled => "cancelled",
            VersionStatus::Updating => "updating",
        };
        f.write_str(s)
    }
}

/// How a crawl is bounded in link scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlScope {
    Subpages,
    Hostname,
    Domain,
}

impl Default for CrawlScope {
    fn default() -> Self {
        CrawlScope::Subpages
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    Auto,
    Fetch,
    Playwright,
}

impl Default for ScrapeMode {
    fn default() -> Self {
        ScrapeMode::Auto
    }
}

/// The reproducible subset of scrape configuration recorded on a version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperOptions {
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default)]
    pub scope: CrawlScope,
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    #[serde(default)]
    pub ignore_errors: bool,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub scrape_mode: ScrapeMode,
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,
}

fn default_max_pages() -> u32 {
    1000
}
fn default_max_depth() -> u32 {
    3
}
fn default_max_concurrency() -> u32 {
    3
}
fn default_true() -> bool {
    true
}

impl Default for ScraperOptions {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            scope: CrawlScope::default(),
            follow_redirects: true,
            ignore_errors: false,
            max_concurrency: default_max_concurrency(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            scrape_mode: ScrapeMode::default(),
            headers: Default::default(),
        }
    }
}

impl ScraperOptions {
    /// Synchronous validation at the enqueue boundary (SPEC_FULL §B).
    pub fn validate(&self) -> Result<(), String> {
        if self.max_pages < 1 {
            return Err("max_pages must be >= 1".to_string());
        }
        if self.max_concurrency < 1 {
            return Err("max_concurrency must be >= 1".to_string());
        }
        Ok(())
    }
}

/// A library row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: String,
    pub name: String,
}

/// A version row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub library_id: String,
    pub name: String,
    pub status: VersionStatus,
    pub progress_pages: u32,
    pub progress_max_pages: u32,
    pub source_url: Option<String>,
    pub scraper_options: Option<ScraperOptions>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A fetched-page row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub version_id: String,
    pub url: String,
    pub title: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_type: String,
    pub depth: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Structural metadata attached to a chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub path: Vec<String>,
    pub level: u32,
    pub types: Vec<String>,
}

impl ChunkMetadata {
    pub fn is_structural(&self) -> bool {
        self.types.iter().any(|t| t == "structural")
    }
}

/// The unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub page_id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub sort_order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Output of a content pipeline, before persistence.
#[derive(Debug, Clone)]
pub struct ScrapeResultChunk {
    pub content: String,
    pub path: Vec<String>,
    pub level: u32,
    pub types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScrapeResult {
    pub url: String,
    pub title: String,
    pub content_type: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub chunks: Vec<ScrapeResultChunk>,
}

/// A single hybrid-search hit over a chunk, before assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHit {
    pub chunk: Chunk,
    pub page_id: String,
    pub url: String,
    pub title: String,
    pub content_type: String,
    pub score: f64,
    pub vec_rank: Option<u32>,
    pub fts_rank: Option<u32>,
}

/// One assembled passage returned by the retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub content: String,
    pub score: f64,
    pub mime_type: String,
}

/// Embedding configuration recorded on first write to a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub dimension: u32,
    pub spec: String,
}

impl EmbeddingConfig {
    /// Parses a `provider:model` spec string.
    pub fn parse_spec(spec: &str) -> Result<(String, String), String> {
        match spec.split_once(':') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
                Ok((provider.to_string(), model.to_string()))
            }
            _ => Err(format!(
                "invalid embedding spec '{spec}', expected 'provider:model'"
            )),
        }
    }
}

/// Job lifecycle events published by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    JobEnqueued {
        version_id: String,
        job_id: String,
    },
    JobStatusChange {
        version_id: String,
        old: VersionStatus,
        new: VersionStatus,
        error: Option<String>,
    },
    JobProgress {
        version_id: String,
        pages: u32,
        max_pages: u32,
    },
    LibraryChange,
}

/// Public job info surfaced via `get_job_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: String,
    pub library: String,
    pub version: String,
    pub status: VersionStatus,
    pub pages: u32,
    pub max_pages: u32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Generic error envelope for the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub suggestions: Vec<String>,
}

/// `find_version` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindVersionResult {
    pub best_match: Option<String>,
    pub has_unversioned: bool,
}

/// Per-version summary in `list_libraries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version: String,
    pub status: VersionStatus,
    pub pages: u32,
    pub max_pages: u32,
    pub indexed_at: Option<DateTime<Utc>>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySummary {
    pub library: String,
    pub versions: Vec<VersionSummary>,
}

/// Normalizes `latest`, empty, and whitespace-only version inputs to the
/// unversioned variant.
pub fn normalize_version_input(input: Option<&str>) -> String {
    match input {
        None => String::new(),
        Some(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("latest") {
                String::new()
            } else {
                trimmed.to_string()
            }
        }
    }
}

/// Case/whitespace-insensitive normalization for library names and version
/// names.
pub fn normalize_name(input: &str) -> String {
    input.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::VersionStatus::*;
    use super::*;

    const ALL: [VersionStatus; 7] = [NotIndexed, Queued, Running, Completed, Failed, Cancelled, Updating];

    const LEGAL: [(VersionStatus, VersionStatus); 11] = [
        (NotIndexed, Queued),
        (Queued, Running),
        (Queued, Cancelled),
        (Running, Completed),
        (Running, Failed),
        (Running, Cancelled),
        (Completed, Updating),
        (Updating, Running),
        (Updating, Cancelled),
        (Failed, Queued),
        (Cancelled, Queued),
    ];

    #[test]
    fn transition_table_matches_exactly_the_legal_pairs() {
        for &from in &ALL {
            for &to in &ALL {
                let expected = LEGAL.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "can_transition_to({from:?}, {to:?}) should be {expected}"
                );
            }
        }
    }
}
