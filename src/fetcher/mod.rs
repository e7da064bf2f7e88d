//! Byte retrieval over HTTP or `file://`, with conditional-request support
//! for the refresh engine.

pub mod auto;
pub mod file;
pub mod http;

use async_trait::async_trait;
use std::collections::BTreeMap;

/// Per-request knobs a caller may set.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub follow_redirects: bool,
    pub max_retries: u32,
    pub headers: BTreeMap<String, String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Ok,
    NotModified,
    NotFound,
    Redirect,
}

/// A successfully fetched resource, or a 304/404/redirect signal — none of
/// these three are errors.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: FetchStatus,
    pub final_url: String,
    pub content: Vec<u8>,
    pub mime_type: String,
    pub source: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transient fetch error: {0}")]
    Transient(String),
    #[error("permanent fetch error: {0}")]
    Permanent(String),
}

/// The fetcher capability seam.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn can_fetch(&self, url: &str) -> bool;
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResult, FetchError>;
    /// Releases any owned resources (connections, file handles). No-op for
    /// stateless fetchers; meaningful for ones backed by a browser or pool
    ///").
    async fn close(&self) {}
}
