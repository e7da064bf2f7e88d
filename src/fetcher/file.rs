//! Local-file fetcher: resolves `file://` paths and enumerates directories
//! into pseudo-pages for the crawler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{FetchError, FetchOptions, FetchResult, FetchStatus, Fetcher};

pub struct FileFetcher;

impl FileFetcher {
    pub fn new() -> Self {
        Self
    }

    fn path_from_url(url: &str) -> std::path::PathBuf {
        let stripped = url.strip_prefix("file://").unwrap_or(url);
        std::path::PathBuf::from(stripped)
    }

    fn guess_mime(path: &std::path::Path) -> String {
        match path.extension().and_then(|e| e.to_str()) {
            Some("md") => "text/markdown".to_string(),
            Some("html") | Some("htm") => "text/html".to_string(),
            Some("json") => "application/json".to_string(),
            Some("rs") | Some("py") | Some("js") | Some("ts") | Some("go") | Some("java") => {
                "text/x-source-code".to_string()
            }
            _ => "text/plain".to_string(),
        }
    }

    /// Recursively lists files under `root` as `file://` URLs, for the
    /// crawler's BFS traversal over a local directory tree.
    pub async fn enumerate(root: &std::path::Path) -> std::io::Result<Vec<String>> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    out.push(format!("file://{}", path.display()));
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

impl Default for FileFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    fn can_fetch(&self, url: &str) -> bool {
        url.starts_with("file://") || (!url.contains("://") && std::path::Path::new(url).exists())
    }

    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResult, FetchError> {
        let path = Self::path_from_url(url);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FetchResult {
                    status: FetchStatus::NotFound,
                    final_url: url.to_string(),
                    content: Vec::new(),
                    mime_type: String::new(),
                    source: "file".to_string(),
                    etag: None,
                    last_modified: None,
                });
            }
            Err(e) => return Err(FetchError::Permanent(format!("{url}: {e}"))),
        };

        let modified: DateTime<Utc> = metadata
            .modified()
            .map_err(|e| FetchError::Permanent(e.to_string()))?
            .into();
        let last_modified = modified.to_rfc3339();

        if let Some(since) = &options.if_modified_since {
            if let Ok(since_dt) = DateTime::parse_from_rfc3339(since) {
                if modified <= since_dt {
                    return Ok(FetchResult {
                        status: FetchStatus::NotModified,
                        final_url: url.to_string(),
                        content: Vec::new(),
                        mime_type: String::new(),
                        source: "file".to_string(),
                        etag: None,
                        last_modified: None,
                    });
                }
            }
        }

        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| FetchError::Permanent(format!("{url}: {e}")))?;

        Ok(FetchResult {
            status: FetchStatus::Ok,
            final_url: url.to_string(),
            content,
            mime_type: Self::guess_mime(&path),
            source: "file".to_string(),
            etag: None,
            last_modified: Some(last_modified),
        })
    }
}
