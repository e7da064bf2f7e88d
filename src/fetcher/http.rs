//! HTTP fetcher: conditional requests, redirect handling, retry-with-backoff
//! on transient errors.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH, LOCATION};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use super::{FetchError, FetchOptions, FetchResult, FetchStatus, Fetcher};

/// Redirect chains longer than this are treated as a permanent failure
/// rather than looped on forever.
const MAX_REDIRECTS: u32 = 10;

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_headers(&self, options: &FetchOptions) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (k, v) in &options.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_str(k), HeaderValue::from_str(v)) {
                headers.insert(name, value);
            }
        }
        if let Some(etag) = &options.if_none_match {
            if let Ok(value) = HeaderValue::from_str(etag) {
                headers.insert(IF_NONE_MATCH, value);
            }
        }
        if let Some(lm) = &options.if_modified_since {
            if let Ok(value) = HeaderValue::from_str(lm) {
                headers.insert(IF_MODIFIED_SINCE, value);
            }
        }
        headers
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn can_fetch(&self, url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }

    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResult, FetchError> {
        let headers = self.build_headers(options);
        let max_retries = options.max_retries.max(1);
        let mut current_url = url.to_string();
        let mut redirected = false;

        // The client itself never follows redirects (see its construction);
        // that's handled here so `options.follow_redirects` actually governs
        // whether a 3xx is chased or returned as-is.
        'redirects: for _ in 0..MAX_REDIRECTS {
            let mut last_err: Option<FetchError> = None;

            for attempt in 0..max_retries {
                let request = self
                    .client
                    .get(&current_url)
                    .headers(headers.clone())
                    .timeout(Duration::from_secs(30));

                let response = match request.send().await {
                    Ok(r) => r,
                    Err(e) if e.is_timeout() || e.is_connect() => {
                        last_err = Some(FetchError::Transient(e.to_string()));
                        backoff_sleep(attempt).await;
                        continue;
                    }
                    Err(e) => return Err(FetchError::Permanent(e.to_string())),
                };

                let status = response.status();

                if status.is_redirection() && options.follow_redirects {
                    let location = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .ok_or_else(|| {
                            FetchError::Permanent(format!(
                                "redirect with no Location header fetching {current_url}"
                            ))
                        })?;
                    let base = Url::parse(&current_url).map_err(|e| FetchError::Permanent(e.to_string()))?;
                    let next = base.join(location).map_err(|e| FetchError::Permanent(e.to_string()))?;
                    current_url = next.to_string();
                    redirected = true;
                    continue 'redirects;
                }

                if status.as_u16() == 304 {
                    return Ok(FetchResult {
                        status: FetchStatus::NotModified,
                        final_url: current_url,
                        content: Vec::new(),
                        mime_type: String::new(),
                        source: "http".to_string(),
                        etag: None,
                        last_modified: None,
                    });
                }
                if status.as_u16() == 404 {
                    return Ok(FetchResult {
                        status: FetchStatus::NotFound,
                        final_url: current_url,
                        content: Vec::new(),
                        mime_type: String::new(),
                        source: "http".to_string(),
                        etag: None,
                        last_modified: None,
                    });
                }
                if status.is_server_error() {
                    last_err = Some(FetchError::Transient(format!(
                        "server error {status} fetching {current_url}"
                    )));
                    backoff_sleep(attempt).await;
                    continue;
                }
                if status.is_client_error() {
                    return Err(FetchError::Permanent(format!(
                        "client error {status} fetching {current_url}"
                    )));
                }

                let etag = response
                    .headers()
                    .get("etag")
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());
                let last_modified = response
                    .headers()
                    .get("last-modified")
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());
                let mime_type = response
                    .headers()
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("text/html")
                    .split(';')
                    .next()
                    .unwrap_or("text/html")
                    .to_string();

                let content = response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::Transient(e.to_string()))?
                    .to_vec();

                return Ok(FetchResult {
                    status: if redirected { FetchStatus::Redirect } else { FetchStatus::Ok },
                    final_url: current_url,
                    content,
                    mime_type,
                    source: "http".to_string(),
                    etag,
                    last_modified,
                });
            }

            return Err(last_err.unwrap_or_else(|| FetchError::Transient(format!("exhausted retries for {current_url}"))));
        }

        Err(FetchError::Permanent(format!("too many redirects fetching {url}")))
    }
}

async fn backoff_sleep(attempt: u32) {
    let delay_ms = 200u64 * 2u64.saturating_pow(attempt);
    tokio::time::sleep(Duration::from_millis(delay_ms.min(5_000))).await;
}
