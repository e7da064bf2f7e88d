//! Composite fetcher that auto-detects which variant can serve a URL.

use async_trait::async_trait;

use super::{FetchError, FetchOptions, FetchResult, Fetcher};
use crate::core::types::ScrapeMode;

pub struct AutoFetcher {
    http: super::http::HttpFetcher,
    file: super::file::FileFetcher,
}

impl AutoFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            http: super::http::HttpFetcher::new(client),
            file: super::file::FileFetcher::new(),
        }
    }

    /// `scrape_mode` from the wire shape is advisory today: both `Auto` and
    /// `Fetch` resolve to the HTTP/file fetcher pair; `Playwright` is a seam
    /// for a headless-browser fetcher this crate does not itself implement.
    pub fn pick(&self, url: &str, _mode: ScrapeMode) -> &dyn Fetcher {
        if self.file.can_fetch(url) {
            &self.file
        } else {
            &self.http
        }
    }
}

#[async_trait]
impl Fetcher for AutoFetcher {
    fn can_fetch(&self, url: &str) -> bool {
        self.http.can_fetch(url) || self.file.can_fetch(url)
    }

    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResult, FetchError> {
        self.pick(url, ScrapeMode::Auto).fetch(url, options).await
    }

    async fn close(&self) {
        self.http.close().await;
        self.file.close().await;
    }
}
