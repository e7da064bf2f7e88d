//! The scrape job body (§4.4): a breadth-first crawl from one start URL,
//! bounded by page/depth/concurrency limits, writing each page through the
//! content pipelines into the store as it goes.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tracing::warn;
use url::Url;

use crate::core::cancel::CancelToken;
use crate::core::errors::{AppError, AppResult};
use crate::core::types::{JobEvent, ScrapeResult, ScraperOptions, VersionStatus};
use crate::embedder::Embedder;
use crate::fetcher::{FetchOptions, FetchStatus, Fetcher};
use crate::pipelines;
use crate::store::Store;

use super::{enumerate_file_root, extract_links, in_scope, passes_filters};

/// Runs one scrape to completion (or cancellation/failure), leaving the
/// version in a terminal status. Assumes the caller has already transitioned
/// the version to `RUNNING`.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    store: &Store,
    fetcher: &dyn Fetcher,
    embedder: Option<&Arc<dyn Embedder>>,
    version_id: &str,
    start_url: &str,
    options: &ScraperOptions,
    cancel: &CancelToken,
    events: &broadcast::Sender<JobEvent>,
) -> AppResult<()> {
    store.set_scraper_options(version_id, start_url, options).await?;

    let start = Url::parse(start_url)
        .map_err(|e| AppError::Validation(format!("invalid start url '{start_url}': {e}")))?;

    let pipelines = pipelines::default_pipelines();

    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, u32)> = VecDeque::new();
    match enumerate_file_root(&start).await? {
        Some(files) => {
            for f in files {
                if visited.insert(f.clone()) {
                    queue.push_back((f, 0));
                }
            }
        }
        None => {
            visited.insert(start_url.to_string());
            queue.push_back((start_url.to_string(), 0));
        }
    }

    let mut pages_indexed: u32 = 0;
    let mut failure: Option<String> = None;
    let concurrency = options.max_concurrency.max(1) as usize;

    'outer: while !queue.is_empty() && pages_indexed < options.max_pages {
        if cancel.is_cancelled() {
            break;
        }

        let remaining = (options.max_pages - pages_indexed) as usize;
        let mut batch = Vec::new();
        while batch.len() < concurrency.min(remaining.max(1)) {
            match queue.pop_front() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        let fetch_opts = FetchOptions {
            follow_redirects: options.follow_redirects,
            max_retries: 3,
            headers: options.headers.clone(),
            if_none_match: None,
            if_modified_since: None,
        };

        let results: Vec<_> = stream::iter(batch.into_iter().map(|(url, depth)| {
            let fetch_opts = fetch_opts.clone();
            async move {
                let outcome = fetcher.fetch(&url, &fetch_opts).await;
                (url, depth, outcome)
            }
        }))
        .buffer_unordered(concurrency)
        .collect()
        .await;

        for (url, depth, outcome) in results {
            if cancel.is_cancelled() {
                break 'outer;
            }
            if pages_indexed >= options.max_pages {
                break;
            }

            let fetched = match outcome {
                Ok(fr) if fr.status == FetchStatus::Ok || fr.status == FetchStatus::Redirect => fr,
                Ok(_) => continue,
                Err(e) => {
                    if options.ignore_errors {
                        warn!("scrape: fetch failed for {url}: {e}");
                        continue;
                    }
                    failure = Some(e.to_string());
                    break 'outer;
                }
            };

            let canonical_url = if fetched.status == FetchStatus::Redirect && options.follow_redirects {
                fetched.final_url.clone()
            } else {
                url.clone()
            };

            let pipeline_out =
                pipelines::dispatch(&pipelines, &canonical_url, &fetched.mime_type, &fetched.content);
            let out = match pipeline_out {
                Ok(o) => o,
                Err(e) => {
                    if options.ignore_errors {
                        warn!("scrape: pipeline failed for {url}: {e}");
                        continue;
                    }
                    failure = Some(e.to_string());
                    break 'outer;
                }
            };

            let scrape_result = ScrapeResult {
                url: canonical_url.clone(),
                title: out.title,
                content_type: out.content_type,
                etag: fetched.etag.clone(),
                last_modified: fetched.last_modified.clone(),
                chunks: out.chunks,
            };

            match store.add_documents(version_id, depth, &scrape_result, embedder).await {
                Ok(_) => {
                    pages_indexed += 1;
                    let _ = events.send(JobEvent::JobProgress {
                        version_id: version_id.to_string(),
                        pages: pages_indexed,
                        max_pages: options.max_pages,
                    });
                }
                Err(e) => {
                    if options.ignore_errors {
                        warn!("scrape: store write failed for {url}: {e}");
                        continue;
                    }
                    failure = Some(e.to_string());
                    break 'outer;
                }
            }

            if depth < options.max_depth && fetched.mime_type == "text/html" {
                let html = String::from_utf8_lossy(&fetched.content);
                for link in extract_links(&html, &canonical_url) {
                    if visited.contains(&link) {
                        continue;
                    }
                    if !in_scope(&link, &start, options.scope) {
                        continue;
                    }
                    if !passes_filters(&link, &options.include_patterns, &options.exclude_patterns) {
                        continue;
                    }
                    visited.insert(link.clone());
                    queue.push_back((link, depth + 1));
                }
            }
        }
    }

    if cancel.is_cancelled() {
        store.update_version_status(version_id, VersionStatus::Cancelled, None).await?;
        return Ok(());
    }

    if let Some(err) = failure {
        store.update_version_status(version_id, VersionStatus::Failed, Some(&err)).await?;
        return Ok(());
    }

    store.update_version_progress(version_id, pages_indexed, options.max_pages).await?;
    store.update_version_status(version_id, VersionStatus::Completed, None).await?;
    Ok(())
}
