//! The refresh job body (§4.5): a differential re-crawl that reuses stored
//! scraper options, issues conditional requests against previously-known
//! pages, and never deletes a page it did not actually revisit with a 404.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tracing::warn;
use url::Url;

use crate::core::cancel::CancelToken;
use crate::core::errors::{AppError, AppResult};
use crate::core::types::{JobEvent, Page, ScrapeResult, ScraperOptions, VersionStatus};
use crate::embedder::Embedder;
use crate::fetcher::{FetchOptions, FetchStatus, Fetcher};
use crate::pipelines;
use crate::store::Store;

use super::{enumerate_file_root, extract_links, in_scope, passes_filters};

/// Runs a refresh to completion. Assumes the caller has already transitioned
/// the version to `RUNNING` (from `UPDATING`).
pub async fn run(
    store: &Store,
    fetcher: &dyn Fetcher,
    embedder: Option<&Arc<dyn Embedder>>,
    version_id: &str,
    events: &broadcast::Sender<JobEvent>,
    cancel: &CancelToken,
) -> AppResult<()> {
    let version = store.get_version(version_id).await?;
    let source_url = version
        .source_url
        .clone()
        .ok_or_else(|| AppError::Validation("version has no recorded source url to refresh".to_string()))?;
    let options = version.scraper_options.clone().unwrap_or_default();

    let existing_pages = store.get_pages_by_version_id(version_id).await?;
    let known: HashMap<String, Page> = existing_pages.into_iter().map(|p| (p.url.clone(), p)).collect();

    let start = Url::parse(&source_url)
        .map_err(|e| AppError::Validation(format!("invalid stored source url '{source_url}': {e}")))?;

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
            visited.insert(source_url.clone());
            queue.push_back((source_url.clone(), 0));
        }
    }
    for (url, page) in &known {
        if visited.insert(url.clone()) {
            queue.push_back((url.clone(), page.depth));
        }
    }

    let mut pages_touched: u32 = 0;
    let mut failure: Option<String> = None;
    let concurrency = options.max_concurrency.max(1) as usize;

    'outer: while !queue.is_empty() {
        if cancel.is_cancelled() {
            break;
        }

        let mut batch = Vec::new();
        while batch.len() < concurrency {
            match queue.pop_front() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        let results: Vec<_> = stream::iter(batch.into_iter().map(|(url, depth)| {
            let known_page = known.get(&url).cloned();
            let fetch_opts = FetchOptions {
                follow_redirects: options.follow_redirects,
                max_retries: 3,
                headers: options.headers.clone(),
                if_none_match: known_page.as_ref().and_then(|p| p.etag.clone()),
                if_modified_since: known_page.as_ref().and_then(|p| p.last_modified.clone()),
            };
            async move {
                let outcome = fetcher.fetch(&url, &fetch_opts).await;
                (url, depth, known_page, outcome)
            }
        }))
        .buffer_unordered(concurrency)
        .collect()
        .await;

        for (url, depth, known_page, outcome) in results {
            if cancel.is_cancelled() {
                break 'outer;
            }

            let fetched = match outcome {
                Ok(fr) => fr,
                Err(e) => {
                    if options.ignore_errors {
                        warn!("refresh: fetch failed for {url}: {e}");
                        continue;
                    }
                    failure = Some(e.to_string());
                    break 'outer;
                }
            };

            match fetched.status {
                FetchStatus::NotModified => {
                    // unchanged; leave the stored page and chunks untouched
                }
                FetchStatus::NotFound => {
                    if let Some(p) = known_page {
                        store.delete_page(&p.id).await?;
                        pages_touched += 1;
                    }
                }
                FetchStatus::Ok | FetchStatus::Redirect => {
                    let canonical_url = if fetched.status == FetchStatus::Redirect && options.follow_redirects {
                        fetched.final_url.clone()
                    } else {
                        url.clone()
                    };

                    if canonical_url != url {
                        if let Some(p) = &known_page {
                            store.delete_page(&p.id).await?;
                        }
                    }

                    let pipeline_out =
                        pipelines::dispatch(&pipelines, &canonical_url, &fetched.mime_type, &fetched.content);
                    let out = match pipeline_out {
                        Ok(o) => o,
                        Err(e) => {
                            if options.ignore_errors {
                                warn!("refresh: pipeline failed for {url}: {e}");
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
                            pages_touched += 1;
                            let _ = events.send(JobEvent::JobProgress {
                                version_id: version_id.to_string(),
                                pages: pages_touched,
                                max_pages: options.max_pages,
                            });
                        }
                        Err(e) => {
                            if options.ignore_errors {
                                warn!("refresh: store write failed for {url}: {e}");
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

    let final_pages = store.get_pages_by_version_id(version_id).await?.len() as u32;
    let max_pages = options.max_pages.max(final_pages);
    store.update_version_progress(version_id, final_pages, max_pages).await?;
    store.update_version_status(version_id, VersionStatus::Completed, None).await?;
    Ok(())
}
