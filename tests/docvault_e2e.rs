//! End-to-end scenarios over the crawl → store → retriever pipeline, each
//! against a `wiremock` server standing in for a documentation site and a
//! `tempfile` store path standing in for `~/.docvault/store`.

use std::sync::Arc;

use docvault_mcp::core::cancel::CancelToken;
use docvault_mcp::core::types::{CrawlScope, JobEvent, ScraperOptions, VersionStatus};
use docvault_mcp::crawler;
use docvault_mcp::fetcher::auto::AutoFetcher;
use docvault_mcp::retriever;
use docvault_mcp::store::Store;
use tokio::sync::broadcast;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn open_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().expect("tempdir");
    let sqlite_path = dir.path().join("catalog.sqlite3");
    let vector_uri = dir.path().join("vectors").to_string_lossy().to_string();
    let store = Store::open(&sqlite_path, &vector_uri, 8).await.expect("open store");
    (dir, store)
}

fn fetcher() -> AutoFetcher {
    AutoFetcher::new(reqwest::Client::new())
}

fn options(max_pages: u32) -> ScraperOptions {
    ScraperOptions {
        max_pages,
        max_depth: 2,
        scope: CrawlScope::Subpages,
        follow_redirects: true,
        ignore_errors: false,
        max_concurrency: 2,
        include_patterns: Vec::new(),
        exclude_patterns: Vec::new(),
        scrape_mode: Default::default(),
        headers: Default::default(),
    }
}

#[tokio::test]
async fn scrape_then_search_finds_indexed_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/intro"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body><h1>Getting Started</h1><p>Install the widget toolkit before configuring it.</p></body></html>"),
        )
        .mount(&server)
        .await;

    let (_dir, store) = open_store().await;
    let version_id = store.resolve_version("widget-toolkit", Some("1.0")).await.unwrap();
    store.update_version_status(&version_id, VersionStatus::Queued, None).await.unwrap();
    store.update_version_status(&version_id, VersionStatus::Running, None).await.unwrap();

    let (tx, _rx) = broadcast::channel::<JobEvent>(16);
    let start_url = format!("{}/intro", server.uri());
    crawler::scrape::run(&store, &fetcher(), None, &version_id, &start_url, &options(5), &CancelToken::new(), &tx)
        .await
        .unwrap();

    let version = store.get_version(&version_id).await.unwrap();
    assert_eq!(version.status, VersionStatus::Completed);
    assert_eq!(version.progress_pages, 1);

    let results = retriever::search(&store, None, &version_id, "widget toolkit", 5).await.unwrap();
    assert!(!results.is_empty(), "expected at least one search hit");
    assert!(results[0].content.to_lowercase().contains("widget"));
}

#[tokio::test]
async fn refresh_updates_changed_page_and_removes_404d_page() {
    let server = MockServer::start().await;

    // /intro: unconditional 200 on first crawl, 304 on the conditional refresh.
    Mock::given(method("GET"))
        .and(path("/intro"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/intro"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .insert_header("etag", "\"v1\"")
                .set_body_string("<html><body><h1>Intro</h1><p>Stable content.</p></body></html>"),
        )
        .mount(&server)
        .await;

    // /deprecated: present on first crawl (200, consumed once), gone (404)
    // on every request after that — including the refresh pass.
    Mock::given(method("GET"))
        .and(path("/deprecated"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(
                    "<html><body><h1>Deprecated</h1><p>Going away soon.</p><a href=\"/intro\">intro</a></body></html>",
                ),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/deprecated"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (_dir, store) = open_store().await;
    let version_id = store.resolve_version("widget-toolkit", Some("1.0")).await.unwrap();
    store.update_version_status(&version_id, VersionStatus::Queued, None).await.unwrap();
    store.update_version_status(&version_id, VersionStatus::Running, None).await.unwrap();

    let (tx, _rx) = broadcast::channel::<JobEvent>(16);
    let deprecated_url = format!("{}/deprecated", server.uri());
    crawler::scrape::run(&store, &fetcher(), None, &version_id, &deprecated_url, &options(5), &CancelToken::new(), &tx)
        .await
        .unwrap();
    assert_eq!(store.get_pages_by_version_id(&version_id).await.unwrap().len(), 2, "expected /deprecated and the linked /intro page");

    store.update_version_status(&version_id, VersionStatus::Updating, None).await.unwrap();
    store.update_version_status(&version_id, VersionStatus::Running, None).await.unwrap();
    crawler::refresh::run(&store, &fetcher(), None, &version_id, &tx, &CancelToken::new())
        .await
        .unwrap();

    let pages = store.get_pages_by_version_id(&version_id).await.unwrap();
    assert_eq!(pages.len(), 1, "only the unchanged /intro page should survive refresh, got: {pages:?}");
    assert!(pages[0].url.ends_with("/intro"));

    let version = store.get_version(&version_id).await.unwrap();
    assert_eq!(version.status, VersionStatus::Completed);
}

#[tokio::test]
async fn cancelling_mid_crawl_stops_further_fetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body><p>content</p></body></html>"),
        )
        .mount(&server)
        .await;

    let (_dir, store) = open_store().await;
    let version_id = store.resolve_version("widget-toolkit", Some("1.0")).await.unwrap();
    store.update_version_status(&version_id, VersionStatus::Queued, None).await.unwrap();
    store.update_version_status(&version_id, VersionStatus::Running, None).await.unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();

    let (tx, _rx) = broadcast::channel::<JobEvent>(16);
    let start_url = format!("{}/page", server.uri());
    crawler::scrape::run(&store, &fetcher(), None, &version_id, &start_url, &options(5), &cancel, &tx)
        .await
        .unwrap();

    let version = store.get_version(&version_id).await.unwrap();
    assert_eq!(version.status, VersionStatus::Cancelled);
    assert!(store.get_pages_by_version_id(&version_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn removing_a_version_cleans_up_its_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/home"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body><h1>Home</h1><p>Landing page content.</p></body></html>"),
        )
        .mount(&server)
        .await;

    let (_dir, store) = open_store().await;
    let version_id = store.resolve_version("widget-toolkit", Some("1.0")).await.unwrap();
    store.update_version_status(&version_id, VersionStatus::Queued, None).await.unwrap();
    store.update_version_status(&version_id, VersionStatus::Running, None).await.unwrap();

    let (tx, _rx) = broadcast::channel::<JobEvent>(16);
    let start_url = format!("{}/home", server.uri());
    crawler::scrape::run(&store, &fetcher(), None, &version_id, &start_url, &options(5), &CancelToken::new(), &tx)
        .await
        .unwrap();
    assert_eq!(store.get_pages_by_version_id(&version_id).await.unwrap().len(), 1);

    store.remove_version(&version_id).await.unwrap();
    let err = store.get_version(&version_id).await.unwrap_err();
    assert!(matches!(err, docvault_mcp::core::errors::AppError::NotFound(_)));
}

#[tokio::test]
async fn scheduler_enforces_one_active_job_per_version() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body><p>slow page</p></body></html>")
                .set_delay(std::time::Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let (_dir, store) = open_store().await;
    let store = Arc::new(store);
    let http_client = reqwest::Client::new();
    let scheduler_config = docvault_mcp::core::config::SchedulerFileConfig::default();
    let scheduler = docvault_mcp::scheduler::Scheduler::new(store.clone(), http_client, None, &scheduler_config);

    let url = format!("{}/slow", server.uri());
    let first = scheduler
        .enqueue_scrape("widget-toolkit", Some("1.0"), url.clone(), options(1))
        .await
        .unwrap();
    let second = scheduler.enqueue_scrape("widget-toolkit", Some("1.0"), url, options(1)).await.unwrap();

    assert_eq!(first, second, "a second enqueue for the same version should return the existing job id");
}
