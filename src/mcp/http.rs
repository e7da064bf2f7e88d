//! Transport-agnostic tool dispatch plus its axum handlers. `call_tool` is
//! infallible at the HTTP boundary: every domain error (unknown tool, bad
//! arguments, not-found library, scheduler/store failure) comes back as an
//! `McpCallResponse` with `is_error: true` rather than a non-200 status, so
//! the stdio transport can relay it as a JSON-RPC result without a second
//! error-mapping layer.

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::core::types::{ErrorResponse, ScraperOptions};
use crate::retriever;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    pub title: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpToolsResponse {
    pub tools: Vec<McpTool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpCallRequest {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpCallResponse {
    pub content: Vec<McpContent>,
    pub is_error: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

pub fn list_tools_for_state(state: &AppState) -> McpToolsResponse {
    let tools = state
        .tool_registry
        .public_specs()
        .into_iter()
        .map(|spec| McpTool {
            name: spec.public_name,
            title: spec.public_title,
            description: spec.public_description,
            input_schema: spec.public_input_schema,
            icons: spec.icons,
        })
        .collect();

    McpToolsResponse { tools }
}

pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<McpToolsResponse> {
    Json(list_tools_for_state(state.as_ref()))
}

/// A handler-local error: text plus whatever library-name suggestions apply.
/// Always surfaces through `McpCallResponse.is_error`, never an HTTP status.
struct ToolError {
    error: ErrorResponse,
}

impl ToolError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            error: ErrorResponse {
                error: message.into(),
                suggestions: Vec::new(),
            },
        }
    }

    fn with_suggestions(message: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self {
            error: ErrorResponse {
                error: message.into(),
                suggestions,
            },
        }
    }
}

impl From<crate::core::errors::AppError> for ToolError {
    fn from(e: crate::core::errors::AppError) -> Self {
        ToolError::new(e.to_string())
    }
}

fn error_response(err: ToolError) -> McpCallResponse {
    McpCallResponse {
        content: vec![McpContent {
            content_type: "text".to_string(),
            text: serde_json::to_string(&err.error).unwrap_or(err.error.error),
        }],
        is_error: true,
    }
}

fn ok_response(value: Value) -> McpCallResponse {
    McpCallResponse {
        content: vec![McpContent {
            content_type: "text".to_string(),
            text: value.to_string(),
        }],
        is_error: false,
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: &Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments.clone()).map_err(|e| ToolError::new(format!("invalid arguments: {e}")))
}

/// Resolves `(library, version)` against what's already indexed, without
/// the create-on-miss behavior `Store::resolve_version` has for scrape
/// enqueue. Returns a not-found error carrying fuzzy library suggestions
/// when the library itself is unknown.
async fn resolve_existing_version(
    state: &AppState,
    library: &str,
    version: Option<&str>,
) -> Result<String, ToolError> {
    let found = state.store.find_version(library, version).await?;
    let Some(name) = found.best_match else {
        let suggestions = state.store.suggest_library_names(library).await.unwrap_or_default();
        return Err(ToolError::with_suggestions(format!("library '{library}' not found"), suggestions));
    };
    Ok(state.store.resolve_version(library, Some(&name)).await?)
}

#[derive(Deserialize)]
struct SearchDocsArgs {
    library: String,
    version: Option<String>,
    query: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ListVersionsArgs {
    library: String,
}

#[derive(Deserialize)]
struct FindVersionArgs {
    library: String,
    target: Option<String>,
}

#[derive(Deserialize)]
struct ScrapeDocsArgs {
    url: String,
    library: String,
    version: Option<String>,
    #[serde(default)]
    options: ScraperOptions,
}

#[derive(Deserialize)]
struct FetchUrlArgs {
    url: String,
    #[serde(default)]
    options: ScraperOptions,
}

#[derive(Deserialize)]
struct RemoveDocsArgs {
    library: String,
    version: Option<String>,
}

#[derive(Deserialize, Default)]
struct GetJobInfoArgs {
    job_id: Option<String>,
}

#[derive(Deserialize)]
struct CancelJobArgs {
    job_id: String,
}

#[derive(Deserialize)]
struct RefreshVersionArgs {
    library: String,
    version: Option<String>,
}

fn search_cache_key(library: &str, version: Option<&str>, query: &str, limit: usize) -> String {
    format!("{library}\u{1}{}\u{1}{query}\u{1}{limit}", version.unwrap_or(""))
}

async fn handle_search_docs(state: &AppState, arguments: &Value) -> Result<Value, ToolError> {
    let args: SearchDocsArgs = parse_args(arguments)?;
    let limit = args.limit.unwrap_or(5).max(1);
    let cache_key = search_cache_key(&args.library, args.version.as_deref(), &args.query, limit);

    if let Some(cached) = state.search_cache.get(&cache_key).await {
        return Ok(json!({ "results": cached }));
    }

    let version_id = resolve_existing_version(state, &args.library, args.version.as_deref()).await?;
    let results = retriever::search(&state.store, state.embedder.as_ref(), &version_id, &args.query, limit).await?;
    state.search_cache.insert(cache_key, results.clone()).await;
    Ok(json!({ "results": results }))
}

async fn handle_list_libraries(state: &AppState) -> Result<Value, ToolError> {
    let libraries = state.store.list_libraries().await?;
    Ok(json!({ "libraries": libraries }))
}

async fn handle_list_versions(state: &AppState, arguments: &Value) -> Result<Value, ToolError> {
    let args: ListVersionsArgs = parse_args(arguments)?;
    let versions = state.store.list_versions(&args.library).await?;
    Ok(json!({ "versions": versions }))
}

async fn handle_find_version(state: &AppState, arguments: &Value) -> Result<Value, ToolError> {
    let args: FindVersionArgs = parse_args(arguments)?;
    let result = state.store.find_version(&args.library, args.target.as_deref()).await?;
    serde_json::to_value(result).map_err(|e| ToolError::new(e.to_string()))
}

async fn handle_scrape_docs(state: &AppState, arguments: &Value) -> Result<Value, ToolError> {
    let args: ScrapeDocsArgs = parse_args(arguments)?;
    let job_id = state
        .scheduler
        .enqueue_scrape(&args.library, args.version.as_deref(), args.url, args.options)
        .await?;
    Ok(json!({ "job_id": job_id }))
}

async fn handle_fetch_url(state: &AppState, arguments: &Value) -> Result<Value, ToolError> {
    let args: FetchUrlArgs = parse_args(arguments)?;
    let fetcher = crate::fetcher::auto::AutoFetcher::new(state.http_client.clone());
    let fetch_opts = crate::fetcher::FetchOptions {
        follow_redirects: args.options.follow_redirects,
        max_retries: 3,
        headers: args.options.headers,
        if_none_match: None,
        if_modified_since: None,
    };
    let fetched = crate::fetcher::Fetcher::fetch(&fetcher, &args.url, &fetch_opts)
        .await
        .map_err(|e| ToolError::new(e.to_string()))?;

    let pipelines = crate::pipelines::default_pipelines();
    let output = crate::pipelines::dispatch(&pipelines, &args.url, &fetched.mime_type, &fetched.content)
        .map_err(|e| ToolError::new(e.to_string()))?;
    let markdown = output.chunks.into_iter().map(|c| c.content).collect::<Vec<_>>().join("\n\n");

    Ok(json!({ "markdown_string": markdown }))
}

async fn handle_remove_docs(state: &AppState, arguments: &Value) -> Result<Value, ToolError> {
    let args: RemoveDocsArgs = parse_args(arguments)?;
    let version_id = resolve_existing_version(state, &args.library, args.version.as_deref()).await?;
    state.store.remove_version(&version_id).await?;
    Ok(json!({ "removed": true }))
}

async fn handle_get_job_info(state: &AppState, arguments: &Value) -> Result<Value, ToolError> {
    let args: GetJobInfoArgs = if arguments.is_null() { GetJobInfoArgs::default() } else { parse_args(arguments)? };
    let jobs = state.scheduler.get_job_info(args.job_id.as_deref()).await?;
    Ok(json!({ "jobs": jobs }))
}

async fn handle_cancel_job(state: &AppState, arguments: &Value) -> Result<Value, ToolError> {
    let args: CancelJobArgs = parse_args(arguments)?;
    state.scheduler.cancel_job(&args.job_id).await?;
    Ok(json!({ "cancelled": true }))
}

async fn handle_clear_completed_jobs(state: &AppState) -> Result<Value, ToolError> {
    let n = state.scheduler.clear_completed_jobs().await?;
    Ok(json!({ "cleared": n }))
}

async fn handle_refresh_version(state: &AppState, arguments: &Value) -> Result<Value, ToolError> {
    let args: RefreshVersionArgs = parse_args(arguments)?;
    let job_id = state.scheduler.enqueue_refresh(&args.library, args.version.as_deref()).await?;
    Ok(json!({ "job_id": job_id }))
}

pub async fn call_tool(State(state): State<Arc<AppState>>, Json(request): Json<McpCallRequest>) -> Json<McpCallResponse> {
    info!("MCP tool call: {} with args: {:?}", request.name, request.arguments);

    let Some(internal_name) = state.tool_registry.resolve_incoming_tool_name(&request.name) else {
        return Json(error_response(ToolError::new(format!("unknown tool: {}", request.name))));
    };

    let arguments = state.tool_registry.map_public_arguments_to_internal(&internal_name, request.arguments);

    let result = match internal_name.as_str() {
        "search_docs" => handle_search_docs(&state, &arguments).await,
        "list_libraries" => handle_list_libraries(&state).await,
        "list_versions" => handle_list_versions(&state, &arguments).await,
        "find_version" => handle_find_version(&state, &arguments).await,
        "scrape_docs" => handle_scrape_docs(&state, &arguments).await,
        "fetch_url" => handle_fetch_url(&state, &arguments).await,
        "remove_docs" => handle_remove_docs(&state, &arguments).await,
        "get_job_info" => handle_get_job_info(&state, &arguments).await,
        "cancel_job" => handle_cancel_job(&state, &arguments).await,
        "clear_completed_jobs" => handle_clear_completed_jobs(&state).await,
        "refresh_version" => handle_refresh_version(&state, &arguments).await,
        other => Err(ToolError::new(format!("unknown tool: {other}"))),
    };

    Json(match result {
        Ok(value) => ok_response(value),
        Err(e) => error_response(e),
    })
}
