use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use std::env;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use docvault_mcp::core::config;
use docvault_mcp::core::errors::AppError;
use docvault_mcp::embedder;
use docvault_mcp::mcp;
use docvault_mcp::scheduler::Scheduler;
use docvault_mcp::store::Store;
use docvault_mcp::AppState;

fn parse_port_from_args() -> Option<u16> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == "--port" {
            if let Some(v) = args.next() {
                if let Ok(p) = v.parse::<u16>() {
                    return Some(p);
                }
            }
        } else if let Some(rest) = a.strip_prefix("--port=") {
            if let Ok(p) = rest.parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

fn port_from_env() -> Option<u16> {
    for k in ["DOCVAULT_PORT", "PORT"] {
        if let Ok(v) = std::env::var(k) {
            if let Ok(p) = v.trim().parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("Starting DocVault MCP server");

    let http_timeout = env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(30);
    let connect_timeout = env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(10);
    // Redirects are chased manually in `HttpFetcher` so `follow_redirects`
    // can actually be honored per request.
    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(http_timeout))
        .connect_timeout(std::time::Duration::from_secs(connect_timeout))
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let app_config = config::load_config();
    let store_path = config::store_path();
    let sqlite_path = config::sqlite_path(&store_path);
    let vector_uri = config::vector_uri();

    let built = embedder::build_embedder(&app_config, http_client.clone()).await?;
    let dimension = built.as_ref().map(|(_, cfg)| cfg.dimension).unwrap_or(app_config.embedding.resolve_dimension());

    let store = Arc::new(Store::open(&sqlite_path, &vector_uri, dimension).await?);

    let embedder = if let Some((embedder, embedding_config)) = built {
        store.ensure_embedding_config(&embedding_config).await?;
        info!("Embedding provider configured: {}:{}", embedding_config.provider, embedding_config.model);
        Some(embedder)
    } else {
        info!("No embedding provider configured; search will use full-text matching only");
        None
    };

    let scheduler = Scheduler::new(store.clone(), http_client.clone(), embedder.clone(), &app_config.scheduler);
    scheduler.recover_orphaned_jobs().await?;

    let state = Arc::new(AppState::new(http_client, store, scheduler, embedder, app_config));

    let app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/.well-known/mcp/server-card.json", get(server_card))
        .route("/mcp", post(mcp_rpc_handler))
        .route("/mcp/tools", get(mcp::list_tools))
        .route("/mcp/call", post(mcp::call_tool))
        .route("/api/libraries", get(list_libraries))
        .route("/api/libraries/{library}/versions", get(list_versions))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/{job_id}", get(get_job))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let port: u16 = parse_port_from_args().or_else(port_from_env).unwrap_or(5000);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT/DOCVAULT_PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("DocVault MCP server listening on http://{}", bind_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();
        let mut sigint = signal(SignalKind::interrupt()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
            _ = async {
                if let Some(ref mut s) = sigint {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "docvault-mcp",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn server_card(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let tools: Vec<serde_json::Value> = state
        .tool_registry
        .public_specs()
        .into_iter()
        .map(|spec| {
            serde_json::json!({
                "name": spec.public_name,
                "description": spec.public_description
            })
        })
        .collect();

    Json(serde_json::json!({
        "serverInfo": {
            "name": "DocVault",
            "version": env!("CARGO_PKG_VERSION")
        },
        "tools": tools,
        "resources": [],
        "prompts": []
    }))
}

async fn mcp_rpc_handler(State(state): State<Arc<AppState>>, Json(request): Json<serde_json::Value>) -> Json<serde_json::Value> {
    let id = request.get("id").cloned().unwrap_or(serde_json::Value::Null);
    let method = request.get("method").and_then(|m| m.as_str()).unwrap_or_default();

    match method {
        "initialize" => Json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "DocVault",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }
        })),
        "tools/list" => {
            let tools = mcp::list_tools_for_state(state.as_ref());
            Json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": tools
            }))
        }
        "tools/call" => {
            let params = request.get("params").cloned().unwrap_or(serde_json::Value::Null);
            let name = params.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let arguments = params.get("arguments").cloned().unwrap_or(serde_json::Value::Null);
            let Json(response) = mcp::call_tool(
                State(state.clone()),
                Json(mcp::McpCallRequest { name, arguments }),
            )
            .await;
            Json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": response
            }))
        }
        _ => Json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": -32601,
                "message": "Method not found"
            }
        })),
    }
}

/// Maps a store/scheduler error onto the HTTP status `AppError::http_status`
/// assigns it, alongside a `{error, kind}` body.
fn error_response(e: &AppError) -> (StatusCode, Json<serde_json::Value>) {
    let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({ "error": e.to_string(), "kind": e.kind() })))
}

/// Thin read-only REST mirrors of the listing/job-status tools, for
/// operators poking at the server without an MCP client.
async fn list_libraries(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.list_libraries().await {
        Ok(libraries) => (StatusCode::OK, Json(serde_json::json!({ "libraries": libraries }))),
        Err(e) => error_response(&e),
    }
}

async fn list_versions(
    State(state): State<Arc<AppState>>,
    Path(library): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.list_versions(&library).await {
        Ok(versions) => (StatusCode::OK, Json(serde_json::json!({ "versions": versions }))),
        Err(e) => error_response(&e),
    }
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    match state.scheduler.get_job_info(None).await {
        Ok(jobs) => (StatusCode::OK, Json(serde_json::json!({ "jobs": jobs }))),
        Err(e) => error_response(&e),
    }
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.scheduler.get_job_info(Some(&job_id)).await {
        Ok(jobs) => (StatusCode::OK, Json(serde_json::json!({ "jobs": jobs }))),
        Err(e) => error_response(&e),
    }
}
