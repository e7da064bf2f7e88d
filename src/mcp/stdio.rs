use crate::core::config;
use crate::embedder;
use crate::mcp::http::{list_tools_for_state, McpCallRequest};
use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::AppState;
use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct McpService {
    pub state: Arc<AppState>,
}

impl McpService {
    pub async fn new() -> anyhow::Result<Self> {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init()
            .ok();

        info!("Starting DocVault MCP stdio service");

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

        let state = AppState::new(http_client, store, scheduler, embedder, app_config);

        Ok(Self {
            state: Arc::new(state),
        })
    }
}

fn jsonrpc_error(id: &Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message.into()
        }
    })
}

fn jsonrpc_result(id: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

async fn handle_tools_list(service: &McpService, id: &Value) -> Value {
    let tools = list_tools_for_state(service.state.as_ref());
    match serde_json::to_value(tools) {
        Ok(v) => jsonrpc_result(id, v),
        Err(e) => jsonrpc_error(id, -32603, format!("failed to serialize tools: {}", e)),
    }
}

async fn handle_tools_call(service: &McpService, id: &Value, params: &Value) -> Value {
    let name = params.get("name").and_then(|v| v.as_str());
    let arguments = params.get("arguments");

    let Some(name) = name else {
        return jsonrpc_error(id, -32602, "Missing required field: params.name");
    };
    let Some(arguments) = arguments else {
        return jsonrpc_error(id, -32602, "Missing required field: params.arguments");
    };

    let request = McpCallRequest {
        name: name.to_string(),
        arguments: arguments.clone(),
    };

    let Json(response) = crate::mcp::call_tool(State(Arc::clone(&service.state)), Json(request)).await;
    match serde_json::to_value(response) {
        Ok(v) => jsonrpc_result(id, v),
        Err(e) => jsonrpc_error(id, -32603, format!("failed to serialize result: {}", e)),
    }
}

pub async fn run() -> anyhow::Result<()> {
    let service = McpService::new().await?;
    info!("MCP stdio server initialized; waiting for client session");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    let mut has_initialize = false;
    let mut is_initialized = false;
    let mut shutdown_requested = false;

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Ok(msg) = serde_json::from_str::<Value>(trimmed) else {
            continue;
        };

        let method = msg.get("method").and_then(|v| v.as_str()).unwrap_or("");
        let id = msg.get("id").cloned().unwrap_or(Value::Null);
        let is_request = msg.get("id").is_some();
        let params = msg.get("params").cloned().unwrap_or(Value::Null);

        // Notifications
        if !is_request {
            match method {
                // MCP: client sends this after it receives initialize response.
                // Some clients send params omitted or {}, accept both.
                "initialized" => {
                    has_initialize = true;
                    is_initialized = true;
                    continue;
                }
                "exit" => {
                    if shutdown_requested {
                        break;
                    }
                    continue;
                }
                _ => continue,
            }
        }

        // Requests
        let response = match method {
            "initialize" => {
                has_initialize = true;
                // Do not mark initialized until we get the notification.
                let server_info = json!({
                    "name": "docvault-mcp",
                    "title": "DocVault MCP",
                    "version": env!("CARGO_PKG_VERSION")
                });
                jsonrpc_result(
                    &id,
                    json!({
                        "protocolVersion": "2024-11-05",
                        "capabilities": {"tools": {}},
                        "serverInfo": server_info
                    }),
                )
            }
            "shutdown" => {
                shutdown_requested = true;
                jsonrpc_result(&id, Value::Null)
            }
            "tools/list" => {
                if !has_initialize || !is_initialized {
                    jsonrpc_error(&id, -32002, "Server not initialized")
                } else {
                    handle_tools_list(&service, &id).await
                }
            }
            "tools/call" => {
                if !has_initialize || !is_initialized {
                    jsonrpc_error(&id, -32002, "Server not initialized")
                } else {
                    handle_tools_call(&service, &id, &params).await
                }
            }
            _ => jsonrpc_error(&id, -32601, format!("Method not found: {}", method)),
        };

        let out = serde_json::to_string(&response).unwrap_or_else(|e| {
            serde_json::to_string(&jsonrpc_error(&id, -32603, format!("serialize error: {}", e)))
                .unwrap_or_else(|_| "{\"jsonrpc\":\"2.0\",\"id\":null,\"error\":{\"code\":-32603,\"message\":\"serialize error\"}}".to_string())
        });

        stdout.write_all(out.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    warn!("MCP stdio server stopped");
    Ok(())
}
