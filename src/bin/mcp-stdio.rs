#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    // MCP hosts may probe stdio servers with `--version`/`--help` before
    // starting a JSON-RPC session; answer those instead of blocking on stdin.
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("docvault-mcp (MCP stdio server); usage: docvault-mcp [--version|--help]");
        return Ok(());
    }

    docvault_mcp::mcp::stdio::run().await
}
