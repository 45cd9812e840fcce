#[tokio::main]
async fn main() {
    if let Err(err) = infolab_mcp::mcp::server::run_stdio().await {
        eprintln!("infolab-mcp: {}", err);
        std::process::exit(1);
    }
}
