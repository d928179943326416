use std::sync::Arc;

use samling::{config::Config, mcp::McpServer, smk::SmkClient, upstream};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,samling=debug")),
        )
        .init();

    let config = Config::from_env()?;
    let http = upstream::http_client(config.upstream_timeout_secs)?;
    let smk = SmkClient::new(http, config.smk_base_url.clone(), config.upstream_rps);

    let server = McpServer::new(Arc::new(smk));
    server.serve(tokio::io::stdin(), tokio::io::stdout()).await?;
    Ok(())
}
