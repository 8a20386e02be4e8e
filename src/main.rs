//! Pointdesk API Server Binary
//!
//! Standalone HTTP service for the points ledger, order workflow, and
//! wager settlement engine.

use clap::Parser;
use pointdesk::api::ApiServer;
use pointdesk::common::config::ConfigLoader;
use pointdesk::services::ServiceBuilder;

#[derive(Parser, Debug)]
#[command(name = "pointdesk")]
#[command(about = "Points ledger & wager settlement service", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// API server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// API server port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long)]
    cors_origins: Option<String>,

    /// Request timeout in seconds (overrides config)
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pointdesk=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;

    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(origins) = args.cors_origins {
        config.api.allowed_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(timeout) = args.timeout {
        config.api.request_timeout_secs = timeout;
    }

    let services = ServiceBuilder::new(config.clone()).build();
    let server = ApiServer::new(config.api, services);
    server.run().await
}
