//! API Server
//!
//! Server setup: middleware stack, listener, graceful shutdown.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    monitoring::MetricsRegistry,
    routes::create_router,
};
use crate::common::config::ApiSettings;
use crate::services::ServiceContainer;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// HTTP server over the wired core services.
pub struct ApiServer {
    config: ApiSettings,
    services: ServiceContainer,
}

impl ApiServer {
    pub fn new(config: ApiSettings, services: ServiceContainer) -> Self {
        Self { config, services }
    }

    /// Start the API server
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.socket_addr()?;
        let app = self.create_app();

        info!("Starting pointdesk API server");
        info!("   Listen: http://{}", addr);
        info!("   CORS: {:?}", self.config.allowed_origins);
        info!("   Request timeout: {}s", self.config.request_timeout_secs);
        log_endpoints();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped gracefully");
        Ok(())
    }

    /// Create the application with the middleware stack
    fn create_app(&self) -> axum::Router {
        let state = Arc::new(AppState {
            store: self.services.store.clone(),
            ledger: self.services.ledger.clone(),
            approvals: self.services.approvals.clone(),
            orders: self.services.orders.clone(),
            settlement: self.services.settlement.clone(),
            audit: self.services.audit.clone(),
            clock: self.services.clock.clone(),
            metrics: Arc::new(MetricsRegistry::new()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        create_router(state)
            // Request ID middleware (first for tracing)
            .layer(axum::middleware::from_fn(request_id_middleware))
            // CORS layer (before timeout to handle preflight)
            .layer(create_cors_layer(self.config.allowed_origins.clone()))
            // Timeout layer
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_secs,
            )))
            // Tracing layer (last for complete request tracing)
            .layer(TraceLayer::new_for_http())
    }

    /// Get socket address from config
    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }
}

fn log_endpoints() {
    info!("Available endpoints:");
    info!("   GET  /health                     - Health check");
    info!("   POST /orders                     - Create an order with holds");
    info!("   POST /ledger/entries             - Request a ledger entry");
    info!("   POST /ledger/entries/:id/approve - Approve a pending entry");
    info!("   POST /ledger/entries/:id/reject  - Reject a pending entry");
    info!("   POST /ledger/entries/:id/reverse - Reverse an approved entry");
    info!("   GET  /settlement/candidates      - Games awaiting settlement");
    info!("   POST /settlement/run             - Run settlement");
    info!("   PUT  /games                      - Upsert a game row");
    info!("   POST /games/:id/result           - Record a game result");
    info!("   POST /members                    - Onboard a member");
    info!("   GET  /members/:id                - Member balances");
    info!("   GET  /metrics                    - Prometheus metrics");
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
