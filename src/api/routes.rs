//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::{handlers::*, monitoring::metrics_handler};
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check (high priority)
        .route("/health", get(health_handler))

        // Order/ticket workflow
        .route("/orders", post(create_order_handler))

        // Ledger accounting and the approval gateway
        .route("/ledger/entries", post(create_entry_handler))
        .route("/ledger/entries/:id/approve", post(approve_entry_handler))
        .route("/ledger/entries/:id/reject", post(reject_entry_handler))
        .route("/ledger/entries/:id/reverse", post(reverse_entry_handler))

        // Settlement engine
        .route("/settlement/candidates", get(settlement_candidates_handler))
        .route("/settlement/run", post(run_settlement_handler))

        // Game data source interface
        .route("/games", put(upsert_game_handler))
        .route("/games/:id/result", post(game_result_handler))

        // Members
        .route("/members", post(create_member_handler))
        .route("/members/:id", get(get_member_handler))

        // Metrics endpoint for Prometheus
        .route("/metrics", get(metrics_handler))

        // Attach shared state
        .with_state(state)
}
