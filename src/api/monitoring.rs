//! Monitoring & Metrics
//!
//! Operation counters with Prometheus metrics export.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Prometheus-compatible metrics registry
#[derive(Default)]
pub struct MetricsRegistry {
    /// HTTP request metrics
    pub http_requests_total: AtomicU64,

    /// Order workflow metrics
    pub orders_created_total: AtomicU64,
    pub orders_rejected_total: AtomicU64,

    /// Ledger metrics
    pub entries_requested_total: AtomicU64,
    pub entries_approved_total: AtomicU64,
    pub entries_rejected_total: AtomicU64,
    pub entries_reversed_total: AtomicU64,

    /// Settlement metrics
    pub settlement_runs_total: AtomicU64,
    pub games_settled_total: AtomicU64,
    pub payout_points_total: AtomicU64,

    /// Error metrics
    pub errors_total: AtomicU64,
}

impl MetricsRegistry {
    /// Create new metrics registry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.http_requests_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_settlement_run(&self, games_settled: usize, payout: i64) {
        self.settlement_runs_total.fetch_add(1, Ordering::SeqCst);
        self.games_settled_total
            .fetch_add(games_settled as u64, Ordering::SeqCst);
        self.payout_points_total
            .fetch_add(payout.max(0) as u64, Ordering::SeqCst);
    }

    /// Generate Prometheus metrics format
    pub fn to_prometheus_format(&self) -> String {
        let counters: [(&str, &str, u64); 10] = [
            (
                "pointdesk_http_requests_total",
                "Total number of HTTP requests",
                self.http_requests_total.load(Ordering::SeqCst),
            ),
            (
                "pointdesk_orders_created_total",
                "Orders created successfully",
                self.orders_created_total.load(Ordering::SeqCst),
            ),
            (
                "pointdesk_orders_rejected_total",
                "Order creations that failed and were compensated",
                self.orders_rejected_total.load(Ordering::SeqCst),
            ),
            (
                "pointdesk_entries_requested_total",
                "Ledger entries requested",
                self.entries_requested_total.load(Ordering::SeqCst),
            ),
            (
                "pointdesk_entries_approved_total",
                "Ledger entries approved",
                self.entries_approved_total.load(Ordering::SeqCst),
            ),
            (
                "pointdesk_entries_rejected_total",
                "Ledger entries rejected",
                self.entries_rejected_total.load(Ordering::SeqCst),
            ),
            (
                "pointdesk_entries_reversed_total",
                "Approved ledger entries reversed",
                self.entries_reversed_total.load(Ordering::SeqCst),
            ),
            (
                "pointdesk_settlement_runs_total",
                "Settlement runs executed",
                self.settlement_runs_total.load(Ordering::SeqCst),
            ),
            (
                "pointdesk_games_settled_total",
                "Games settled",
                self.games_settled_total.load(Ordering::SeqCst),
            ),
            (
                "pointdesk_payout_points_total",
                "Points paid out to winning wagers",
                self.payout_points_total.load(Ordering::SeqCst),
            ),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n\n"
            ));
        }
        output.push_str(&format!(
            "# HELP pointdesk_errors_total Total number of request errors\n\
             # TYPE pointdesk_errors_total counter\n\
             pointdesk_errors_total {}\n",
            self.errors_total.load(Ordering::SeqCst)
        ));
        output
    }
}

/// Axum handler for Prometheus metrics endpoint
pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<Arc<super::handlers::AppState>>,
) -> axum::response::Response<String> {
    let metrics = state.metrics.to_prometheus_format();

    axum::response::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
        .body(metrics)
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_format() {
        let registry = MetricsRegistry::new();
        registry.record_request();
        registry.record_request();
        registry.record_settlement_run(3, 1500);

        let output = registry.to_prometheus_format();
        assert!(output.contains("pointdesk_http_requests_total 2"));
        assert!(output.contains("pointdesk_games_settled_total 3"));
        assert!(output.contains("pointdesk_payout_points_total 1500"));
        assert!(output.contains("# TYPE pointdesk_settlement_runs_total counter"));
    }
}
