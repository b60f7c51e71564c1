//! Performance Monitoring Middleware
//!
//! Request timing and per-endpoint counters

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Requests slower than this are logged at warn level
const SLOW_REQUEST_MS: f64 = 10_000.0;

/// Server metrics
#[derive(Debug, Default, Clone)]
pub struct ServerMetrics {
    /// Total requests
    pub total_requests: u64,
    /// Successful requests
    pub successful_requests: u64,
    /// Failed requests
    pub failed_requests: u64,
    /// Total processing time (ms)
    pub total_processing_time_ms: f64,
    /// Requests by endpoint
    pub requests_by_endpoint: HashMap<String, u64>,
}

impl ServerMetrics {
    /// Record a request
    pub fn record_request(&mut self, endpoint: &str, status: StatusCode, duration_ms: f64) {
        self.total_requests += 1;

        if status.is_success() {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        self.total_processing_time_ms += duration_ms;
        *self.requests_by_endpoint.entry(endpoint.to_string()).or_insert(0) += 1;
    }

    /// Get average processing time
    pub fn avg_processing_time(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.total_processing_time_ms / self.total_requests as f64
    }
}

/// Shared metrics handle
#[derive(Default)]
pub struct MetricsState {
    metrics: RwLock<ServerMetrics>,
    access_log: bool,
}

impl MetricsState {
    pub fn new(access_log: bool) -> Self {
        Self {
            metrics: RwLock::new(ServerMetrics::default()),
            access_log,
        }
    }

    /// Snapshot of the counters
    pub async fn get_metrics(&self) -> ServerMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn record_request(&self, endpoint: &str, status: StatusCode, duration_ms: f64) {
        let mut metrics = self.metrics.write().await;
        metrics.record_request(endpoint, status, duration_ms);
    }
}

/// Performance monitoring middleware
pub async fn performance_monitor(
    State(metrics): State<Arc<MetricsState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status();

    metrics.record_request(&path, status, duration_ms).await;

    if duration_ms > SLOW_REQUEST_MS {
        warn!(
            "Slow request: {} {} took {:.2}ms (status: {})",
            method, path, duration_ms, status
        );
    } else if metrics.access_log {
        info!(
            "Request: {} {} took {:.2}ms (status: {})",
            method, path, duration_ms, status
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request() {
        let mut metrics = ServerMetrics::default();
        metrics.record_request("/health", StatusCode::OK, 2.0);
        metrics.record_request("/synthesize", StatusCode::BAD_REQUEST, 4.0);
        metrics.record_request("/synthesize", StatusCode::OK, 6.0);

        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.successful_requests, 2);
        assert_eq!(metrics.failed_requests, 1);
        assert_eq!(metrics.requests_by_endpoint["/synthesize"], 2);
        assert!((metrics.avg_processing_time() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_average() {
        assert_eq!(ServerMetrics::default().avg_processing_time(), 0.0);
    }
}
