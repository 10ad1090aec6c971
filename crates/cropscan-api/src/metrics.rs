//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "cropscan_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "cropscan_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "cropscan_http_requests_in_flight";

    // Inference metrics
    pub const PREDICTIONS_TOTAL: &str = "cropscan_predictions_total";
    pub const PREDICTION_FAILURES_TOTAL: &str = "cropscan_prediction_failures_total";
    pub const INFERENCE_DURATION_SECONDS: &str = "cropscan_inference_duration_seconds";
    pub const MODELS_LOADED: &str = "cropscan_models_loaded";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "cropscan_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a successful prediction.
pub fn record_prediction(model: &str, class_name: &str, duration_secs: f64) {
    let labels = [("model", model.to_string()), ("class", class_name.to_string())];
    counter!(names::PREDICTIONS_TOTAL, &labels).increment(1);
    histogram!(names::INFERENCE_DURATION_SECONDS, "model" => model.to_string())
        .record(duration_secs);
}

/// Record a failed prediction.
pub fn record_prediction_failure(model: &str, kind: &str) {
    let labels = [("model", model.to_string()), ("kind", kind.to_string())];
    counter!(names::PREDICTION_FAILURES_TOTAL, &labels).increment(1);
}

/// Update loaded models gauge.
pub fn set_models_loaded(count: usize) {
    gauge!(names::MODELS_LOADED).set(count as f64);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Route template used as the `path` label, so model ids do not explode cardinality.
fn route_label(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string())
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = route_label(&request);
    let start = Instant::now();

    // Increment in-flight counter
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    // Decrement in-flight counter
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_label_without_match() {
        let request = Request::builder().uri("/predict/leaf").body(Body::empty()).unwrap();
        assert_eq!(route_label(&request), "unmatched");
    }
}
