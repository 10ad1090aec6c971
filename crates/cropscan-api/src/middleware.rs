//! API middleware.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, MatchedPath, State};
use axum::http::{HeaderValue, Request, Response};
use axum::middleware::Next;
use axum::response::IntoResponse;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn, Span};
use uuid::Uuid;

use crate::error::{redacted_response, ApiError, InternalErrorDetail};
use crate::metrics;

/// Per-client limiter using governor.
pub type IpRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Upper bound on tracked clients.
const MAX_RATE_LIMITER_ENTRIES: usize = 10_000;

/// Idle time after which a client's limiter is dropped.
const LIMITER_IDLE_TTL: Duration = Duration::from_secs(3600);

/// Paths excluded from request logging.
const QUIET_PATHS: [&str; 3] = ["/health", "/healthz", "/ready"];

struct TrackedLimiter {
    limiter: Arc<IpRateLimiter>,
    last_seen: Instant,
}

/// Per-IP limiters for the predict routes.
#[derive(Clone)]
pub struct RateLimiterCache {
    limiters: Arc<Mutex<HashMap<IpAddr, TrackedLimiter>>>,
    quota: Quota,
    trust_proxy_headers: bool,
}

impl RateLimiterCache {
    /// Allow `requests_per_second` per client. Zero is clamped to one.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            limiters: Arc::new(Mutex::new(HashMap::new())),
            quota: Quota::per_second(rps),
            trust_proxy_headers: false,
        }
    }

    /// Key clients by `X-Forwarded-For`/`X-Real-IP` instead of the peer address.
    pub fn with_trusted_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    /// Take one token from the client's bucket.
    pub async fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut limiters = self.limiters.lock().await;

        if !limiters.contains_key(&ip) && limiters.len() >= MAX_RATE_LIMITER_ENTRIES {
            evict_idle(&mut limiters, now);
        }

        let tracked = limiters.entry(ip).or_insert_with(|| TrackedLimiter {
            limiter: Arc::new(RateLimiter::direct(self.quota)),
            last_seen: now,
        });
        tracked.last_seen = now;
        tracked.limiter.check().is_ok()
    }

    /// Client address used as the limiter key.
    fn client_ip(&self, request: &Request<Body>) -> Option<IpAddr> {
        if self.trust_proxy_headers {
            if let Some(ip) = forwarded_ip(request) {
                return Some(ip);
            }
        }
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip())
    }
}

/// Drop idle limiters, then the least recently seen ones if still full.
fn evict_idle(limiters: &mut HashMap<IpAddr, TrackedLimiter>, now: Instant) {
    limiters.retain(|_, t| now.duration_since(t.last_seen) < LIMITER_IDLE_TTL);

    if limiters.len() >= MAX_RATE_LIMITER_ENTRIES {
        let mut by_age: Vec<(IpAddr, Instant)> =
            limiters.iter().map(|(ip, t)| (*ip, t.last_seen)).collect();
        by_age.sort_by_key(|(_, seen)| *seen);

        let excess = limiters.len() + 1 - MAX_RATE_LIMITER_ENTRIES;
        for (ip, _) in by_age.into_iter().take(excess) {
            limiters.remove(&ip);
        }
        warn!("Rate limiter cache full, evicted {} clients", excess);
    }
}

/// Create CORS layer.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    use axum::http::{header, Method};

    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_origin(Any)
            .max_age(Duration::from_secs(600))
    } else {
        // tower-http panics when credentials are combined with wildcard headers
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
            .allow_credentials(true)
            .allow_origin(origins)
            .max_age(Duration::from_secs(600))
    }
}

/// Security headers middleware.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Cross-Origin-Resource-Policy",
        HeaderValue::from_static("same-origin"),
    );

    response
}

/// Request ID middleware.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = request
        .headers()
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(request_id.clone());
    Span::current().record("request_id", &request_id);

    let mut response = next.run(request).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-ID", header_value);
    }

    response
}

/// Request logging middleware.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    if !QUIET_PATHS.contains(&uri.path()) {
        info!(
            method = %method,
            uri = %uri,
            status = %response.status(),
            duration_ms = %start.elapsed().as_millis(),
            "Request completed"
        );
    }

    response
}

/// Replace internal error details with a generic message in production.
pub async fn redact_internal_errors(
    State(production): State<bool>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let response = next.run(request).await;
    if production && response.extensions().get::<InternalErrorDetail>().is_some() {
        return redacted_response();
    }
    response
}

/// Per-IP rate limiting middleware.
pub async fn rate_limit_middleware(
    State(rate_limiter): State<Arc<RateLimiterCache>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if let Some(ip) = rate_limiter.client_ip(&request) {
        if !rate_limiter.check(ip).await {
            let endpoint = request
                .extensions()
                .get::<MatchedPath>()
                .map(|p| p.as_str().to_string())
                .unwrap_or_else(|| request.uri().path().to_string());
            warn!(ip = %ip, endpoint = %endpoint, "Rate limit exceeded");
            metrics::record_rate_limit_hit(&endpoint);
            return ([("Retry-After", "1")], ApiError::RateLimited).into_response();
        }
    }

    next.run(request).await
}

/// Client address as reported by a reverse proxy.
fn forwarded_ip(request: &Request<Body>) -> Option<IpAddr> {
    // First hop of X-Forwarded-For is the client
    let forwarded = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse().ok());

    forwarded.or_else(|| {
        request
            .headers()
            .get("X-Real-IP")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_from(peer: &str, forwarded_for: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder();
        if let Some(value) = forwarded_for {
            builder = builder.header("X-Forwarded-For", value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[tokio::test]
    async fn test_rate_limiter_blocks_after_quota() {
        let cache = RateLimiterCache::new(2);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(cache.check(ip).await);
        assert!(cache.check(ip).await);
        assert!(!cache.check(ip).await);

        // Other clients have their own bucket
        let other: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(cache.check(other).await);
    }

    #[test]
    fn test_proxy_headers_ignored_unless_trusted() {
        let cache = RateLimiterCache::new(1);
        let request = request_from("192.0.2.10:5000", Some("203.0.113.7"));
        assert_eq!(cache.client_ip(&request), Some("192.0.2.10".parse().unwrap()));

        let cache = cache.with_trusted_proxy_headers(true);
        assert_eq!(cache.client_ip(&request), Some("203.0.113.7".parse().unwrap()));

        // Unparseable header falls back to the peer
        let request = request_from("192.0.2.10:5000", Some("not-an-ip"));
        assert_eq!(cache.client_ip(&request), Some("192.0.2.10".parse().unwrap()));
    }

    #[test]
    fn test_forwarded_ip_prefers_forwarded_for() {
        let request = Request::builder()
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .header("X-Real-IP", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(forwarded_ip(&request), Some("203.0.113.7".parse().unwrap()));

        let request = Request::builder()
            .header("X-Real-IP", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(forwarded_ip(&request), Some("198.51.100.2".parse().unwrap()));

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(forwarded_ip(&request), None);
    }

    #[test]
    fn test_evict_idle_bounds_cache() {
        let now = Instant::now();
        let mut limiters = HashMap::new();
        for i in 0..MAX_RATE_LIMITER_ENTRIES as u32 {
            limiters.insert(
                IpAddr::from(i.to_be_bytes()),
                TrackedLimiter {
                    limiter: Arc::new(RateLimiter::direct(Quota::per_second(NonZeroU32::MIN))),
                    last_seen: now,
                },
            );
        }
        evict_idle(&mut limiters, now);
        assert_eq!(limiters.len(), MAX_RATE_LIMITER_ENTRIES - 1);
    }
}
