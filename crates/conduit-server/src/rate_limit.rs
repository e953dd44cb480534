use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use conduit_ratelimit::{LimitScope, RateLimitError, RequestLimiter};
use conduit_telemetry::Metrics;
use http::StatusCode;

/// Limiter and the sink that counts rejections
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RequestLimiter>,
    pub metrics: Metrics,
}

/// Reject requests over the global or per-IP quota
pub async fn rate_limit_middleware(state: RateLimitState, request: Request, next: Next) -> Response {
    let ip = client_ip(&request);

    if let Err((scope, error)) = state.limiter.check(ip.as_deref()) {
        state.metrics.record_rate_limited(scope.as_str());
        tracing::debug!(scope = scope.as_str(), ip = ?ip, "request rate limited");
        return rate_limit_response(scope, &error);
    }

    next.run(request).await
}

fn client_ip(request: &Request) -> Option<String> {
    if let Some(forwarded) = request.headers().get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(first) = val.split(',').next()
    {
        return Some(first.trim().to_owned());
    }

    if let Some(real_ip) = request.headers().get("x-real-ip")
        && let Ok(val) = real_ip.to_str()
    {
        return Some(val.trim().to_owned());
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn rate_limit_response(scope: LimitScope, error: &RateLimitError) -> Response {
    match error {
        RateLimitError::Exceeded { retry_after } => {
            let body = serde_json::json!({
                "error": {
                    "type": "rate_limited",
                    "message": format!("rate limit exceeded, retry after {retry_after}s"),
                    "scope": scope.as_str(),
                }
            });

            let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
            if let Ok(val) = retry_after.to_string().parse() {
                response.headers_mut().insert(http::header::RETRY_AFTER, val);
            }
            response
        }
        RateLimitError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "rate limiter error").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use conduit_config::{RateLimitConfig, RequestRateLimit};
    use tower::ServiceExt;

    use super::*;

    fn app(per_ip: u32) -> Router {
        let state = RateLimitState {
            limiter: Arc::new(
                RequestLimiter::new(&RateLimitConfig {
                    global: None,
                    per_ip: Some(RequestRateLimit {
                        requests: per_ip,
                        window: "1m".to_owned(),
                    }),
                })
                .unwrap(),
            ),
            metrics: Metrics::default(),
        };

        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(move |req, next| {
                rate_limit_middleware(state.clone(), req, next)
            }))
    }

    fn from(ip: &str) -> Request {
        http::Request::builder()
            .uri("/")
            .header("x-forwarded-for", format!("{ip}, 10.0.0.1"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn over_quota_gets_retry_after() {
        let app = app(1);

        let first = app.clone().oneshot(from("203.0.113.7")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.clone().oneshot(from("203.0.113.7")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(http::header::RETRY_AFTER));

        let other = app.oneshot(from("198.51.100.1")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[test]
    fn real_ip_header_is_used_without_forwarded_for() {
        let request = http::Request::builder()
            .header("x-real-ip", " 192.0.2.4 ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request).as_deref(), Some("192.0.2.4"));
    }
}
