//! Rate limiting middleware.
//!
//! Classifies each request by its matched route into a [`RouteClass`],
//! keys it on the real client IP and counts it through the shared
//! [`RateLimiter`](crate::services::RateLimiter). Rejected requests get 429
//! with `Retry-After`; counted requests carry `X-RateLimit-Remaining`.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::error::AppError;
use crate::services::RouteClass;
use crate::state::AppState;

/// Header advertising how many requests are left in the window.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

// =============================================================================
// Client identity behind Cloudflare + Fly.io
// =============================================================================

/// Real client IP from proxy headers.
///
/// Checks Cloudflare's `CF-Connecting-IP` first, then the standard proxy
/// headers, then Fly.io's `Fly-Client-IP`.
fn ip_from_headers(headers: &HeaderMap) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header("cf-connecting-ip")
        .and_then(|s| s.trim().parse().ok())
        // First IP in the chain
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse().ok())
        })
        .or_else(|| header("x-real-ip").and_then(|s| s.trim().parse().ok()))
        .or_else(|| header("fly-client-ip").and_then(|s| s.trim().parse().ok()))
}

/// Rate-limit key for the client that sent `request`.
fn client_key(request: &Request) -> String {
    ip_from_headers(request.headers())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
        .map_or_else(|| "unknown".to_owned(), |ip| ip.to_string())
}

// =============================================================================
// Route classification
// =============================================================================

/// Which limit applies, or `None` for unlimited routes.
///
/// `path` is the route template (e.g. `/admin/api/orders/{id}`), not the
/// concrete URI.
#[must_use]
pub fn classify(method: &Method, path: &str) -> Option<RouteClass> {
    let mutating = matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );

    match path {
        // Provider retries must never be throttled; signatures gate this route.
        "/api/webhooks/payments" => None,
        "/api/auth/login" | "/api/auth/signup" | "/admin/api/login" => Some(RouteClass::Login),
        "/api/checkout" | "/api/custom-orders/{friendly_id}/checkout" => Some(RouteClass::Checkout),
        "/api/custom-orders" if mutating => Some(RouteClass::CustomOrderSubmission),
        p if p.starts_with("/admin/api/") && mutating => Some(RouteClass::AdminMutation),
        p if p.starts_with("/api/") || p.starts_with("/admin/api/") => Some(RouteClass::Default),
        _ if mutating => Some(RouteClass::Default),
        _ => None,
    }
}

/// Count the request and reject it once the client's window is full.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let class = request
        .extensions()
        .get::<MatchedPath>()
        .and_then(|path| classify(request.method(), path.as_str()));
    let Some(class) = class else {
        return next.run(request).await;
    };

    let client = client_key(&request);
    let decision = state.rate_limiter().check(&client, class).await;

    if !decision.allowed {
        let retry_after = decision.retry_after_secs(Utc::now());
        tracing::warn!(
            client = %client,
            class = %class,
            retry_after,
            "Rate limit exceeded"
        );
        return AppError::RateLimited { retry_after }.into_response();
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_routes() {
        assert_eq!(classify(&Method::POST, "/api/auth/login"), Some(RouteClass::Login));
        assert_eq!(classify(&Method::POST, "/admin/api/login"), Some(RouteClass::Login));
        assert_eq!(classify(&Method::POST, "/api/checkout"), Some(RouteClass::Checkout));
        assert_eq!(
            classify(&Method::POST, "/api/custom-orders/{friendly_id}/checkout"),
            Some(RouteClass::Checkout)
        );
        assert_eq!(
            classify(&Method::POST, "/api/custom-orders"),
            Some(RouteClass::CustomOrderSubmission)
        );
        assert_eq!(
            classify(&Method::PATCH, "/admin/api/orders/{id}"),
            Some(RouteClass::AdminMutation)
        );
        assert_eq!(
            classify(&Method::GET, "/admin/api/orders"),
            Some(RouteClass::Default)
        );
        assert_eq!(
            classify(&Method::GET, "/api/custom-orders/{friendly_id}"),
            Some(RouteClass::Default)
        );
        assert_eq!(classify(&Method::POST, "/api/webhooks/payments"), None);
        assert_eq!(classify(&Method::GET, "/health"), None);
    }

    #[test]
    fn test_client_ip_header_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.3"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(ip_from_headers(&headers), "203.0.113.7".parse().ok());

        headers.insert("cf-connecting-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(ip_from_headers(&headers), "198.51.100.2".parse().ok());

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        headers.insert("fly-client-ip", HeaderValue::from_static("2001:db8::1"));
        assert_eq!(ip_from_headers(&headers), "2001:db8::1".parse().ok());
    }
}
