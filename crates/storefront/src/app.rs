//! Router assembly.
//!
//! The customer and admin routes are separate sub-routers, each with its
//! own session layer (and cookie), so the two scopes never share a
//! session. Both are CSRF checked inside their session layer; rate
//! limiting, security headers, tracing and Sentry wrap everything.

use std::time::Duration;

use axum::{
    Router,
    http::{Request, Response},
    middleware::{from_fn, from_fn_with_state},
};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::{
    SessionBackend, admin_session_layer, csrf_middleware, customer_session_layer,
    rate_limit_middleware, security_headers_middleware,
};
use crate::routes;
use crate::state::AppState;

/// Build the full application router.
pub fn build_router(state: AppState, sessions: &SessionBackend) -> Router {
    let public = routes::public_routes()
        .layer(from_fn(csrf_middleware))
        .layer(customer_session_layer(sessions.clone(), state.config()));

    let admin = routes::admin_routes()
        .layer(from_fn(csrf_middleware))
        .layer(admin_session_layer(sessions.clone(), state.config()));

    Router::new()
        .merge(public)
        .merge(admin)
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(|response: &Response<_>, latency: Duration, span: &Span| {
                    span.record("status", response.status().as_u16());
                    span.record(
                        "latency_ms",
                        u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    );
                    DefaultOnResponse::default().on_response(response, latency, span);
                }),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
