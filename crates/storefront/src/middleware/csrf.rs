//! CSRF protection for state-changing requests.
//!
//! Every `POST`, `PUT`, `PATCH` and `DELETE` must carry an `x-csrf-token`
//! header equal to the token bound to the caller's session. Missing session,
//! missing token and mismatched token are all rejected with 403.
//!
//! A handful of endpoints are reached without a session (the payment
//! webhook, login, signup). They are exempt by exact path, so a sibling
//! route such as `/api/auth/logout` is still checked.

use axum::{
    extract::Request,
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::session_keys;
use crate::payments::signature::constant_time_compare;

/// Header carrying the token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Endpoints that are never CSRF checked. Matched exactly.
pub const CSRF_EXEMPT_PATHS: &[&str] = &[
    "/api/webhooks/payments",
    "/api/auth/login",
    "/api/auth/signup",
    "/admin/api/login",
];

/// Random bytes per token.
const TOKEN_BYTES: usize = 32;

fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn is_exempt(path: &str) -> bool {
    CSRF_EXEMPT_PATHS.contains(&path)
}

/// Reject state-changing requests without the session's CSRF token.
///
/// Must run inside a session layer.
pub async fn csrf_middleware(request: Request, next: Next) -> Response {
    if !is_state_changing(request.method()) || is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let expected = match request.extensions().get::<Session>() {
        Some(session) => match session.get::<String>(session_keys::CSRF_TOKEN).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load session for CSRF check");
                None
            }
        },
        None => None,
    };

    match (presented, expected) {
        (Some(presented), Some(expected)) if constant_time_compare(&presented, &expected) => {
            next.run(request).await
        }
        (presented, expected) => {
            tracing::warn!(
                path = %request.uri().path(),
                method = %request.method(),
                token_present = presented.is_some(),
                session_token = expected.is_some(),
                "CSRF validation failed"
            );
            AppError::Forbidden("invalid CSRF token".to_owned()).into_response()
        }
    }
}

fn mint_token() -> String {
    let mut bytes = [0_u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The session's CSRF token, minting one if it has none.
///
/// # Errors
///
/// Returns an error if the session cannot be read or written.
pub async fn csrf_token(session: &Session) -> Result<String, tower_sessions::session::Error> {
    if let Some(token) = session.get::<String>(session_keys::CSRF_TOKEN).await? {
        return Ok(token);
    }
    rotate_csrf_token(session).await
}

/// Replace the session's CSRF token. Called on login.
///
/// # Errors
///
/// Returns an error if the session cannot be written.
pub async fn rotate_csrf_token(session: &Session) -> Result<String, tower_sessions::session::Error> {
    let token = mint_token();
    session.insert(session_keys::CSRF_TOKEN, &token).await?;
    Ok(token)
}
