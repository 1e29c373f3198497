//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`; the body is always `{"error": "<message>"}`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::payments::{PaymentError, SignatureError};
use crate::services::{
    AuthError, CheckoutError, CustomOrderError, OrderError, WebhookError,
};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// Webhook signature did not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    /// No valid session for this scope.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (CSRF failures land here).
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// The resource is not in a state that allows this.
    #[error("{0}")]
    Precondition(String),

    /// Lost a race with a concurrent modification, or a duplicate.
    #[error("{0}")]
    Conflict(String),

    /// Rate limited.
    #[error("too many requests, retry in {retry_after}s")]
    RateLimited { retry_after: u64 },

    /// Payment provider call failed.
    #[error("payment provider error: {0}")]
    Payment(#[from] PaymentError),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] RepositoryError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Precondition(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn is_server_error(&self) -> bool {
        matches!(self, Self::Payment(_) | Self::Database(_) | Self::Internal(_))
    }

    /// Message shown to the client.
    ///
    /// Details of server errors are only shown in debug builds.
    fn public_message(&self) -> String {
        if cfg!(debug_assertions) || !self.is_server_error() {
            return self.to_string();
        }
        match self {
            Self::Payment(_) => "Payment provider unavailable, please try again".to_owned(),
            _ => "Internal server error".to_owned(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();
        let body = Json(json!({ "error": self.public_message() }));
        let mut response = (status, body).into_response();

        if let Self::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }

        response
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Validation(msg) => Self::Validation(msg),
            CheckoutError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            CheckoutError::Precondition(msg) => Self::Precondition(msg),
            CheckoutError::Payment(e) => Self::Payment(e),
            CheckoutError::Repository(e) => Self::Database(e),
            CheckoutError::Intent(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound => Self::NotFound("order not found".to_owned()),
            OrderError::Validation(msg) => Self::Validation(msg),
            OrderError::Transition(e) => Self::Precondition(e.to_string()),
            OrderError::Conflict => {
                Self::Conflict("order was modified concurrently, reload and retry".to_owned())
            }
            OrderError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<CustomOrderError> for AppError {
    fn from(err: CustomOrderError) -> Self {
        match err {
            CustomOrderError::NotFound => Self::NotFound("custom order not found".to_owned()),
            CustomOrderError::Validation(msg) => Self::Validation(msg),
            CustomOrderError::Precondition(msg) => Self::Precondition(msg),
            CustomOrderError::Conflict => Self::Conflict(
                "custom order was modified concurrently, reload and retry".to_owned(),
            ),
            CustomOrderError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidEmail(_) => Self::Validation("Invalid email address".to_owned()),
            AuthError::InvalidCredentials => Self::Unauthorized("Invalid credentials".to_owned()),
            AuthError::AlreadyExists => {
                Self::Conflict("An account with this email already exists".to_owned())
            }
            AuthError::WeakPassword(msg) => Self::Validation(msg),
            AuthError::InvalidName(msg) => Self::Validation(msg.to_owned()),
            AuthError::Repository(e) => Self::Database(e),
            AuthError::PasswordHash => Self::Internal("password hashing failed".to_owned()),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Signature(e) => Self::InvalidSignature(e),
            WebhookError::Payload(e) => Self::Validation(e.to_string()),
            WebhookError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Internal(format!("session error: {err}"))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(_: PathRejection) -> Self {
        Self::NotFound("not found".to_owned())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
