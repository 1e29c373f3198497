//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                                   - Liveness
//! GET    /health/ready                             - Store readiness
//!
//! # Customer scope (cookie `atelier_session`)
//! GET    /api/session/csrf                         - CSRF token for this session
//! POST   /api/auth/signup                          - Create account and sign in
//! POST   /api/auth/login                           - Sign in
//! POST   /api/auth/logout                          - Sign out
//! GET    /api/account/orders                       - Signed-in customer's orders
//! POST   /api/checkout                             - Cart checkout
//! POST   /api/custom-orders                        - Submit a commission
//! GET    /api/custom-orders/{friendly_id}?email=   - Commission status
//! POST   /api/custom-orders/{friendly_id}/checkout - Pay a quoted commission
//! POST   /api/webhooks/payments                    - Provider events (signed)
//! GET    /checkout/success                         - Provider success redirect
//! GET    /checkout/cancel                          - Provider cancel redirect
//!
//! # Admin scope (cookie `atelier_admin_session`)
//! POST   /admin/api/login                          - Sign in, returns CSRF token
//! POST   /admin/api/logout                         - Sign out
//! GET    /admin/api/orders                         - List orders
//! GET    /admin/api/orders/{id}                    - Order detail
//! PATCH  /admin/api/orders/{id}                    - Status, tracking, notes
//! DELETE /admin/api/orders/{id}                    - Delete order
//! GET    /admin/api/custom-orders                  - List custom orders
//! PATCH  /admin/api/custom-orders/{id}/quote       - Set price
//! GET    /admin/api/products/{id}/stock            - Stock level
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod checkout;
pub mod custom_orders;
pub mod health;
pub mod session;
pub mod webhooks;

use axum::{
    Router,
    extract::{FromRequest, FromRequestParts, Path, Query},
    routing::{get, patch, post},
};

use crate::error::AppError;
use crate::state::AppState;

/// JSON body whose rejections use the `{"error": ...}` shape.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query string whose rejections use the `{"error": ...}` shape.
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Path parameters; an unparseable id is a 404.
#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Create the customer auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
}

/// Create all routes served under the customer session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/api/session/csrf", get(session::csrf))
        .nest("/api/auth", auth_routes())
        .route("/api/account/orders", get(account::orders))
        .route("/api/checkout", post(checkout::create))
        .route("/api/custom-orders", post(custom_orders::submit))
        .route("/api/custom-orders/{friendly_id}", get(custom_orders::show))
        .route(
            "/api/custom-orders/{friendly_id}/checkout",
            post(custom_orders::checkout),
        )
        .route("/api/webhooks/payments", post(webhooks::payments))
        .route("/checkout/success", get(checkout::success))
        .route("/checkout/cancel", get(checkout::cancel))
}

/// Create all routes served under the admin session.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/api/login", post(admin::auth::login))
        .route("/admin/api/logout", post(admin::auth::logout))
        .route("/admin/api/orders", get(admin::orders::index))
        .route(
            "/admin/api/orders/{id}",
            get(admin::orders::show)
                .patch(admin::orders::update)
                .delete(admin::orders::destroy),
        )
        .route("/admin/api/custom-orders", get(admin::custom_orders::index))
        .route(
            "/admin/api/custom-orders/{id}/quote",
            patch(admin::custom_orders::quote),
        )
        .route("/admin/api/products/{id}/stock", get(admin::products::stock))
}
