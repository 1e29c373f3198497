//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, new hub per request)
//! 2. `TraceLayer` (request tracing)
//! 3. Security headers
//! 4. Rate limiting (per client IP and route class)
//! 5. Session layer (customer or admin cookie, per sub-router)
//! 6. CSRF validation (needs the session)

pub mod auth;
pub mod csrf;
pub mod rate_limit;
pub mod security_headers;
pub mod session;

pub use auth::{
    OptionalCustomer, RequireAdmin, RequireCustomer, end_session, set_current_admin,
    set_current_customer,
};
pub use csrf::{CSRF_HEADER, csrf_middleware, csrf_token, rotate_csrf_token};
pub use rate_limit::rate_limit_middleware;
pub use security_headers::security_headers_middleware;
pub use session::{SessionBackend, admin_session_layer, customer_session_layer};
