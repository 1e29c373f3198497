//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Customer and admin password authentication
//! - `checkout` - Hosted checkout sessions for carts and custom orders
//! - `custom_orders` - Commission submission, lookup and quoting
//! - `notifications` - Notification outbox and delivery worker
//! - `orders` - Admin order management
//! - `rate_limit` - Per-client request limiting
//! - `webhook` - Payment webhook reconciliation

pub mod auth;
pub mod checkout;
pub mod custom_orders;
pub mod notifications;
pub mod orders;
pub mod rate_limit;
pub mod webhook;

pub use auth::{AuthError, AuthService};
pub use checkout::{CartCheckout, CheckoutError, CheckoutOrchestrator, CheckoutRedirect};
pub use custom_orders::{CustomOrderError, CustomOrderRequest, CustomOrderService};
pub use notifications::{
    EmailNotifier, LogNotifier, NotificationWorker, Notifier, NotifyError, Outbox,
};
pub use orders::{OrderError, OrderService};
pub use rate_limit::{RateDecision, RateLimiter, RatePolicies, RatePolicy, RouteClass};
pub use webhook::{WebhookError, WebhookOutcome, WebhookReconciler};
