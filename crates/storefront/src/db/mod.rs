//! Storage for the storefront.
//!
//! Every store is a trait with a `PostgreSQL` implementation and an
//! in-process implementation in [`memory`]. Handlers and services only see
//! the traits, bundled in [`Stores`].
//!
//! ## Tables
//!
//! - `orders` - Standard orders with contact, line item and total snapshots
//! - `custom_orders` - Commission requests, quotes and payment state
//! - `products` / `stock_movements` - Stock levels and the applied decrements
//! - `processed_webhook_events` - Provider event ids already handled
//! - `rate_limit_windows` - Fixed-window request counters
//! - `notification_outbox` - Pending side effects
//! - `customers` / `admin_users` - Accounts
//! - `tower_sessions.session` - Session storage (created by the session store)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p atelier-cli -- migrate
//! ```
//!
//! Conditional updates carry the consistency rules: payment is only marked
//! once, admin patches compare-and-set against the statuses they were
//! validated against, and each stock decrement is recorded so it applies at
//! most once.

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub mod accounts;
pub mod custom_orders;
pub mod memory;
pub mod orders;
pub mod outbox;
pub mod rate_limits;
pub mod stock;
pub mod webhook_events;

pub use accounts::{AccountRepository, Credentials, PgAccountRepository};
pub use custom_orders::{CustomOrderRepository, PgCustomOrderRepository};
pub use orders::{OrderRepository, PgOrderRepository};
pub use outbox::{OutboxStore, PgOutboxStore};
pub use rate_limits::{PgRateLimitStore, RateLimitStore, WindowState};
pub use stock::{DecrementOutcome, PgStockLedger, StockDecrement, StockLedger};
pub use webhook_events::{PgWebhookEventStore, WebhookEventStore};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
    pub(crate) fn from_insert(e: sqlx::Error, what: &str) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(format!("{what} already exists"))
            }
            _ => Self::Database(e),
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// All stores the service uses.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderRepository>,
    pub custom_orders: Arc<dyn CustomOrderRepository>,
    pub stock: Arc<dyn StockLedger>,
    pub webhook_events: Arc<dyn WebhookEventStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub outbox: Arc<dyn OutboxStore>,
    pub accounts: Arc<dyn AccountRepository>,
    /// Set when backed by `PostgreSQL`; used for readiness and sessions.
    pub pool: Option<PgPool>,
}

impl Stores {
    /// Stores backed by `PostgreSQL`.
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            orders: Arc::new(PgOrderRepository::new(pool.clone())),
            custom_orders: Arc::new(PgCustomOrderRepository::new(pool.clone())),
            stock: Arc::new(PgStockLedger::new(pool.clone())),
            webhook_events: Arc::new(PgWebhookEventStore::new(pool.clone())),
            rate_limits: Arc::new(PgRateLimitStore::new(pool.clone())),
            outbox: Arc::new(PgOutboxStore::new(pool.clone())),
            accounts: Arc::new(PgAccountRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// In-process stores for a single instance, development and tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            orders: Arc::new(memory::MemoryOrderRepository::default()),
            custom_orders: Arc::new(memory::MemoryCustomOrderRepository::default()),
            stock: Arc::new(memory::MemoryStockLedger::default()),
            webhook_events: Arc::new(memory::MemoryWebhookEventStore::default()),
            rate_limits: Arc::new(memory::MemoryRateLimitStore::new()),
            outbox: Arc::new(memory::MemoryOutboxStore::default()),
            accounts: Arc::new(memory::MemoryAccountRepository::default()),
            pool: None,
        }
    }

    /// Check the backing database answers.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn ping(&self) -> Result<(), RepositoryError> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}
