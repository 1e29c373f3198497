//! Session middleware configuration.
//!
//! Customers and admins get separate cookies with separate policies:
//!
//! | scope    | cookie                  | SameSite | expiry |
//! |----------|-------------------------|----------|--------|
//! | customer | `atelier_session`       | Lax      | 7 days |
//! | admin    | `atelier_admin_session` | Strict   | 24 h   |
//!
//! Both layers share one store. Records are keyed by random session ids,
//! so a customer cookie presented on an admin route simply is not there.

use async_trait::async_trait;
use sqlx::PgPool;
use tower_sessions::{
    Expiry, MemoryStore, SessionManagerLayer, SessionStore,
    cookie::{SameSite, time::Duration},
    session::{Id, Record},
    session_store,
};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::StorefrontConfig;

/// Customer session cookie name.
pub const CUSTOMER_COOKIE_NAME: &str = "atelier_session";

/// Admin session cookie name.
pub const ADMIN_COOKIE_NAME: &str = "atelier_admin_session";

/// Customer session expiry in seconds (7 days).
const CUSTOMER_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Admin session expiry in seconds (24 hours, stricter than customers).
const ADMIN_EXPIRY_SECONDS: i64 = 24 * 60 * 60;

/// Where session records live.
#[derive(Debug, Clone)]
pub enum SessionBackend {
    /// `PostgreSQL` table created by `atelier-cli migrate`.
    Postgres(PostgresStore),
    /// Process memory, for development and tests.
    Memory(MemoryStore),
}

impl SessionBackend {
    /// `PostgreSQL` when a pool is available, memory otherwise.
    #[must_use]
    pub fn new(pool: Option<&PgPool>) -> Self {
        pool.map_or_else(
            || Self::Memory(MemoryStore::default()),
            |pool| Self::Postgres(PostgresStore::new(pool.clone())),
        )
    }
}

#[async_trait]
impl SessionStore for SessionBackend {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        match self {
            Self::Postgres(store) => store.create(record).await,
            Self::Memory(store) => store.create(record).await,
        }
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        match self {
            Self::Postgres(store) => store.save(record).await,
            Self::Memory(store) => store.save(record).await,
        }
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        match self {
            Self::Postgres(store) => store.load(session_id).await,
            Self::Memory(store) => store.load(session_id).await,
        }
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        match self {
            Self::Postgres(store) => store.delete(session_id).await,
            Self::Memory(store) => store.delete(session_id).await,
        }
    }
}

/// Session layer for the public storefront routes.
#[must_use]
pub fn customer_session_layer(
    backend: SessionBackend,
    config: &StorefrontConfig,
) -> SessionManagerLayer<SessionBackend> {
    SessionManagerLayer::new(backend)
        .with_name(CUSTOMER_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(CUSTOMER_EXPIRY_SECONDS)))
        .with_secure(config.secure_cookies())
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// Session layer for the admin API.
#[must_use]
pub fn admin_session_layer(
    backend: SessionBackend,
    config: &StorefrontConfig,
) -> SessionManagerLayer<SessionBackend> {
    SessionManagerLayer::new(backend)
        .with_name(ADMIN_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(ADMIN_EXPIRY_SECONDS)))
        .with_secure(config.secure_cookies())
        // SameSite=Strict for admin (stricter than storefront's Lax)
        .with_same_site(SameSite::Strict)
        .with_http_only(true)
        .with_path("/admin")
}
