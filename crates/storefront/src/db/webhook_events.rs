//! Processed webhook event ids.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::RepositoryError;

/// Remembers which provider events were already handled.
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    async fn is_processed(&self, event_id: &str) -> Result<bool, RepositoryError>;

    /// Record an event as handled. Returns `false` if it already was.
    async fn record(
        &self,
        event_id: &str,
        event_type: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

pub struct PgWebhookEventStore {
    pool: PgPool,
}

impl PgWebhookEventStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventStore for PgWebhookEventStore {
    async fn is_processed(&self, event_id: &str) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM processed_webhook_events WHERE event_id = $1)",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn record(
        &self,
        event_id: &str,
        event_type: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO processed_webhook_events (event_id, event_type, processed_at) \
             VALUES ($1, $2, $3) ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id)
        .bind(event_type)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
