//! Notification outbox.
//!
//! Tasks are claimed with a lease (`locked_until`) so a worker that dies
//! mid-delivery does not strand them: once the lease lapses another claim
//! picks the task up again.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use atelier_core::OutboxTaskId;

use super::RepositoryError;
use crate::models::{Notification, OutboxTask};
use crate::services::rate_limit::window_end;

/// Durable queue of pending notifications.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn enqueue(
        &self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Result<OutboxTaskId, RepositoryError>;

    /// Claim up to `limit` due tasks, leasing them for `lease`.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<OutboxTask>, RepositoryError>;

    async fn complete(&self, id: OutboxTaskId, now: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// Release a failed task for another attempt at `next_attempt_at`.
    async fn reschedule(
        &self,
        id: OutboxTaskId,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), RepositoryError>;

    /// Give up on a task.
    async fn mark_dead(
        &self,
        id: OutboxTaskId,
        attempts: u32,
        error: &str,
    ) -> Result<(), RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: OutboxTaskId,
    payload: Json<Notification>,
    attempts: i32,
    created_at: DateTime<Utc>,
}

impl From<OutboxRow> for OutboxTask {
    fn from(row: OutboxRow) -> Self {
        Self {
            id: row.id,
            notification: row.payload.0,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            created_at: row.created_at,
        }
    }
}

pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn enqueue(
        &self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Result<OutboxTaskId, RepositoryError> {
        let id = OutboxTaskId::generate();
        sqlx::query(
            "INSERT INTO notification_outbox (id, kind, payload, next_attempt_at, created_at) \
             VALUES ($1, $2, $3, $4, $4)",
        )
        .bind(id)
        .bind(notification.kind())
        .bind(Json(notification))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<OutboxTask>, RepositoryError> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            "UPDATE notification_outbox SET locked_until = $3 \
             WHERE id IN ( \
                 SELECT id FROM notification_outbox \
                 WHERE status = 'pending' AND next_attempt_at <= $1 \
                   AND (locked_until IS NULL OR locked_until <= $1) \
                 ORDER BY next_attempt_at \
                 LIMIT $2 \
                 FOR UPDATE SKIP LOCKED) \
             RETURNING id, payload, attempts, created_at",
        )
        .bind(now)
        .bind(limit)
        .bind(window_end(now, lease))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(OutboxTask::from).collect())
    }

    async fn complete(&self, id: OutboxTaskId, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE notification_outbox SET status = 'delivered', delivered_at = $2, \
                 attempts = attempts + 1, locked_until = NULL, last_error = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reschedule(
        &self,
        id: OutboxTaskId,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE notification_outbox SET attempts = $2, next_attempt_at = $3, \
                 last_error = $4, locked_until = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(i32::try_from(attempts).unwrap_or(i32::MAX))
        .bind(next_attempt_at)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_dead(
        &self,
        id: OutboxTaskId,
        attempts: u32,
        error: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE notification_outbox SET status = 'dead', attempts = $2, last_error = $3, \
                 locked_until = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(i32::try_from(attempts).unwrap_or(i32::MAX))
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
