//! Fixed-window rate-limit counters.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::RepositoryError;
use crate::services::rate_limit::window_end;

/// Counter state after a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Hits in the current window, including this one.
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

impl WindowState {
    /// State after one more hit at `now`.
    ///
    /// Starts a new window when the previous one has elapsed.
    #[must_use]
    pub fn hit(previous: Option<Self>, window: Duration, now: DateTime<Utc>) -> Self {
        match previous {
            Some(state) if state.reset_at > now => Self {
                count: state.count.saturating_add(1),
                reset_at: state.reset_at,
            },
            _ => Self {
                count: 1,
                reset_at: window_end(now, window),
            },
        }
    }
}

/// Shared counter storage for the rate limiter.
///
/// A single instance can use the in-process store; several instances
/// behind a load balancer need the `PostgreSQL` store so they share counts.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request against `key`, atomically.
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowState, RepositoryError>;

    /// Drop windows that ended before `now`. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

pub struct PgRateLimitStore {
    pool: PgPool,
}

impl PgRateLimitStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for PgRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowState, RepositoryError> {
        let (count, reset_at): (i32, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO rate_limit_windows (key, count, reset_at) VALUES ($1, 1, $3) \
             ON CONFLICT (key) DO UPDATE SET \
                 count = CASE WHEN rate_limit_windows.reset_at <= $2 THEN 1 \
                              ELSE rate_limit_windows.count + 1 END, \
                 reset_at = CASE WHEN rate_limit_windows.reset_at <= $2 THEN $3 \
                                 ELSE rate_limit_windows.reset_at END \
             RETURNING count, reset_at",
        )
        .bind(key)
        .bind(now)
        .bind(window_end(now, window))
        .fetch_one(&self.pool)
        .await?;

        Ok(WindowState {
            count: u32::try_from(count).unwrap_or(u32::MAX),
            reset_at,
        })
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM rate_limit_windows WHERE reset_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_hit_counts_within_window_and_resets_after() {
        let now = Utc::now();
        let window = Duration::from_secs(60);

        let first = WindowState::hit(None, window, now);
        assert_eq!(first.count, 1);
        assert_eq!(first.reset_at, now + TimeDelta::seconds(60));

        let second = WindowState::hit(Some(first), window, now + TimeDelta::seconds(30));
        assert_eq!(second.count, 2);
        assert_eq!(second.reset_at, first.reset_at);

        let later = first.reset_at;
        let third = WindowState::hit(Some(second), window, later);
        assert_eq!(third.count, 1);
        assert_eq!(third.reset_at, later + TimeDelta::seconds(60));
    }
}
