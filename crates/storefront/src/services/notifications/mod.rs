//! Notification outbox and delivery worker.
//!
//! State transitions enqueue [`Notification`]s into the outbox after they
//! commit. A background [`NotificationWorker`] delivers them with retries.
//! Nothing here can fail the request that produced the notification: an
//! enqueue failure is logged and dropped, delivery failures are retried
//! with exponential backoff and finally marked dead.

pub mod email;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;

pub use email::EmailNotifier;

use crate::db::{OutboxStore, RepositoryError};
use crate::models::{Notification, OutboxTask};
use crate::services::rate_limit::window_end;

/// First retry delay.
const BACKOFF_BASE: Duration = Duration::from_secs(30);

/// Longest retry delay.
const BACKOFF_CAP: Duration = Duration::from_secs(60 * 60);

/// Attempts before a task is marked dead.
pub const MAX_ATTEMPTS: u32 = 8;

/// Errors delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("template error: {0}")]
    Template(#[from] askama::Error),

    #[error("no recipient configured for {0}")]
    NoRecipient(&'static str),

    #[error("delivery timed out")]
    Timeout,
}

/// Delivers a single notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of sending them.
///
/// Used when no SMTP relay is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let rendered = email::render(notification)?;
        tracing::info!(
            kind = notification.kind(),
            subject = %rendered.subject,
            "Notification (SMTP not configured, not sent)"
        );
        Ok(())
    }
}

/// Handle for enqueueing notifications.
#[derive(Clone)]
pub struct Outbox {
    store: Arc<dyn OutboxStore>,
}

impl Outbox {
    #[must_use]
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    /// Queue a notification. Failures are logged, never returned.
    pub async fn enqueue(&self, notification: Notification) {
        match self.store.enqueue(&notification, Utc::now()).await {
            Ok(id) => tracing::debug!(%id, kind = notification.kind(), "Notification queued"),
            Err(e) => tracing::error!(
                error = %e,
                kind = notification.kind(),
                "Failed to queue notification"
            ),
        }
    }
}

/// Delay before retry number `attempts` (1-based): 30s, 60s, 120s, ... capped at 1h.
#[must_use]
pub fn backoff(attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1).min(16);
    BACKOFF_BASE
        .checked_mul(1 << exponent)
        .map_or(BACKOFF_CAP, |delay| delay.min(BACKOFF_CAP))
}

/// What one polling pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub delivered: usize,
    pub retried: usize,
    pub dead: usize,
}

/// Background delivery loop.
pub struct NotificationWorker {
    store: Arc<dyn OutboxStore>,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    poll_interval: Duration,
    batch_size: i64,
}

impl NotificationWorker {
    #[must_use]
    pub fn new(store: Arc<dyn OutboxStore>, notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self {
            store,
            notifier,
            timeout,
            poll_interval: Duration::from_secs(5),
            batch_size: 20,
        }
    }

    /// Claim and deliver everything due at `now`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if tasks cannot be claimed. Failures to
    /// record an individual outcome are logged.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<WorkerReport, RepositoryError> {
        // Leases outlive a delivery attempt so a task is never sent twice concurrently.
        let lease = self.timeout.saturating_mul(2);
        let tasks = self.store.claim_due(now, self.batch_size, lease).await?;

        let mut report = WorkerReport::default();
        for task in tasks {
            match self.attempt(&task).await {
                Ok(()) => {
                    report.delivered += 1;
                    if let Err(e) = self.store.complete(task.id, Utc::now()).await {
                        tracing::error!(error = %e, id = %task.id, "Failed to mark notification delivered");
                    }
                }
                Err(error) => {
                    if self.record_failure(&task, &error, now).await {
                        report.dead += 1;
                    } else {
                        report.retried += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    async fn attempt(&self, task: &OutboxTask) -> Result<(), NotifyError> {
        tokio::time::timeout(self.timeout, self.notifier.deliver(&task.notification))
            .await
            .map_err(|_| NotifyError::Timeout)?
    }

    /// Returns whether the task was given up on.
    async fn record_failure(&self, task: &OutboxTask, error: &NotifyError, now: DateTime<Utc>) -> bool {
        let attempts = task.attempts.saturating_add(1);
        let message = error.to_string();

        if attempts >= MAX_ATTEMPTS {
            tracing::error!(
                id = %task.id,
                kind = task.notification.kind(),
                attempts,
                error = %message,
                "Notification delivery failed permanently"
            );
            if let Err(e) = self.store.mark_dead(task.id, attempts, &message).await {
                tracing::error!(error = %e, id = %task.id, "Failed to mark notification dead");
            }
            return true;
        }

        let next_attempt_at = window_end(now, backoff(attempts));
        tracing::warn!(
            id = %task.id,
            kind = task.notification.kind(),
            attempts,
            error = %message,
            %next_attempt_at,
            "Notification delivery failed, will retry"
        );
        if let Err(e) = self
            .store
            .reschedule(task.id, attempts, next_attempt_at, &message)
            .await
        {
            tracing::error!(error = %e, id = %task.id, "Failed to reschedule notification");
        }
        false
    }

    /// Poll until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Notification worker started");
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_once(Utc::now()).await {
                        Ok(report) if report != WorkerReport::default() => {
                            tracing::debug!(?report, "Notification pass complete");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "Failed to claim notifications"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Notification worker stopped");
    }
}
