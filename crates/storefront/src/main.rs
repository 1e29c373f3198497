//! Atelier storefront service.
//!
//! Serves the checkout, webhook, custom order and admin order APIs on
//! port 3000.
//!
//! # Architecture
//!
//! - Axum router with per-scope session layers (customer and admin)
//! - Hosted payment sessions via Stripe, or the simulated provider
//! - `PostgreSQL` for orders, stock, sessions and the notification outbox,
//!   or in-process stores for a single development instance
//! - Background tasks for notification delivery and rate-limit cleanup
//!
//! Migrations are NOT run on startup. Run them explicitly via:
//! `cargo run -p atelier-cli -- migrate`

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sentry::integrations::tracing as sentry_tracing;
use tokio::sync::watch;
use tower_sessions::ExpiredDeletion;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_storefront::app::build_router;
use atelier_storefront::config::StorefrontConfig;
use atelier_storefront::db::{self, Stores};
use atelier_storefront::middleware::SessionBackend;
use atelier_storefront::services::{EmailNotifier, LogNotifier, NotificationWorker, Notifier};
use atelier_storefront::state::AppState;

/// How often expired rate-limit windows are purged.
const RATE_LIMIT_SWEEP_PERIOD: Duration = Duration::from_secs(5 * 60);

/// How often expired sessions are deleted from `PostgreSQL`.
const SESSION_CLEANUP_PERIOD: Duration = Duration::from_secs(60 * 60);

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "atelier_storefront=info,tower_http=debug".into());

    // JSON on Fly.io (or when asked) for structured log parsing, text locally
    let json = std::env::var("FLY_APP_NAME").is_ok()
        || std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

fn build_notifier(config: &StorefrontConfig) -> Arc<dyn Notifier> {
    let Some(smtp) = &config.notifications.smtp else {
        tracing::warn!("SMTP_HOST not set, notifications will only be logged");
        return Arc::new(LogNotifier);
    };

    match EmailNotifier::new(smtp, config.notifications.admin_email.clone()) {
        Ok(notifier) => Arc::new(notifier),
        Err(e) => {
            tracing::error!(error = %e, "Failed to configure SMTP, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = StorefrontConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    let stores = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url)
                .await
                .expect("Failed to create database pool");
            tracing::info!("Database pool created");
            Stores::postgres(pool)
        }
        None => {
            tracing::warn!(
                "No database configured, using in-process stores (single instance only, data is lost on restart)"
            );
            Stores::in_memory()
        }
    };

    let sessions = SessionBackend::new(stores.pool.as_ref());
    let state = AppState::new(config.clone(), stores.clone())
        .expect("Failed to initialize application state");
    tracing::info!(
        provider = ?config.payment.provider,
        currency = %config.payment.currency,
        "Payment provider configured"
    );

    // Background tasks stop when this flips to true
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = NotificationWorker::new(
        Arc::clone(&stores.outbox),
        build_notifier(&config),
        config.notifications.timeout,
    );
    let worker_task = tokio::spawn(worker.run(shutdown_rx.clone()));
    let sweeper_task = tokio::spawn(
        state
            .rate_limiter()
            .clone()
            .run_sweeper(RATE_LIMIT_SWEEP_PERIOD, shutdown_rx),
    );

    if let SessionBackend::Postgres(store) = &sessions {
        let deletion = store.clone().continuously_delete_expired(SESSION_CLEANUP_PERIOD);
        tokio::spawn(async move {
            if let Err(e) = deletion.await {
                tracing::error!(error = %e, "Session cleanup task failed");
            }
        });
    }

    let app = build_router(state, &sessions);

    // Start server
    let addr = config.socket_addr();
    tracing::info!("storefront listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(worker_task, sweeper_task);
    tracing::info!("Background tasks stopped");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
