//! Fixed-window request limiting per client and route class.
//!
//! Each `(client, route class)` key owns a window: the first hit opens it
//! with `count = 1` and `reset_at = now + window`; hits while
//! `reset_at > now` increment the count and are allowed while
//! `count <= max_requests`; once `reset_at` has passed the next hit opens a
//! new window. Counting happens in a [`RateLimitStore`] so the same limiter
//! works against in-process state or a shared database.
//!
//! The limiter is best-effort. A store failure lets the request through and
//! is logged rather than turning a storage outage into a site outage.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::db::RateLimitStore;

/// Route classes with independent limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Login,
    Checkout,
    AdminMutation,
    CustomOrderSubmission,
    Default,
}

impl RouteClass {
    pub const ALL: &'static [Self] = &[
        Self::Login,
        Self::Checkout,
        Self::AdminMutation,
        Self::CustomOrderSubmission,
        Self::Default,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Checkout => "checkout",
            Self::AdminMutation => "admin-mutation",
            Self::CustomOrderSubmission => "custom-order-submission",
            Self::Default => "default",
        }
    }

    /// Suffix of the `RATE_LIMIT_*` environment variable.
    #[must_use]
    pub const fn env_suffix(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Checkout => "CHECKOUT",
            Self::AdminMutation => "ADMIN_MUTATION",
            Self::CustomOrderSubmission => "CUSTOM_ORDER_SUBMISSION",
            Self::Default => "DEFAULT",
        }
    }

    /// Built-in policy for the class.
    #[must_use]
    pub const fn default_policy(self) -> RatePolicy {
        match self {
            Self::Login => RatePolicy::new(5, Duration::from_secs(15 * 60)),
            Self::Checkout => RatePolicy::new(10, Duration::from_secs(60)),
            Self::AdminMutation => RatePolicy::new(60, Duration::from_secs(60)),
            Self::CustomOrderSubmission => RatePolicy::new(3, Duration::from_secs(60 * 60)),
            Self::Default => RatePolicy::new(100, Duration::from_secs(60)),
        }
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `max_requests` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RatePolicy {
    #[must_use]
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Parses `<max>/<window_secs>`, e.g. `5/900`.
impl FromStr for RatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (max, secs) = s
            .split_once('/')
            .ok_or_else(|| format!("expected <max>/<window_secs>, got '{s}'"))?;
        let max_requests: u32 = max.trim().parse().map_err(|e| format!("max: {e}"))?;
        let secs: u64 = secs.trim().parse().map_err(|e| format!("window: {e}"))?;
        if max_requests == 0 || secs == 0 {
            return Err("max and window must be positive".to_owned());
        }
        Ok(Self::new(max_requests, Duration::from_secs(secs)))
    }
}

/// Policies for every route class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePolicies {
    login: RatePolicy,
    checkout: RatePolicy,
    admin_mutation: RatePolicy,
    custom_order_submission: RatePolicy,
    default: RatePolicy,
}

impl Default for RatePolicies {
    fn default() -> Self {
        Self {
            login: RouteClass::Login.default_policy(),
            checkout: RouteClass::Checkout.default_policy(),
            admin_mutation: RouteClass::AdminMutation.default_policy(),
            custom_order_submission: RouteClass::CustomOrderSubmission.default_policy(),
            default: RouteClass::Default.default_policy(),
        }
    }
}

impl RatePolicies {
    #[must_use]
    pub const fn get(&self, class: RouteClass) -> RatePolicy {
        match class {
            RouteClass::Login => self.login,
            RouteClass::Checkout => self.checkout,
            RouteClass::AdminMutation => self.admin_mutation,
            RouteClass::CustomOrderSubmission => self.custom_order_submission,
            RouteClass::Default => self.default,
        }
    }

    pub const fn set(&mut self, class: RouteClass, policy: RatePolicy) {
        match class {
            RouteClass::Login => self.login = policy,
            RouteClass::Checkout => self.checkout = policy,
            RouteClass::AdminMutation => self.admin_mutation = policy,
            RouteClass::CustomOrderSubmission => self.custom_order_submission = policy,
            RouteClass::Default => self.default = policy,
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateDecision {
    /// Whole seconds until the window resets, rounded up, at least 1.
    #[must_use]
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0);
        let secs = millis.div_euclid(1000) + i64::from(millis.rem_euclid(1000) > 0);
        u64::try_from(secs).unwrap_or(0).max(1)
    }
}

/// Fixed-window limiter over a [`RateLimitStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policies: RatePolicies,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn RateLimitStore>, policies: RatePolicies) -> Self {
        Self { store, policies }
    }

    #[must_use]
    pub const fn policies(&self) -> &RatePolicies {
        &self.policies
    }

    /// Count a request from `client` against `class`.
    pub async fn check(&self, client: &str, class: RouteClass) -> RateDecision {
        self.check_at(client, class, Utc::now()).await
    }

    /// Count a request at an explicit time.
    #[tracing::instrument(level = "debug", skip(self, now))]
    pub async fn check_at(&self, client: &str, class: RouteClass, now: DateTime<Utc>) -> RateDecision {
        let policy = self.policies.get(class);
        let key = format!("{client}:{class}");

        match self.store.hit(&key, policy.window, now).await {
            Ok(window) => RateDecision {
                allowed: window.count <= policy.max_requests,
                remaining: policy.max_requests.saturating_sub(window.count),
                reset_at: window.reset_at,
            },
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Rate limit store unavailable; allowing request");
                RateDecision {
                    allowed: true,
                    remaining: policy.max_requests,
                    reset_at: window_end(now, policy.window),
                }
            }
        }
    }

    /// Drop windows that have already reset.
    pub async fn sweep(&self) {
        match self.store.purge_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "Purged expired rate limit windows"),
            Err(e) => tracing::warn!(error = %e, "Failed to purge rate limit windows"),
        }
    }

    /// Sweep every `period` until `shutdown` flips to `true`.
    pub async fn run_sweeper(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => self.sweep().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Rate limit sweeper stopped");
    }
}

/// End of a window opened at `now`, saturating instead of overflowing.
pub(crate) fn window_end(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::TimeDelta::from_std(window)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
