//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::{PaymentProviderKind, StorefrontConfig};
use crate::db::Stores;
use crate::payments::{
    PaymentError, PaymentProvider, SimulatedProvider, StripeClient, WebhookVerifier,
};
use crate::services::{
    AuthService, CheckoutOrchestrator, CustomOrderService, OrderService, Outbox, RateLimiter,
    WebhookReconciler,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// configuration, stores and the services built on them.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    stores: Stores,
    auth: AuthService,
    checkout: CheckoutOrchestrator,
    reconciler: WebhookReconciler,
    orders: OrderService,
    custom_orders: CustomOrderService,
    rate_limiter: RateLimiter,
    outbox: Outbox,
}

impl AppState {
    /// Create the state with the provider named in the configuration.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError` if the Stripe client cannot be built.
    pub fn new(config: StorefrontConfig, stores: Stores) -> Result<Self, PaymentError> {
        let provider: Arc<dyn PaymentProvider> = match config.payment.provider {
            PaymentProviderKind::Stripe => Arc::new(StripeClient::new(&config.payment)?),
            PaymentProviderKind::Simulated => Arc::new(SimulatedProvider::new(&config.base_url)),
        };
        Ok(Self::with_provider(config, stores, provider))
    }

    /// Create the state around an explicit payment provider.
    #[must_use]
    pub fn with_provider(
        config: StorefrontConfig,
        stores: Stores,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        let outbox = Outbox::new(Arc::clone(&stores.outbox));
        let verifier = WebhookVerifier::new(
            config.payment.webhook_secret.clone(),
            config.payment.webhook_tolerance,
        );
        let reconciler =
            WebhookReconciler::new(verifier, &stores, outbox.clone(), config.payment.currency);
        let checkout = CheckoutOrchestrator::new(provider, &stores, reconciler.clone(), &config);

        Self {
            inner: Arc::new(AppStateInner {
                auth: AuthService::new(Arc::clone(&stores.accounts)),
                orders: OrderService::new(Arc::clone(&stores.orders)),
                custom_orders: CustomOrderService::new(
                    Arc::clone(&stores.custom_orders),
                    outbox.clone(),
                    config.payment.currency,
                ),
                rate_limiter: RateLimiter::new(
                    Arc::clone(&stores.rate_limits),
                    config.rate_limits.clone(),
                ),
                checkout,
                reconciler,
                outbox,
                stores,
                config,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutOrchestrator {
        &self.inner.checkout
    }

    #[must_use]
    pub fn reconciler(&self) -> &WebhookReconciler {
        &self.inner.reconciler
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn custom_orders(&self) -> &CustomOrderService {
        &self.inner.custom_orders
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    #[must_use]
    pub fn outbox(&self) -> &Outbox {
        &self.inner.outbox
    }
}
