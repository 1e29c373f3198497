//! Payment provider integration.
//!
//! The storefront never sees card data. It asks a provider for a hosted
//! checkout session, redirects the customer there, and learns the outcome
//! from signed webhook events (see [`signature`] and [`events`]).
//!
//! # Providers
//!
//! - [`StripeClient`] - Stripe Checkout over its REST API
//! - [`SimulatedProvider`] - Local provider that settles immediately, for
//!   development and manual orders

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

pub mod events;
pub mod signature;
pub mod simulated;
pub mod stripe;

pub use events::{CompletedSession, EventError, ProviderEvent};
pub use signature::{SIGNATURE_HEADER, SignatureError, WebhookVerifier};
pub use simulated::SimulatedProvider;
pub use stripe::StripeClient;

/// Errors from the payment provider API.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The request did not complete in time.
    #[error("payment provider timed out")]
    Timeout,
}

/// One line on the hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLineItem {
    pub name: String,
    /// Unit price in the currency's minor unit.
    pub unit_amount_minor: i64,
    pub quantity: u32,
}

/// Everything needed to open a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    /// Repeating a request with the same key returns the same session.
    pub idempotency_key: String,
    /// Lowercase ISO code, as providers expect it.
    pub currency: String,
    pub line_items: Vec<SessionLineItem>,
    pub customer_email: Option<String>,
    /// Carried back unmodified on the webhook event.
    pub metadata: BTreeMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
    /// ISO country codes the customer may ship to.
    pub shipping_countries: Vec<String>,
}

impl CheckoutSessionRequest {
    /// Sum of line totals in minor units, or `None` on overflow.
    #[must_use]
    pub fn total_minor(&self) -> Option<i64> {
        self.line_items.iter().try_fold(0_i64, |sum, item| {
            item.unit_amount_minor
                .checked_mul(i64::from(item.quantity))
                .and_then(|line| sum.checked_add(line))
        })
    }
}

/// A created hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    /// Where to redirect the customer.
    pub url: String,
}

/// A hosted checkout provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether sessions from this provider are paid as soon as they are
    /// created, without a webhook.
    fn settles_immediately(&self) -> bool {
        false
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_minor() {
        let request = CheckoutSessionRequest {
            idempotency_key: "k".to_owned(),
            currency: "usd".to_owned(),
            line_items: vec![
                SessionLineItem {
                    name: "Ring".to_owned(),
                    unit_amount_minor: 15000,
                    quantity: 1,
                },
                SessionLineItem {
                    name: "Chain".to_owned(),
                    unit_amount_minor: 4500,
                    quantity: 2,
                },
            ],
            customer_email: None,
            metadata: BTreeMap::new(),
            success_url: String::new(),
            cancel_url: String::new(),
            shipping_countries: Vec::new(),
        };
        assert_eq!(request.total_minor(), Some(24000));
    }
}
