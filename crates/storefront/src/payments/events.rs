//! Webhook event payloads.
//!
//! Only the fields the reconciler reads are modelled. Unknown fields are
//! ignored so provider API upgrades do not break parsing.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use atelier_core::{CurrencyCode, ShippingAddress};

use crate::models::PaymentSettlement;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";
pub const ASYNC_PAYMENT_FAILED: &str = "checkout.session.async_payment_failed";
pub const CHECKOUT_EXPIRED: &str = "checkout.session.expired";

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid event payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// The envelope of every webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl ProviderEvent {
    /// Parse a raw (already verified) body.
    ///
    /// # Errors
    ///
    /// Returns `EventError::Json` if the body is not an event envelope.
    pub fn parse(body: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// The checkout session this event is about.
    ///
    /// # Errors
    ///
    /// Returns `EventError::Json` if the object is not a checkout session.
    pub fn checkout_session(&self) -> Result<CompletedSession, EventError> {
        Ok(CompletedSession::deserialize(&self.data.object)?)
    }
}

/// A checkout session as reported on `checkout.session.*` events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletedSession {
    pub id: String,
    /// `paid`, `unpaid` or `no_payment_required`.
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Lowercase ISO code.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub amount_subtotal: Option<i64>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub total_details: Option<TotalDetails>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub shipping_details: Option<ShippingDetails>,
    #[serde(default)]
    pub collected_information: Option<CollectedInformation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TotalDetails {
    #[serde(default)]
    pub amount_shipping: Option<i64>,
    #[serde(default)]
    pub amount_tax: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectedInformation {
    #[serde(default)]
    pub shipping_details: Option<ShippingDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<ProviderAddress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderAddress {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl CompletedSession {
    /// Whether the customer has actually paid.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid" | "no_payment_required")
        )
    }

    /// Session currency, if reported and supported.
    #[must_use]
    pub fn currency(&self) -> Option<CurrencyCode> {
        self.currency.as_deref().and_then(|c| c.parse().ok())
    }

    /// Shipping address collected on the hosted page, if any.
    #[must_use]
    pub fn shipping_address(&self) -> Option<ShippingAddress> {
        let details = self
            .collected_information
            .as_ref()
            .and_then(|c| c.shipping_details.as_ref())
            .or(self.shipping_details.as_ref())?;
        let address = details.address.clone().unwrap_or_default();
        let shipping = ShippingAddress {
            name: details.name.clone(),
            line1: address.line1,
            line2: address.line2,
            city: address.city,
            state: address.state,
            postal_code: address.postal_code,
            country: address.country,
        };
        (!shipping.is_empty()).then_some(shipping)
    }

    /// Totals and address to store on the settled order.
    #[must_use]
    pub fn settlement(&self) -> PaymentSettlement {
        let totals = self.total_details.clone().unwrap_or_default();
        PaymentSettlement {
            subtotal_minor: self.amount_subtotal,
            shipping_minor: totals.amount_shipping,
            tax_minor: totals.amount_tax,
            total_minor: self.amount_total,
            shipping_address: self.shipping_address(),
        }
    }
}
