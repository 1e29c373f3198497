//! Outbound notifications queued in the outbox.
//!
//! A notification carries everything needed to render it, so delivery never
//! has to read order state again and a retried delivery sends the same text.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelier_core::{CurrencyCode, CustomOrderId, Email, FriendlyId, Money, OrderId, OrderNumber, OutboxTaskId};

/// A side effect to deliver after a state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Customer receipt for a paid cart order.
    OrderConfirmation {
        order_id: OrderId,
        order_number: OrderNumber,
        email: Email,
        name: String,
        total_minor: i64,
        currency: CurrencyCode,
    },
    /// Acknowledgement of a submitted custom order.
    CustomOrderReceived {
        custom_order_id: CustomOrderId,
        friendly_id: FriendlyId,
        email: Email,
        name: String,
    },
    /// An admin has priced a custom order.
    QuoteReady {
        custom_order_id: CustomOrderId,
        friendly_id: FriendlyId,
        email: Email,
        name: String,
        price: Decimal,
        currency: CurrencyCode,
    },
    /// Payment confirmation for a custom order.
    CustomOrderPaid {
        custom_order_id: CustomOrderId,
        friendly_id: FriendlyId,
        email: Email,
        name: String,
    },
    /// Alert to the shop owner about new paid work.
    AdminNewOrder {
        reference: String,
        customer_email: Email,
        total_minor: i64,
        currency: CurrencyCode,
    },
}

impl Notification {
    /// Stable name of the notification kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OrderConfirmation { .. } => "order_confirmation",
            Self::CustomOrderReceived { .. } => "custom_order_received",
            Self::QuoteReady { .. } => "quote_ready",
            Self::CustomOrderPaid { .. } => "custom_order_paid",
            Self::AdminNewOrder { .. } => "admin_new_order",
        }
    }

    /// Who receives it. Admin alerts go to the configured admin address.
    #[must_use]
    pub fn recipient<'a>(&'a self, admin_email: Option<&'a str>) -> Option<&'a str> {
        match self {
            Self::OrderConfirmation { email, .. }
            | Self::CustomOrderReceived { email, .. }
            | Self::QuoteReady { email, .. }
            | Self::CustomOrderPaid { email, .. } => Some(email.as_str()),
            Self::AdminNewOrder { .. } => admin_email,
        }
    }

    /// Total for amounts carried in minor units.
    #[must_use]
    pub const fn total(&self) -> Option<Money> {
        match self {
            Self::OrderConfirmation {
                total_minor,
                currency,
                ..
            }
            | Self::AdminNewOrder {
                total_minor,
                currency,
                ..
            } => Some(Money::from_minor(*total_minor, *currency)),
            _ => None,
        }
    }
}

/// A claimed outbox entry.
#[derive(Debug, Clone)]
pub struct OutboxTask {
    pub id: OutboxTaskId,
    pub notification: Notification,
    /// Delivery attempts made before this one.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_json_is_tagged() {
        let notification = Notification::QuoteReady {
            custom_order_id: CustomOrderId::generate(),
            friendly_id: FriendlyId::parse("CO-ABCDEF").unwrap(),
            email: Email::parse("a@b.co").unwrap(),
            name: "Ada".to_owned(),
            price: Decimal::new(20000, 2),
            currency: CurrencyCode::USD,
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["kind"], "quote_ready");
        let back: Notification = serde_json::from_value(json).unwrap();
        assert_eq!(back, notification);
    }

    #[test]
    fn test_admin_recipient_is_configurable() {
        let notification = Notification::AdminNewOrder {
            reference: "ORD-20261016-ABCDEF".to_owned(),
            customer_email: Email::parse("a@b.co").unwrap(),
            total_minor: 100,
            currency: CurrencyCode::USD,
        };
        assert_eq!(notification.recipient(None), None);
        assert_eq!(
            notification.recipient(Some("owner@shop.example")),
            Some("owner@shop.example")
        );
    }
}
