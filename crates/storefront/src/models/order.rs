//! Standard (cart) orders.
//!
//! Contact details, line items and totals are snapshots taken at checkout.
//! Nothing here is recomputed from live catalog prices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{
    CurrencyCode, CustomerContact, CustomerId, LineItem, Money, OrderId, OrderNumber,
    OrderStatus, PaymentStatus, ShippingAddress,
};

/// A standard order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub contact: CustomerContact,
    pub customer_id: Option<CustomerId>,
    pub line_items: Vec<LineItem>,
    pub currency: CurrencyCode,
    pub subtotal_minor: i64,
    pub shipping_minor: i64,
    pub tax_minor: i64,
    pub total_minor: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub provider_session_id: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub courier_name: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[must_use]
    pub const fn total(&self) -> Money {
        Money::from_minor(self.total_minor, self.currency)
    }
}

/// A pending order to insert when a checkout session is created.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub contact: CustomerContact,
    pub customer_id: Option<CustomerId>,
    pub line_items: Vec<LineItem>,
    pub currency: CurrencyCode,
    pub subtotal_minor: i64,
    pub shipping_minor: i64,
    pub tax_minor: i64,
    pub total_minor: i64,
    pub provider_session_id: String,
}

/// What the payment provider reported when a session settled.
#[derive(Debug, Clone, Default)]
pub struct PaymentSettlement {
    pub subtotal_minor: Option<i64>,
    pub shipping_minor: Option<i64>,
    pub tax_minor: Option<i64>,
    pub total_minor: Option<i64>,
    pub shipping_address: Option<ShippingAddress>,
}

/// Partial admin update to an order.
///
/// Absent fields are left alone. For the text fields an empty string
/// clears the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub tracking_number: Option<String>,
    pub courier_name: Option<String>,
    pub tracking_url: Option<String>,
    pub notes: Option<String>,
}

impl OrderPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.payment_status.is_none()
            && self.tracking_number.is_none()
            && self.courier_name.is_none()
            && self.tracking_url.is_none()
            && self.notes.is_none()
    }

    /// Apply to an order in memory, as the database update does.
    pub fn apply_to(&self, order: &mut Order, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(payment_status) = self.payment_status {
            order.payment_status = payment_status;
            if payment_status == PaymentStatus::Paid && order.paid_at.is_none() {
                order.paid_at = Some(now);
            }
        }
        set_text(&mut order.tracking_number, self.tracking_number.as_deref());
        set_text(&mut order.courier_name, self.courier_name.as_deref());
        set_text(&mut order.tracking_url, self.tracking_url.as_deref());
        set_text(&mut order.notes, self.notes.as_deref());
        order.updated_at = now;
    }
}

fn set_text(field: &mut Option<String>, value: Option<&str>) {
    if let Some(value) = value {
        let trimmed = value.trim();
        *field = (!trimmed.is_empty()).then(|| trimmed.to_owned());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_deserializes_camel_case_and_rejects_unknown() {
        let patch: OrderPatch =
            serde_json::from_str(r#"{"status":"shipped","trackingNumber":"1Z999"}"#).unwrap();
        assert_eq!(patch.status, Some(OrderStatus::Shipped));
        assert_eq!(patch.tracking_number.as_deref(), Some("1Z999"));
        assert!(!patch.is_empty());

        assert!(serde_json::from_str::<OrderPatch>(r#"{"totalMinor":0}"#).is_err());
        assert!(OrderPatch::default().is_empty());
    }

    #[test]
    fn test_set_text_clears_on_empty() {
        let mut field = Some("old".to_owned());
        set_text(&mut field, None);
        assert_eq!(field.as_deref(), Some("old"));
        set_text(&mut field, Some("  new "));
        assert_eq!(field.as_deref(), Some("new"));
        set_text(&mut field, Some(""));
        assert!(field.is_none());
    }
}
