//! Custom (commissioned) orders.
//!
//! A custom order is requested by a customer, priced by an admin, and only
//! then paid for. Its price stays `None` until the first quote.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelier_core::{
    CurrencyCode, CustomOrderId, CustomOrderStatus, CustomerContact, FriendlyId, ShippingAddress,
};

/// Kind of commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomOrderType {
    /// A new piece made from scratch.
    Scratch,
    /// A modification of an existing piece.
    Modify,
}

impl CustomOrderType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scratch => "scratch",
            Self::Modify => "modify",
        }
    }
}

impl fmt::Display for CustomOrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CustomOrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scratch" => Ok(Self::Scratch),
            "modify" => Ok(Self::Modify),
            other => Err(format!("unknown custom order type: {other}")),
        }
    }
}

/// A custom order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomOrder {
    pub id: CustomOrderId,
    pub friendly_id: FriendlyId,
    pub contact: CustomerContact,
    pub order_type: CustomOrderType,
    pub material: String,
    pub description: String,
    pub reference_images: Vec<String>,
    pub price: Option<Decimal>,
    pub currency: CurrencyCode,
    pub status: CustomOrderStatus,
    pub provider_session_id: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated request to insert.
#[derive(Debug, Clone)]
pub struct NewCustomOrder {
    pub id: CustomOrderId,
    pub friendly_id: FriendlyId,
    pub contact: CustomerContact,
    pub order_type: CustomOrderType,
    pub material: String,
    pub description: String,
    pub reference_images: Vec<String>,
    pub currency: CurrencyCode,
}

impl NewCustomOrder {
    /// The stored order right after insertion.
    #[must_use]
    pub fn into_custom_order(self, now: DateTime<Utc>) -> CustomOrder {
        CustomOrder {
            id: self.id,
            friendly_id: self.friendly_id,
            contact: self.contact,
            order_type: self.order_type,
            material: self.material,
            description: self.description,
            reference_images: self.reference_images,
            price: None,
            currency: self.currency,
            status: CustomOrderStatus::PendingQuote,
            provider_session_id: None,
            shipping_address: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
