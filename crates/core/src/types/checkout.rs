//! The checkout intent carried through the payment provider.
//!
//! When a checkout session is created the service records *what* is being
//! paid for as provider metadata. The webhook hands that metadata back
//! unchanged and the reconciler dispatches on the explicit `intent`
//! discriminant instead of guessing from which fields happen to be present.
//!
//! Provider metadata is a flat string map with a per-value length limit, so
//! serialized line items are split across `line_items_0`, `line_items_1`, ...

use std::collections::BTreeMap;

use thiserror::Error;

use super::contact::{CustomerContact, Email};
use super::id::{CustomOrderId, FriendlyId, OrderNumber};
use super::line_item::LineItem;

/// Maximum characters in a single metadata value.
pub const METADATA_VALUE_LIMIT: usize = 500;

const KEY_INTENT: &str = "intent";
const KEY_ORDER_NUMBER: &str = "order_number";
const KEY_EMAIL: &str = "customer_email";
const KEY_NAME: &str = "customer_name";
const KEY_PHONE: &str = "customer_phone";
const KEY_LINE_ITEMS_PREFIX: &str = "line_items_";
const KEY_CUSTOM_ORDER_ID: &str = "custom_order_id";
const KEY_FRIENDLY_ID: &str = "friendly_id";

const INTENT_CART: &str = "cart";
const INTENT_CUSTOM_ORDER: &str = "custom_order";

/// Errors decoding an intent from provider metadata.
#[derive(Debug, Error)]
pub enum IntentError {
    #[error("metadata has no intent")]
    MissingIntent,
    #[error("unknown intent: {0}")]
    UnknownIntent(String),
    #[error("metadata is missing {0}")]
    MissingField(&'static str),
    #[error("metadata field {field} is invalid")]
    InvalidField { field: &'static str },
    #[error("line items are not valid JSON: {0}")]
    LineItems(#[from] serde_json::Error),
}

/// What a checkout session pays for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutIntent {
    /// A cart of line items bought by a customer.
    Cart {
        order_number: OrderNumber,
        contact: CustomerContact,
        line_items: Vec<LineItem>,
    },
    /// An admin-quoted custom order.
    CustomOrder {
        custom_order_id: CustomOrderId,
        friendly_id: FriendlyId,
    },
}

impl CheckoutIntent {
    /// Short name of the intent, as stored under `intent`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Cart { .. } => INTENT_CART,
            Self::CustomOrder { .. } => INTENT_CUSTOM_ORDER,
        }
    }

    /// Encode as provider metadata.
    ///
    /// # Errors
    ///
    /// Returns `IntentError::LineItems` if the line items cannot be serialized.
    pub fn to_metadata(&self) -> Result<BTreeMap<String, String>, IntentError> {
        let mut metadata = BTreeMap::new();
        metadata.insert(KEY_INTENT.to_owned(), self.kind().to_owned());
        match self {
            Self::Cart {
                order_number,
                contact,
                line_items,
            } => {
                metadata.insert(KEY_ORDER_NUMBER.to_owned(), order_number.to_string());
                metadata.insert(KEY_EMAIL.to_owned(), contact.email.to_string());
                metadata.insert(KEY_NAME.to_owned(), truncate(&contact.name));
                if let Some(phone) = &contact.phone {
                    metadata.insert(KEY_PHONE.to_owned(), truncate(phone));
                }
                let encoded = serde_json::to_string(line_items)?;
                for (index, chunk) in chunk_chars(&encoded).into_iter().enumerate() {
                    metadata.insert(format!("{KEY_LINE_ITEMS_PREFIX}{index}"), chunk);
                }
            }
            Self::CustomOrder {
                custom_order_id,
                friendly_id,
            } => {
                metadata.insert(KEY_CUSTOM_ORDER_ID.to_owned(), custom_order_id.to_string());
                metadata.insert(KEY_FRIENDLY_ID.to_owned(), friendly_id.to_string());
            }
        }
        Ok(metadata)
    }

    /// Decode from provider metadata.
    ///
    /// # Errors
    ///
    /// Returns `IntentError` if the discriminant is missing or unknown, or a
    /// field it requires is missing or malformed.
    pub fn from_metadata(metadata: &BTreeMap<String, String>) -> Result<Self, IntentError> {
        let intent = metadata
            .get(KEY_INTENT)
            .ok_or(IntentError::MissingIntent)?;
        match intent.as_str() {
            INTENT_CART => {
                let order_number =
                    OrderNumber::from_string(required(metadata, KEY_ORDER_NUMBER)?.to_owned());
                let email = Email::parse(required(metadata, KEY_EMAIL)?)
                    .map_err(|_| IntentError::InvalidField { field: KEY_EMAIL })?;
                let contact = CustomerContact {
                    email,
                    name: required(metadata, KEY_NAME)?.to_owned(),
                    phone: metadata.get(KEY_PHONE).cloned(),
                };
                let mut encoded = String::new();
                for index in 0.. {
                    match metadata.get(&format!("{KEY_LINE_ITEMS_PREFIX}{index}")) {
                        Some(chunk) => encoded.push_str(chunk),
                        None => break,
                    }
                }
                if encoded.is_empty() {
                    return Err(IntentError::MissingField("line_items"));
                }
                let line_items = serde_json::from_str(&encoded)?;
                Ok(Self::Cart {
                    order_number,
                    contact,
                    line_items,
                })
            }
            INTENT_CUSTOM_ORDER => {
                let custom_order_id = required(metadata, KEY_CUSTOM_ORDER_ID)?
                    .parse()
                    .map_err(|_| IntentError::InvalidField {
                        field: KEY_CUSTOM_ORDER_ID,
                    })?;
                let friendly_id = FriendlyId::parse(required(metadata, KEY_FRIENDLY_ID)?)
                    .ok_or(IntentError::InvalidField {
                        field: KEY_FRIENDLY_ID,
                    })?;
                Ok(Self::CustomOrder {
                    custom_order_id,
                    friendly_id,
                })
            }
            other => Err(IntentError::UnknownIntent(other.to_owned())),
        }
    }
}

fn required<'a>(
    metadata: &'a BTreeMap<String, String>,
    key: &'static str,
) -> Result<&'a str, IntentError> {
    metadata
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or(IntentError::MissingField(key))
}

fn truncate(value: &str) -> String {
    value.chars().take(METADATA_VALUE_LIMIT).collect()
}

fn chunk_chars(value: &str) -> Vec<String> {
    let chars: Vec<char> = value.chars().collect();
    chars
        .chunks(METADATA_VALUE_LIMIT)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn cart_intent(lines: usize) -> CheckoutIntent {
        CheckoutIntent::Cart {
            order_number: OrderNumber::from_string("ORD-20261016-ABCDEF".to_owned()),
            contact: CustomerContact {
                email: Email::parse("buyer@shop.example").unwrap(),
                name: "Ada Lovelace".to_owned(),
                phone: None,
            },
            line_items: (0..lines)
                .map(|i| LineItem {
                    product_id: Some(crate::ProductId::generate()),
                    name: format!("Hand-thrown bowl no. {i}"),
                    unit_price: Decimal::new(4500, 2),
                    quantity: 2,
                })
                .collect(),
        }
    }

    #[test]
    fn test_cart_intent_survives_metadata() {
        let intent = cart_intent(2);
        let metadata = intent.to_metadata().unwrap();
        assert_eq!(metadata["intent"], "cart");
        assert_eq!(CheckoutIntent::from_metadata(&metadata).unwrap(), intent);
    }

    #[test]
    fn test_large_cart_is_chunked_within_limits() {
        let intent = cart_intent(40);
        let metadata = intent.to_metadata().unwrap();
        assert!(metadata.contains_key("line_items_1"));
        assert!(
            metadata
                .values()
                .all(|v| v.chars().count() <= METADATA_VALUE_LIMIT)
        );
        assert_eq!(CheckoutIntent::from_metadata(&metadata).unwrap(), intent);
    }

    #[test]
    fn test_custom_order_intent_survives_metadata() {
        let intent = CheckoutIntent::CustomOrder {
            custom_order_id: CustomOrderId::generate(),
            friendly_id: FriendlyId::parse("CO-9XK4TR").unwrap(),
        };
        let metadata = intent.to_metadata().unwrap();
        assert!(!metadata.contains_key("line_items_0"));
        assert_eq!(CheckoutIntent::from_metadata(&metadata).unwrap(), intent);
    }

    #[test]
    fn test_from_metadata_rejects_missing_discriminant() {
        let mut metadata = cart_intent(1).to_metadata().unwrap();
        metadata.remove("intent");
        assert!(matches!(
            CheckoutIntent::from_metadata(&metadata),
            Err(IntentError::MissingIntent)
        ));

        metadata.insert("intent".to_owned(), "gift_card".to_owned());
        assert!(matches!(
            CheckoutIntent::from_metadata(&metadata),
            Err(IntentError::UnknownIntent(_))
        ));
    }

    #[test]
    fn test_from_metadata_rejects_missing_items() {
        let mut metadata = cart_intent(1).to_metadata().unwrap();
        metadata.remove("line_items_0");
        assert!(matches!(
            CheckoutIntent::from_metadata(&metadata),
            Err(IntentError::MissingField("line_items"))
        ));
    }
}
