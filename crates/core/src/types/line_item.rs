//! Cart line items and totals.
//!
//! A line item is a snapshot: the name and unit price are captured when the
//! customer checks out and never re-read from the catalog. Totals are always
//! computed in integer minor units so repeated calls over the same cart give
//! the same amount.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::ProductId;
use super::money::{CurrencyCode, MoneyError};

/// Maximum number of line items accepted in a single checkout.
pub const MAX_LINE_ITEMS: usize = 50;

/// Maximum quantity of a single line item.
pub const MAX_QUANTITY: u32 = 100;

/// Maximum length of a line item name.
const MAX_NAME_LENGTH: usize = 200;

/// Errors validating a cart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineItemError {
    #[error("cart is empty")]
    Empty,
    #[error("cart has more than 50 line items")]
    TooManyItems,
    #[error("line {index}: name is required")]
    MissingName { index: usize },
    #[error("line {index}: name is longer than 200 characters")]
    NameTooLong { index: usize },
    #[error("line {index}: quantity must be between 1 and 100")]
    InvalidQuantity { index: usize },
    #[error("line {index}: {source}")]
    InvalidPrice {
        index: usize,
        #[source]
        source: MoneyError,
    },
    #[error("cart total is too large")]
    TotalOverflow,
}

/// A single purchased line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Catalog product this line decrements stock for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    /// Product name at checkout time.
    pub name: String,
    /// Unit price in the standard currency unit. Accepts a JSON string or number.
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl LineItem {
    /// Unit price in minor units.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError` if the price is negative or too large.
    pub fn unit_minor(&self, currency: CurrencyCode) -> Result<i64, MoneyError> {
        currency.to_minor_units(self.unit_price)
    }

    /// Line total (`unit_minor * quantity`) in minor units.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError` if the price is invalid or the product overflows.
    pub fn total_minor(&self, currency: CurrencyCode) -> Result<i64, MoneyError> {
        self.unit_minor(currency)?
            .checked_mul(i64::from(self.quantity))
            .ok_or(MoneyError::Overflow)
    }

    fn validate(&self, index: usize, currency: CurrencyCode) -> Result<(), LineItemError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(LineItemError::MissingName { index });
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(LineItemError::NameTooLong { index });
        }
        if !(1..=MAX_QUANTITY).contains(&self.quantity) {
            return Err(LineItemError::InvalidQuantity { index });
        }
        currency
            .check_precision(self.unit_price)
            .and_then(|()| self.total_minor(currency).map(|_| ()))
            .map_err(|source| LineItemError::InvalidPrice { index, source })
    }
}

/// Validate every line of a cart.
///
/// # Errors
///
/// Returns the first `LineItemError` found.
pub fn validate_cart(items: &[LineItem], currency: CurrencyCode) -> Result<(), LineItemError> {
    if items.is_empty() {
        return Err(LineItemError::Empty);
    }
    if items.len() > MAX_LINE_ITEMS {
        return Err(LineItemError::TooManyItems);
    }
    for (index, item) in items.iter().enumerate() {
        item.validate(index, currency)?;
    }
    cart_total_minor(items, currency).map(|_| ())
}

/// Sum of `unit_minor * quantity` over the cart, in minor units.
///
/// # Errors
///
/// Returns `LineItemError::InvalidPrice` for an invalid line or
/// `LineItemError::TotalOverflow` if the sum does not fit in `i64`.
pub fn cart_total_minor(items: &[LineItem], currency: CurrencyCode) -> Result<i64, LineItemError> {
    items.iter().enumerate().try_fold(0_i64, |acc, (index, item)| {
        let line = item
            .total_minor(currency)
            .map_err(|source| LineItemError::InvalidPrice { index, source })?;
        acc.checked_add(line).ok_or(LineItemError::TotalOverflow)
    })
}
