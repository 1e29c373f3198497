//! Core types for Atelier.
//!
//! This module provides type-safe wrappers for the checkout and fulfillment
//! domain.

pub mod checkout;
pub mod contact;
pub mod id;
pub mod line_item;
pub mod money;
pub mod status;

pub use checkout::{CheckoutIntent, IntentError};
pub use contact::{CustomerContact, Email, EmailError, ShippingAddress};
pub use id::*;
pub use line_item::{
    LineItem, LineItemError, MAX_LINE_ITEMS, MAX_QUANTITY, cart_total_minor, validate_cart,
};
pub use money::{CurrencyCode, Money, MoneyError};
pub use status::*;
