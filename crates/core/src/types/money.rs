//! Type-safe money representation using decimal arithmetic.
//!
//! Prices are entered and stored as decimals in the currency's standard unit
//! (dollars, not cents). Anything sent to the payment provider or summed into
//! a total is first converted to integer minor units with a single rounding
//! rule, so the same input always produces the same amount.

use core::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors converting between decimal and minor-unit amounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Amount is below zero.
    #[error("amount must not be negative")]
    Negative,
    /// Amount has more decimal places than the currency allows.
    #[error("amount has more than {0} decimal places")]
    TooPrecise(u32),
    /// Amount does not fit in a 64-bit minor-unit integer.
    #[error("amount is too large")]
    Overflow,
    /// Unknown currency code.
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),
}

/// ISO 4217 currency codes accepted at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Number of decimal places in the minor unit.
    #[must_use]
    pub const fn exponent(self) -> u32 {
        match self {
            Self::USD | Self::EUR | Self::GBP | Self::CAD | Self::AUD => 2,
        }
    }

    /// Upper-case ISO code, as stored.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }

    /// Lower-case ISO code, as the payment provider expects it.
    #[must_use]
    pub fn provider_code(self) -> String {
        self.code().to_ascii_lowercase()
    }

    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }

    /// Convert a decimal amount in the standard unit to minor units.
    ///
    /// Midpoints round away from zero.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Negative` for negative amounts and
    /// `MoneyError::Overflow` when the result does not fit in `i64`.
    pub fn to_minor_units(self, amount: Decimal) -> Result<i64, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        let scale = Decimal::from(10_i64.pow(self.exponent()));
        amount
            .checked_mul(scale)
            .ok_or(MoneyError::Overflow)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(MoneyError::Overflow)
    }

    /// Convert minor units back to a decimal amount in the standard unit.
    #[must_use]
    pub fn from_minor_units(self, minor: i64) -> Decimal {
        Decimal::new(minor, self.exponent())
    }

    /// Check that an amount has no more precision than the minor unit.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::TooPrecise` when the amount would need rounding.
    pub fn check_precision(self, amount: Decimal) -> Result<(), MoneyError> {
        if amount.normalize().scale() > self.exponent() {
            return Err(MoneyError::TooPrecise(self.exponent()));
        }
        Ok(())
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "CAD" => Ok(Self::CAD),
            "AUD" => Ok(Self::AUD),
            other => Err(MoneyError::UnsupportedCurrency(other.to_owned())),
        }
    }
}

/// An amount in integer minor units together with its currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    /// Amount in the smallest currency unit (e.g., cents for USD).
    pub minor: i64,
    /// ISO 4217 currency code.
    pub currency: CurrencyCode,
}

impl Money {
    /// Create an amount from minor units.
    #[must_use]
    pub const fn from_minor(minor: i64, currency: CurrencyCode) -> Self {
        Self { minor, currency }
    }

    /// Zero in the given currency.
    #[must_use]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self::from_minor(0, currency)
    }

    /// Amount in the standard unit.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.currency.from_minor_units(self.minor)
    }

    /// Format for display (e.g., "$19.99").
    #[must_use]
    pub fn display(&self) -> String {
        format!("{}{:.2}", self.currency.symbol(), self.amount())
    }
}
