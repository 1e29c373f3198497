//! Newtype IDs for type-safe entity references.
//!
//! Internal identities are UUIDs minted by the service. Customers see the
//! human-readable [`OrderNumber`] and [`FriendlyId`] instead.

use core::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to define a type-safe UUID wrapper.
///
/// Creates a newtype wrapper around [`Uuid`] with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `Display`, `FromStr`
/// - `generate()` for a fresh v4 identity and `as_uuid()` for the inner value
/// - `sqlx` `Type`, `Encode`, and `Decode` implementations (with `postgres` feature)
///
/// # Example
///
/// ```rust
/// # use atelier_core::define_id;
/// define_id!(InvoiceId);
/// define_id!(ShipmentId);
///
/// let invoice = InvoiceId::generate();
/// let parsed: InvoiceId = invoice.to_string().parse().unwrap();
/// assert_eq!(invoice, parsed);
///
/// // These are different types, so this won't compile:
/// // let _: ShipmentId = invoice;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            /// Mint a new random identity.
            #[must_use]
            pub fn generate() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: ::uuid::Uuid) -> Self {
                Self(id)
            }

            /// Get the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> ::uuid::Uuid {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                ::uuid::Uuid::parse_str(s).map(Self)
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <::uuid::Uuid as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <::uuid::Uuid as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let id = <::uuid::Uuid as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(id))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <::uuid::Uuid as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

define_id!(OrderId);
define_id!(CustomOrderId);
define_id!(ProductId);
define_id!(AdminUserId);
define_id!(CustomerId);
define_id!(OutboxTaskId);

/// Alphabet for human-facing codes: no 0/O or 1/I/L lookalikes.
const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Length of the random suffix in order numbers and friendly ids.
const CODE_LENGTH: usize = 6;

fn random_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET.get(idx).copied().map_or('X', char::from)
        })
        .collect()
}

/// Human-readable order number, e.g. `ORD-20261016-7F3K2Q`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generate an order number stamped with the given date.
    #[must_use]
    pub fn generate<R: Rng + ?Sized>(at: DateTime<Utc>, rng: &mut R) -> Self {
        Self(format!("ORD-{}-{}", at.format("%Y%m%d"), random_code(rng)))
    }

    /// Wrap a stored order number.
    #[must_use]
    pub const fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the order number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Customer-facing identifier for a custom order, e.g. `CO-9XK4TR`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FriendlyId(String);

impl FriendlyId {
    /// Prefix shared by every friendly id.
    pub const PREFIX: &'static str = "CO-";

    /// Generate a new friendly id.
    #[must_use]
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(format!("{}{}", Self::PREFIX, random_code(rng)))
    }

    /// Parse user input into a friendly id.
    ///
    /// Input is trimmed and upper-cased; returns `None` when it does not
    /// have the `CO-` prefix and a code from the friendly alphabet.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let normalized = input.trim().to_ascii_uppercase();
        let code = normalized.strip_prefix(Self::PREFIX)?;
        let valid = code.len() == CODE_LENGTH && code.bytes().all(|b| CODE_ALPHABET.contains(&b));
        valid.then_some(Self(normalized))
    }

    /// Wrap a stored friendly id.
    #[must_use]
    pub const fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the friendly id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FriendlyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_id_round_trips_through_display() {
        let id = OrderId::generate();
        let parsed: OrderId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_order_number_format() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let number = OrderNumber::generate(at, &mut rand::rng());
        assert!(number.as_str().starts_with("ORD-20261016-"));
        assert_eq!(number.as_str().len(), "ORD-20261016-".len() + CODE_LENGTH);
    }

    #[test]
    fn test_friendly_id_generate_parses_back() {
        let id = FriendlyId::generate(&mut rand::rng());
        assert_eq!(FriendlyId::parse(id.as_str()), Some(id.clone()));
        assert_eq!(
            FriendlyId::parse(&id.as_str().to_ascii_lowercase()),
            Some(id)
        );
    }

    #[test]
    fn test_friendly_id_rejects_garbage() {
        assert!(FriendlyId::parse("").is_none());
        assert!(FriendlyId::parse("CO-").is_none());
        assert!(FriendlyId::parse("CO-00000O").is_none());
        assert!(FriendlyId::parse("XX-ABCDEF").is_none());
        assert!(FriendlyId::parse("CO-ABCDEFG").is_none());
    }
}
