//! Lifecycle states for orders, payments and custom orders.
//!
//! Statuses are stored as snake-case text and exchanged as snake-case JSON.
//! Every transition the service performs goes through `can_transition_to`,
//! so the rules here are the single source of truth for what may change.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A rejected status change or an unknown stored status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot move {kind} from {from} to {to}")]
    NotAllowed {
        kind: &'static str,
        from: &'static str,
        to: &'static str,
    },
    #[error("unknown {kind}: {value}")]
    Unknown { kind: &'static str, value: String },
}

macro_rules! text_status {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Stored and serialized form.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            /// Every variant, in lifecycle order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Validate a change to `next`.
            ///
            /// # Errors
            ///
            /// Returns `TransitionError::NotAllowed` when the lifecycle forbids it.
            pub fn transition_to(self, next: Self) -> Result<Self, TransitionError> {
                if self.can_transition_to(next) {
                    Ok(next)
                } else {
                    Err(TransitionError::NotAllowed {
                        kind: $kind,
                        from: self.as_str(),
                        to: next.as_str(),
                    })
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = TransitionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(TransitionError::Unknown {
                        kind: $kind,
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

/// Fulfillment status of a standard order.
///
/// `pending -> processing -> shipped -> delivered`, with `cancelled`
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

text_status!(OrderStatus, "order status", {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether the lifecycle allows moving to `next`. Staying put is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (a, b) if a as u8 == b as u8 => true,
            (from, Self::Cancelled) => !from.is_terminal(),
            (Self::Pending, Self::Processing | Self::Shipped)
            | (Self::Processing, Self::Shipped)
            | (Self::Shipped, Self::Delivered) => true,
            _ => false,
        }
    }
}

/// Payment status of a standard order, independent of fulfillment.
///
/// `paid` is monotonic: it may only move on to `refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

text_status!(PaymentStatus, "payment status", {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

impl PaymentStatus {
    /// Whether the lifecycle allows moving to `next`. Staying put is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (a, b) if a as u8 == b as u8 => true,
            (Self::Pending, Self::Paid | Self::Failed)
            | (Self::Failed, Self::Pending | Self::Paid)
            | (Self::Paid, Self::Refunded) => true,
            _ => false,
        }
    }

    /// Whether payment has been collected at some point.
    #[must_use]
    pub const fn has_settled(self) -> bool {
        matches!(self, Self::Paid | Self::Refunded)
    }
}

/// Lifecycle of a custom order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CustomOrderStatus {
    #[default]
    PendingQuote,
    AwaitingPayment,
    Paid,
}

text_status!(CustomOrderStatus, "custom order status", {
    PendingQuote => "pending_quote",
    AwaitingPayment => "awaiting_payment",
    Paid => "paid",
});

impl CustomOrderStatus {
    /// Whether the lifecycle allows moving to `next`.
    ///
    /// Re-quoting keeps an awaiting order in place; nothing leaves `paid`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::PendingQuote, Self::PendingQuote | Self::AwaitingPayment)
                | (Self::AwaitingPayment, Self::AwaitingPayment | Self::Paid)
                | (Self::Paid, Self::Paid)
        )
    }

    /// Whether an admin may (re-)set the price.
    #[must_use]
    pub const fn accepts_quote(self) -> bool {
        matches!(self, Self::PendingQuote | Self::AwaitingPayment)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_order_status_happy_path() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn test_order_status_cancel_and_terminal() {
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn test_payment_paid_never_reverts() {
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Failed));
        assert!(PaymentStatus::Paid.can_transition_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Refunded.can_transition_to(PaymentStatus::Paid));
    }

    #[test]
    fn test_custom_order_lifecycle() {
        assert!(CustomOrderStatus::PendingQuote.can_transition_to(CustomOrderStatus::AwaitingPayment));
        assert!(!CustomOrderStatus::PendingQuote.can_transition_to(CustomOrderStatus::Paid));
        assert!(CustomOrderStatus::AwaitingPayment.accepts_quote());
        assert!(!CustomOrderStatus::Paid.accepts_quote());
        assert!(!CustomOrderStatus::Paid.can_transition_to(CustomOrderStatus::AwaitingPayment));
    }

    #[test]
    fn test_text_round_trip_and_errors() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), *status);
        }
        assert_eq!(
            "awaiting_payment".parse::<CustomOrderStatus>().unwrap(),
            CustomOrderStatus::AwaitingPayment
        );
        assert!("PAID".parse::<PaymentStatus>().is_err());
        let err = PaymentStatus::Paid
            .transition_to(PaymentStatus::Pending)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot move payment status from paid to pending");
    }

    #[test]
    fn test_serde_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&CustomOrderStatus::PendingQuote).unwrap(),
            r#""pending_quote""#
        );
    }

    fn arb_payment() -> impl Strategy<Value = PaymentStatus> {
        proptest::sample::select(PaymentStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_paid_is_monotonic(attempts in proptest::collection::vec(arb_payment(), 0..32)) {
            let mut current = PaymentStatus::Paid;
            for next in attempts {
                if let Ok(moved) = current.transition_to(next) {
                    current = moved;
                }
                prop_assert!(current.has_settled());
            }
        }
    }
}
