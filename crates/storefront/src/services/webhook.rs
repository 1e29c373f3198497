//! Payment webhook reconciliation.
//!
//! Providers deliver events at least once, possibly concurrently and out of
//! order. Reconciliation is therefore idempotent at two levels:
//!
//! - processed event ids short-circuit plain redeliveries;
//! - the authoritative guard is the conditional `mark_paid` transition on
//!   the order itself, plus the stock ledger's per-(order, product) record.
//!
//! Payment confirmation is never rolled back by something downstream of it.
//! Stock failures are logged per line and notifications go through the
//! outbox.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

use atelier_core::{
    CheckoutIntent, CurrencyCode, CustomOrderId, CustomerContact, FriendlyId, LineItem, OrderId,
    OrderNumber, ProductId, cart_total_minor,
};

use crate::db::{
    CustomOrderRepository, DecrementOutcome, OrderRepository, RepositoryError, StockDecrement,
    StockLedger, Stores, WebhookEventStore,
};
use crate::models::{NewOrder, Notification, Order};
use crate::payments::events::{
    ASYNC_PAYMENT_FAILED, ASYNC_PAYMENT_SUCCEEDED, CHECKOUT_COMPLETED, CHECKOUT_EXPIRED,
};
use crate::payments::{CompletedSession, EventError, ProviderEvent, SignatureError, WebhookVerifier};
use crate::services::notifications::Outbox;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid signature: {0}")]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Payload(#[from] EventError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// What happened to a delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event was applied (or found to be already applied).
    Processed,
    /// The event id was seen before.
    Duplicate,
    /// Not an event this service acts on.
    Ignored,
}

/// Result of settling a paid session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// This call moved the order to paid.
    Paid(SettledOrder),
    /// The order was already paid.
    AlreadyPaid(SettledOrder),
    /// The metadata did not describe anything payable.
    Unrecognized,
}

/// Which order a session settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettledOrder {
    Cart { id: OrderId, order_number: OrderNumber },
    Custom { id: CustomOrderId, friendly_id: FriendlyId },
}

/// Consumes provider events and drives orders and stock.
#[derive(Clone)]
pub struct WebhookReconciler {
    verifier: WebhookVerifier,
    orders: Arc<dyn OrderRepository>,
    custom_orders: Arc<dyn CustomOrderRepository>,
    stock: Arc<dyn StockLedger>,
    events: Arc<dyn WebhookEventStore>,
    outbox: Outbox,
    default_currency: CurrencyCode,
}

impl WebhookReconciler {
    #[must_use]
    pub fn new(
        verifier: WebhookVerifier,
        stores: &Stores,
        outbox: Outbox,
        default_currency: CurrencyCode,
    ) -> Self {
        Self {
            verifier,
            orders: Arc::clone(&stores.orders),
            custom_orders: Arc::clone(&stores.custom_orders),
            stock: Arc::clone(&stores.stock),
            events: Arc::clone(&stores.webhook_events),
            outbox,
            default_currency,
        }
    }

    /// Verify and apply one webhook delivery.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Signature` before touching any state if the
    /// signature does not verify, `WebhookError::Payload` if the verified
    /// body is not an event, and `WebhookError::Repository` if storage
    /// failed (the provider should retry).
    #[instrument(skip_all, fields(event_id = tracing::field::Empty))]
    pub async fn handle(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        let now = Utc::now();
        self.verifier.verify(signature, body, now)?;
        let event = ProviderEvent::parse(body)?;

        tracing::Span::current().record("event_id", event.id.as_str());
        tracing::info!(event_id = %event.id, event_type = %event.event_type, "Webhook received");

        if self.events.is_processed(&event.id).await? {
            tracing::info!(event_id = %event.id, "Duplicate webhook event, skipping");
            return Ok(WebhookOutcome::Duplicate);
        }

        let outcome = match event.event_type.as_str() {
            CHECKOUT_COMPLETED | ASYNC_PAYMENT_SUCCEEDED => {
                let session = event.checkout_session()?;
                if session.is_paid() {
                    self.settle(&session, now).await?;
                } else {
                    tracing::info!(session_id = %session.id, "Checkout completed, payment still pending");
                }
                WebhookOutcome::Processed
            }
            ASYNC_PAYMENT_FAILED => {
                let session = event.checkout_session()?;
                match self.orders.mark_payment_failed(&session.id, now).await? {
                    Some(order) => tracing::warn!(
                        order_number = %order.order_number,
                        "Asynchronous payment failed"
                    ),
                    None => tracing::info!(session_id = %session.id, "Payment failure ignored, no pending order"),
                }
                WebhookOutcome::Processed
            }
            CHECKOUT_EXPIRED => {
                let session = event.checkout_session()?;
                if let Some(order) = self.orders.cancel_unpaid(&session.id, now).await? {
                    tracing::info!(order_number = %order.order_number, "Cancelled order for expired session");
                }
                WebhookOutcome::Processed
            }
            other => {
                tracing::debug!(event_type = %other, "Ignoring webhook event type");
                WebhookOutcome::Ignored
            }
        };

        self.events.record(&event.id, &event.event_type, now).await?;
        Ok(outcome)
    }

    /// Apply a paid checkout session.
    ///
    /// Safe to call any number of times for the same session.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the order could not be read or updated.
    #[instrument(skip(self, session, now), fields(session_id = %session.id))]
    pub async fn settle(
        &self,
        session: &CompletedSession,
        now: DateTime<Utc>,
    ) -> Result<Settlement, RepositoryError> {
        let intent = match CheckoutIntent::from_metadata(&session.metadata) {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(error = %e, "Paid session has unusable metadata, ignoring");
                return Ok(Settlement::Unrecognized);
            }
        };

        match intent {
            CheckoutIntent::Cart {
                order_number,
                contact,
                line_items,
            } => {
                self.settle_cart(session, order_number, contact, line_items, now)
                    .await
            }
            CheckoutIntent::CustomOrder {
                custom_order_id,
                friendly_id,
            } => {
                self.settle_custom_order(session, custom_order_id, friendly_id, now)
                    .await
            }
        }
    }

    async fn settle_cart(
        &self,
        session: &CompletedSession,
        order_number: OrderNumber,
        contact: CustomerContact,
        line_items: Vec<LineItem>,
        now: DateTime<Utc>,
    ) -> Result<Settlement, RepositoryError> {
        // Recreate the order from metadata if the pending insert never landed.
        if self.orders.find_by_session(&session.id).await?.is_none() {
            let currency = session.currency().unwrap_or(self.default_currency);
            let subtotal = cart_total_minor(&line_items, currency).unwrap_or(0);
            let new_order = NewOrder {
                id: OrderId::generate(),
                order_number,
                contact,
                customer_id: None,
                line_items,
                currency,
                subtotal_minor: subtotal,
                shipping_minor: 0,
                tax_minor: 0,
                total_minor: subtotal,
                provider_session_id: session.id.clone(),
            };
            let order = self.orders.insert_for_session(&new_order).await?;
            tracing::warn!(order_number = %order.order_number, "Created missing order from webhook metadata");
        }

        let won = self
            .orders
            .mark_paid(&session.id, &session.settlement(), now)
            .await?;
        let (order, first) = match won {
            Some(order) => (order, true),
            None => (
                self.orders
                    .find_by_session(&session.id)
                    .await?
                    .ok_or(RepositoryError::NotFound)?,
                false,
            ),
        };

        // Ledger records make this a no-op for lines already applied.
        self.decrement_stock(&order).await;

        let settled = SettledOrder::Cart {
            id: order.id,
            order_number: order.order_number.clone(),
        };
        if !first {
            tracing::info!(order_number = %order.order_number, "Order already paid, nothing to do");
            return Ok(Settlement::AlreadyPaid(settled));
        }

        tracing::info!(
            order_number = %order.order_number,
            total = %order.total().display(),
            "Order paid"
        );
        self.outbox
            .enqueue(Notification::OrderConfirmation {
                order_id: order.id,
                order_number: order.order_number.clone(),
                email: order.contact.email.clone(),
                name: order.contact.name.clone(),
                total_minor: order.total_minor,
                currency: order.currency,
            })
            .await;
        self.outbox
            .enqueue(Notification::AdminNewOrder {
                reference: order.order_number.to_string(),
                customer_email: order.contact.email.clone(),
                total_minor: order.total_minor,
                currency: order.currency,
            })
            .await;

        Ok(Settlement::Paid(settled))
    }

    async fn settle_custom_order(
        &self,
        session: &CompletedSession,
        id: CustomOrderId,
        friendly_id: FriendlyId,
        now: DateTime<Utc>,
    ) -> Result<Settlement, RepositoryError> {
        let address = session.shipping_address();
        let settled = SettledOrder::Custom {
            id,
            friendly_id: friendly_id.clone(),
        };

        let Some(order) = self
            .custom_orders
            .mark_paid(id, &session.id, address.as_ref(), now)
            .await?
        else {
            match self.custom_orders.get(id).await? {
                Some(existing) => {
                    tracing::info!(
                        %friendly_id,
                        status = %existing.status,
                        "Custom order not awaiting payment, nothing to do"
                    );
                    return Ok(Settlement::AlreadyPaid(settled));
                }
                None => {
                    tracing::warn!(%friendly_id, "Paid session for unknown custom order");
                    return Ok(Settlement::Unrecognized);
                }
            }
        };

        tracing::info!(%friendly_id, "Custom order paid");
        self.outbox
            .enqueue(Notification::CustomOrderPaid {
                custom_order_id: order.id,
                friendly_id: order.friendly_id.clone(),
                email: order.contact.email.clone(),
                name: order.contact.name.clone(),
            })
            .await;

        let total_minor = order
            .price
            .and_then(|price| order.currency.to_minor_units(price).ok())
            .or(session.amount_total)
            .unwrap_or(0);
        self.outbox
            .enqueue(Notification::AdminNewOrder {
                reference: order.friendly_id.to_string(),
                customer_email: order.contact.email.clone(),
                total_minor,
                currency: order.currency,
            })
            .await;

        Ok(Settlement::Paid(settled))
    }

    /// Decrement stock for every product on the order.
    ///
    /// Failures are logged per product and never abort the others.
    async fn decrement_stock(&self, order: &Order) {
        for (product_id, quantity) in quantities_by_product(&order.line_items) {
            let decrement = StockDecrement {
                order_id: order.id,
                product_id,
                quantity,
            };
            match self.stock.decrement(&decrement).await {
                Ok(DecrementOutcome::Applied {
                    previous,
                    remaining,
                    clamped,
                }) => {
                    if clamped {
                        tracing::warn!(
                            order_number = %order.order_number,
                            %product_id,
                            requested = quantity,
                            previous,
                            "Oversold: stock clamped at zero"
                        );
                    } else {
                        tracing::debug!(%product_id, previous, remaining, "Stock decremented");
                    }
                }
                Ok(DecrementOutcome::AlreadyApplied) => {
                    tracing::debug!(%product_id, "Stock already decremented for this order");
                }
                Ok(DecrementOutcome::UnknownProduct) => {
                    tracing::warn!(%product_id, "Paid line item references unknown product");
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        order_number = %order.order_number,
                        %product_id,
                        "Stock decrement failed"
                    );
                }
            }
        }
    }
}

/// Total quantity per product. Lines without a product are not stocked.
fn quantities_by_product(items: &[LineItem]) -> BTreeMap<ProductId, u32> {
    let mut quantities = BTreeMap::new();
    for item in items {
        if let Some(product_id) = item.product_id {
            let total: &mut u32 = quantities.entry(product_id).or_default();
            *total = total.saturating_add(item.quantity);
        }
    }
    quantities
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use atelier_core::Email;
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    use super::*;
    use crate::payments::signature::sign;

    const SECRET: &str = "whsec_reconciler_test_1234";

    struct Fixture {
        stores: Stores,
        reconciler: WebhookReconciler,
        ring: ProductId,
        chain: ProductId,
    }

    async fn fixture() -> Fixture {
        let stores = Stores::in_memory();
        let ring = ProductId::generate();
        let chain = ProductId::generate();
        stores.stock.set_level(ring, "Ring", 5).await.unwrap();
        stores.stock.set_level(chain, "Chain", 5).await.unwrap();

        let verifier = WebhookVerifier::new(
            Some(SecretString::from(SECRET)),
            Duration::from_secs(300),
        );
        let reconciler = WebhookReconciler::new(
            verifier,
            &stores,
            Outbox::new(Arc::clone(&stores.outbox)),
            CurrencyCode::USD,
        );
        Fixture {
            stores,
            reconciler,
            ring,
            chain,
        }
    }

    fn cart_metadata(ring: ProductId, chain: ProductId) -> BTreeMap<String, String> {
        CheckoutIntent::Cart {
            order_number: OrderNumber::from_string("ORD-20261016-ABCDEF".to_owned()),
            contact: CustomerContact {
                email: Email::parse("ada@shop.example").unwrap(),
                name: "Ada".to_owned(),
                phone: None,
            },
            line_items: vec![
                LineItem {
                    product_id: Some(ring),
                    name: "Ring".to_owned(),
                    unit_price: Decimal::new(15000, 2),
                    quantity: 1,
                },
                LineItem {
                    product_id: Some(chain),
                    name: "Chain".to_owned(),
                    unit_price: Decimal::new(4500, 2),
                    quantity: 2,
                },
            ],
        }
        .to_metadata()
        .unwrap()
    }

    fn signed_event(event_id: &str, event_type: &str, object: &serde_json::Value) -> (String, Vec<u8>) {
        let body = serde_json::json!({
            "id": event_id,
            "type": event_type,
            "data": {"object": object},
        })
        .to_string()
        .into_bytes();
        (sign(SECRET, Utc::now().timestamp(), &body), body)
    }

    #[tokio::test]
    async fn test_completed_event_settles_once() {
        let f = fixture().await;
        let object = serde_json::json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "currency": "usd",
            "amount_total": 24000,
            "metadata": cart_metadata(f.ring, f.chain),
        });
        let (header, body) = signed_event("evt_1", CHECKOUT_COMPLETED, &object);

        let outcome = f.reconciler.handle(Some(&header), &body).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);

        let order = f.stores.orders.find_by_session("cs_test_1").await.unwrap().unwrap();
        assert_eq!(order.total_minor, 24000);
        assert!(order.payment_status.has_settled());
        assert_eq!(f.stores.stock.level(f.ring).await.unwrap(), Some(4));
        assert_eq!(f.stores.stock.level(f.chain).await.unwrap(), Some(3));

        // Same event again.
        let outcome = f.reconciler.handle(Some(&header), &body).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Duplicate);

        // Same session under a new event id.
        let (header, body) = signed_event("evt_2", CHECKOUT_COMPLETED, &object);
        f.reconciler.handle(Some(&header), &body).await.unwrap();
        assert_eq!(f.stores.stock.level(f.ring).await.unwrap(), Some(4));
        assert_eq!(f.stores.stock.level(f.chain).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_bad_signature_mutates_nothing() {
        let f = fixture().await;
        let object = serde_json::json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "metadata": cart_metadata(f.ring, f.chain),
        });
        let (_, body) = signed_event("evt_1", CHECKOUT_COMPLETED, &object);
        let forged = sign("whsec_forged", Utc::now().timestamp(), &body);

        let err = f.reconciler.handle(Some(&forged), &body).await.unwrap_err();
        assert!(matches!(err, WebhookError::Signature(SignatureError::Mismatch)));
        assert!(f.stores.orders.find_by_session("cs_test_1").await.unwrap().is_none());
        assert!(!f.stores.webhook_events.is_processed("evt_1").await.unwrap());
        assert_eq!(f.stores.stock.level(f.ring).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_unknown_product_does_not_block_payment() {
        let f = fixture().await;
        let missing = ProductId::generate();
        let object = serde_json::json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "metadata": cart_metadata(missing, f.chain),
        });
        let (header, body) = signed_event("evt_1", CHECKOUT_COMPLETED, &object);
        f.reconciler.handle(Some(&header), &body).await.unwrap();

        let order = f.stores.orders.find_by_session("cs_test_1").await.unwrap().unwrap();
        assert!(order.payment_status.has_settled());
        assert_eq!(f.stores.stock.level(f.chain).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_expired_session_cancels_pending_order() {
        let f = fixture().await;
        let metadata = cart_metadata(f.ring, f.chain);
        let CheckoutIntent::Cart {
            order_number,
            contact,
            line_items,
        } = CheckoutIntent::from_metadata(&metadata).unwrap()
        else {
            unreachable!()
        };
        f.stores
            .orders
            .insert_for_session(&NewOrder {
                id: OrderId::generate(),
                order_number,
                contact,
                customer_id: None,
                line_items,
                currency: CurrencyCode::USD,
                subtotal_minor: 24000,
                shipping_minor: 0,
                tax_minor: 0,
                total_minor: 24000,
                provider_session_id: "cs_test_9".to_owned(),
            })
            .await
            .unwrap();

        let (header, body) =
            signed_event("evt_9", CHECKOUT_EXPIRED, &serde_json::json!({"id": "cs_test_9"}));
        f.reconciler.handle(Some(&header), &body).await.unwrap();

        let order = f.stores.orders.find_by_session("cs_test_9").await.unwrap().unwrap();
        assert_eq!(order.status, atelier_core::OrderStatus::Cancelled);
        assert_eq!(f.stores.stock.level(f.ring).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_unhandled_event_type_is_acknowledged() {
        let f = fixture().await;
        let (header, body) =
            signed_event("evt_3", "customer.created", &serde_json::json!({"id": "cus_1"}));
        let outcome = f.reconciler.handle(Some(&header), &body).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);
    }

    #[test]
    fn test_quantities_by_product_aggregates() {
        let product = ProductId::generate();
        let line = |quantity| LineItem {
            product_id: Some(product),
            name: "Ring".to_owned(),
            unit_price: Decimal::ONE,
            quantity,
        };
        let unstocked = LineItem {
            product_id: None,
            ..line(7)
        };
        let quantities = quantities_by_product(&[line(1), line(2), unstocked]);
        assert_eq!(quantities.get(&product), Some(&3));
        assert_eq!(quantities.len(), 1);
    }
}
