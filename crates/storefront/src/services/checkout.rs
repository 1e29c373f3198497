//! Checkout session creation.
//!
//! Cart checkout mirrors the submitted cart onto a hosted checkout session
//! and records a pending order keyed by the provider session id. Custom
//! order checkout charges the quoted price as one synthetic line. In both
//! cases the [`CheckoutIntent`] travels in the session metadata so the
//! webhook can settle without another round-trip to the customer.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::instrument;

use atelier_core::{
    CheckoutIntent, CurrencyCode, CustomOrderStatus, CustomerContact, CustomerId, Email,
    FriendlyId, IntentError, LineItem, LineItemError, Money, OrderId, OrderNumber,
    cart_total_minor, validate_cart,
};

use crate::config::StorefrontConfig;
use crate::db::{CustomOrderRepository, OrderRepository, RepositoryError, Stores};
use crate::models::NewOrder;
use crate::payments::{
    CheckoutSession, CheckoutSessionRequest, CompletedSession, PaymentError, PaymentProvider,
    SessionLineItem,
};
use crate::services::webhook::WebhookReconciler;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("failed to encode checkout metadata: {0}")]
    Intent(#[from] IntentError),
}

impl From<LineItemError> for CheckoutError {
    fn from(err: LineItemError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// A cart submitted for checkout.
#[derive(Debug, Clone)]
pub struct CartCheckout {
    pub contact: CustomerContact,
    pub line_items: Vec<LineItem>,
    /// Signed-in customer, if any.
    pub customer_id: Option<CustomerId>,
}

/// Where to send the customer next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRedirect {
    pub session_id: String,
    pub url: String,
    /// Order number or friendly id.
    pub reference: String,
    pub total: Money,
}

/// Builds hosted checkout sessions.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    provider: Arc<dyn PaymentProvider>,
    orders: Arc<dyn OrderRepository>,
    custom_orders: Arc<dyn CustomOrderRepository>,
    reconciler: WebhookReconciler,
    currency: CurrencyCode,
    shipping_countries: Vec<String>,
    success_url: String,
    cancel_url: String,
}

impl CheckoutOrchestrator {
    #[must_use]
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        stores: &Stores,
        reconciler: WebhookReconciler,
        config: &StorefrontConfig,
    ) -> Self {
        Self {
            provider,
            orders: Arc::clone(&stores.orders),
            custom_orders: Arc::clone(&stores.custom_orders),
            reconciler,
            currency: config.payment.currency,
            shipping_countries: config.payment.shipping_countries.clone(),
            success_url: config.url("/checkout/success?session_id={CHECKOUT_SESSION_ID}"),
            cancel_url: config.url("/checkout/cancel"),
        }
    }

    /// Open a checkout session for a cart.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` for an invalid cart or contact,
    /// `CheckoutError::Payment` if the provider rejected the session and
    /// `CheckoutError::Repository` if the pending order could not be stored.
    #[instrument(skip_all, fields(items = cart.line_items.len()))]
    pub async fn checkout_cart(&self, cart: CartCheckout) -> Result<CheckoutRedirect, CheckoutError> {
        let contact = cart
            .contact
            .normalized()
            .map_err(|msg| CheckoutError::Validation(msg.to_owned()))?;
        validate_cart(&cart.line_items, self.currency)?;
        let total_minor = cart_total_minor(&cart.line_items, self.currency)?;

        let now = Utc::now();
        let order_number = OrderNumber::generate(now, &mut rand::rng());

        let line_items = cart
            .line_items
            .iter()
            .map(|item| {
                Ok(SessionLineItem {
                    name: item.name.trim().to_owned(),
                    unit_amount_minor: item
                        .unit_minor(self.currency)
                        .map_err(|e| CheckoutError::Validation(e.to_string()))?,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, CheckoutError>>()?;

        let intent = CheckoutIntent::Cart {
            order_number: order_number.clone(),
            contact: contact.clone(),
            line_items: cart.line_items.clone(),
        };
        let request = CheckoutSessionRequest {
            idempotency_key: order_number.to_string(),
            currency: self.currency.provider_code(),
            line_items,
            customer_email: Some(contact.email.to_string()),
            metadata: intent.to_metadata()?,
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            shipping_countries: self.shipping_countries.clone(),
        };

        let session = self.provider.create_checkout_session(&request).await?;

        let order = self
            .orders
            .insert_for_session(&NewOrder {
                id: OrderId::generate(),
                order_number: order_number.clone(),
                contact,
                customer_id: cart.customer_id,
                line_items: cart.line_items,
                currency: self.currency,
                subtotal_minor: total_minor,
                shipping_minor: 0,
                tax_minor: 0,
                total_minor,
                provider_session_id: session.id.clone(),
            })
            .await?;

        tracing::info!(
            order_number = %order.order_number,
            session_id = %session.id,
            provider = self.provider.name(),
            total = %order.total().display(),
            "Checkout session created"
        );

        self.settle_if_immediate(&session, &request).await;

        Ok(CheckoutRedirect {
            session_id: session.id,
            url: session.url,
            reference: order_number.to_string(),
            total: Money::from_minor(total_minor, self.currency),
        })
    }

    /// Open a checkout session for a quoted custom order.
    ///
    /// The email must match the one the order was submitted with.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` if no such order exists for this
    /// email, `CheckoutError::Precondition` if it has not been quoted or is
    /// already paid, and `CheckoutError::Payment` if the provider failed.
    #[instrument(skip(self, email), fields(%friendly_id))]
    pub async fn checkout_custom_order(
        &self,
        friendly_id: &FriendlyId,
        email: &Email,
    ) -> Result<CheckoutRedirect, CheckoutError> {
        let order = self
            .custom_orders
            .find_by_friendly_id(friendly_id)
            .await?
            .filter(|order| order.contact.email == *email)
            .ok_or(CheckoutError::NotFound("custom order"))?;

        let Some(price) = order.price else {
            return Err(CheckoutError::Precondition(
                "custom order has not been quoted yet".to_owned(),
            ));
        };
        if order.status != CustomOrderStatus::AwaitingPayment {
            return Err(CheckoutError::Precondition(format!(
                "custom order is {}",
                order.status
            )));
        }

        let amount_minor = order
            .currency
            .to_minor_units(price)
            .map_err(|e| CheckoutError::Validation(e.to_string()))?;

        let intent = CheckoutIntent::CustomOrder {
            custom_order_id: order.id,
            friendly_id: order.friendly_id.clone(),
        };
        let request = CheckoutSessionRequest {
            // A re-quote must not reuse the session opened for the old price.
            idempotency_key: format!("{}-{amount_minor}", order.friendly_id),
            currency: order.currency.provider_code(),
            line_items: vec![SessionLineItem {
                name: format!(
                    "Custom {} commission {} ({})",
                    order.order_type.as_str(),
                    order.friendly_id,
                    order.material
                ),
                unit_amount_minor: amount_minor,
                quantity: 1,
            }],
            customer_email: Some(order.contact.email.to_string()),
            metadata: intent.to_metadata()?,
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            shipping_countries: self.shipping_countries.clone(),
        };

        let session = self.provider.create_checkout_session(&request).await?;

        if self
            .custom_orders
            .attach_session(order.id, &session.id, Utc::now())
            .await?
            .is_none()
        {
            // Paid between the read above and now.
            return Err(CheckoutError::Precondition(
                "custom order is no longer awaiting payment".to_owned(),
            ));
        }

        tracing::info!(
            friendly_id = %order.friendly_id,
            session_id = %session.id,
            provider = self.provider.name(),
            "Custom order checkout session created"
        );

        self.settle_if_immediate(&session, &request).await;

        Ok(CheckoutRedirect {
            session_id: session.id,
            url: session.url,
            reference: order.friendly_id.to_string(),
            total: Money::from_minor(amount_minor, order.currency),
        })
    }

    /// Settle sessions from providers that never send a webhook.
    ///
    /// Failures are logged; the order stays pending and can be settled by
    /// an admin.
    async fn settle_if_immediate(&self, session: &CheckoutSession, request: &CheckoutSessionRequest) {
        if !self.provider.settles_immediately() {
            return;
        }
        let completed = CompletedSession {
            id: session.id.clone(),
            payment_status: Some("paid".to_owned()),
            metadata: request.metadata.clone(),
            currency: Some(request.currency.clone()),
            amount_subtotal: request.total_minor(),
            amount_total: request.total_minor(),
            ..CompletedSession::default()
        };
        if let Err(e) = self.reconciler.settle(&completed, Utc::now()).await {
            tracing::error!(error = %e, session_id = %session.id, "Failed to settle simulated session");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use tokio::sync::Mutex;

    use atelier_core::{PaymentStatus, ProductId};

    use super::*;
    use crate::models::{CustomOrderType, NewCustomOrder};
    use crate::payments::{SimulatedProvider, WebhookVerifier};
    use crate::services::notifications::Outbox;

    #[derive(Default)]
    struct RecordingProvider {
        requests: Mutex<Vec<CheckoutSessionRequest>>,
    }

    #[async_trait]
    impl PaymentProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn create_checkout_session(
            &self,
            request: &CheckoutSessionRequest,
        ) -> Result<CheckoutSession, PaymentError> {
            let mut requests = self.requests.lock().await;
            requests.push(request.clone());
            Ok(CheckoutSession {
                id: format!("cs_test_{}", requests.len()),
                url: "https://pay.example/session".to_owned(),
            })
        }
    }

    fn orchestrator(provider: Arc<dyn PaymentProvider>, stores: &Stores) -> CheckoutOrchestrator {
        let config = StorefrontConfig::new("https://shop.example");
        let reconciler = WebhookReconciler::new(
            WebhookVerifier::new(None, Duration::from_secs(300)),
            stores,
            Outbox::new(Arc::clone(&stores.outbox)),
            CurrencyCode::USD,
        );
        CheckoutOrchestrator::new(provider, stores, reconciler, &config)
    }

    fn contact() -> CustomerContact {
        CustomerContact {
            email: Email::parse("ada@shop.example").unwrap(),
            name: "  Ada ".to_owned(),
            phone: None,
        }
    }

    fn cart(ring: ProductId, chain: ProductId) -> CartCheckout {
        CartCheckout {
            contact: contact(),
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
            customer_id: None,
        }
    }

    #[tokio::test]
    async fn test_cart_checkout_mirrors_cart() {
        let stores = Stores::in_memory();
        let provider = Arc::new(RecordingProvider::default());
        let checkout = orchestrator(provider.clone(), &stores);

        let redirect = checkout
            .checkout_cart(cart(ProductId::generate(), ProductId::generate()))
            .await
            .unwrap();
        assert_eq!(redirect.total.minor, 24000);
        assert_eq!(redirect.url, "https://pay.example/session");

        let requests = provider.requests.lock().await;
        let request = requests.first().unwrap();
        assert_eq!(request.total_minor(), Some(24000));
        assert_eq!(request.currency, "usd");
        assert_eq!(request.idempotency_key, redirect.reference);
        assert!(matches!(
            CheckoutIntent::from_metadata(&request.metadata).unwrap(),
            CheckoutIntent::Cart { .. }
        ));

        let order = stores
            .orders
            .find_by_session(&redirect.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.contact.name, "Ada");
        assert_eq!(order.total_minor, 24000);
    }

    #[tokio::test]
    async fn test_cart_checkout_rejects_invalid_cart() {
        let stores = Stores::in_memory();
        let provider = Arc::new(RecordingProvider::default());
        let checkout = orchestrator(provider.clone(), &stores);

        let mut bad = cart(ProductId::generate(), ProductId::generate());
        bad.line_items.push(LineItem {
            product_id: None,
            name: "Free".to_owned(),
            unit_price: Decimal::ONE,
            quantity: 0,
        });
        let err = checkout.checkout_cart(bad).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
        assert!(provider.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_simulated_checkout_settles_and_decrements() {
        let stores = Stores::in_memory();
        let ring = ProductId::generate();
        let chain = ProductId::generate();
        stores.stock.set_level(ring, "Ring", 3).await.unwrap();
        stores.stock.set_level(chain, "Chain", 3).await.unwrap();
        let checkout = orchestrator(Arc::new(SimulatedProvider::new("https://shop.example")), &stores);

        let redirect = checkout.checkout_cart(cart(ring, chain)).await.unwrap();
        let order = stores
            .orders
            .find_by_session(&redirect.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(stores.stock.level(ring).await.unwrap(), Some(2));
        assert_eq!(stores.stock.level(chain).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_custom_order_requires_quote() {
        let stores = Stores::in_memory();
        let provider = Arc::new(RecordingProvider::default());
        let checkout = orchestrator(provider.clone(), &stores);

        let friendly_id = FriendlyId::parse("CO-ABCDEF").unwrap();
        let created = stores
            .custom_orders
            .insert(
                &NewCustomOrder {
                    id: atelier_core::CustomOrderId::generate(),
                    friendly_id: friendly_id.clone(),
                    contact: contact(),
                    order_type: CustomOrderType::Scratch,
                    material: "gold".to_owned(),
                    description: "A signet ring".to_owned(),
                    reference_images: vec![],
                    currency: CurrencyCode::USD,
                },
                Utc::now(),
            )
            .await
            .unwrap();
        let email = created.contact.email.clone();

        let err = checkout
            .checkout_custom_order(&friendly_id, &email)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Precondition(_)));

        let stranger = Email::parse("eve@shop.example").unwrap();
        let err = checkout
            .checkout_custom_order(&friendly_id, &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound(_)));

        stores
            .custom_orders
            .set_quote(
                created.id,
                Decimal::new(200, 0),
                CurrencyCode::USD,
                CustomOrderStatus::PendingQuote,
                Utc::now(),
            )
            .await
            .unwrap()
            .unwrap();

        let redirect = checkout
            .checkout_custom_order(&friendly_id, &email)
            .await
            .unwrap();
        assert_eq!(redirect.total.minor, 20000);
        let stored = stores.custom_orders.get(created.id).await.unwrap().unwrap();
        assert_eq!(stored.provider_session_id.as_deref(), Some(redirect.session_id.as_str()));
        assert_eq!(provider.requests.lock().await.first().unwrap().line_items.len(), 1);
    }
}
