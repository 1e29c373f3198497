//! Custom order submission, lookup and quoting.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;

use atelier_core::{CurrencyCode, CustomOrderId, CustomerContact, Email, FriendlyId};

use crate::db::{CustomOrderRepository, RepositoryError};
use crate::models::{CustomOrder, CustomOrderType, NewCustomOrder, Notification};
use crate::services::notifications::Outbox;

const MAX_MATERIAL_LENGTH: usize = 120;
const MAX_DESCRIPTION_LENGTH: usize = 5000;
const MAX_REFERENCE_IMAGES: usize = 10;
const MAX_URL_LENGTH: usize = 2048;

/// Attempts at drawing an unused friendly id.
const FRIENDLY_ID_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum CustomOrderError {
    #[error("custom order not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Precondition(String),

    #[error("custom order was modified concurrently, reload and retry")]
    Conflict,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A customer's commission request.
#[derive(Debug, Clone)]
pub struct CustomOrderRequest {
    pub contact: CustomerContact,
    pub order_type: CustomOrderType,
    pub material: String,
    pub description: String,
    pub reference_images: Vec<String>,
}

#[derive(Clone)]
pub struct CustomOrderService {
    orders: Arc<dyn CustomOrderRepository>,
    outbox: Outbox,
    currency: CurrencyCode,
}

impl CustomOrderService {
    #[must_use]
    pub fn new(orders: Arc<dyn CustomOrderRepository>, outbox: Outbox, currency: CurrencyCode) -> Self {
        Self {
            orders,
            outbox,
            currency,
        }
    }

    /// Record a new request in `pending_quote`.
    ///
    /// # Errors
    ///
    /// Returns `CustomOrderError::Validation` for missing or oversized
    /// fields.
    #[instrument(skip_all, fields(order_type = %request.order_type))]
    pub async fn submit(&self, request: CustomOrderRequest) -> Result<CustomOrder, CustomOrderError> {
        let request = validate_request(request)?;
        let now = Utc::now();

        let mut attempt = 0;
        let order = loop {
            attempt += 1;
            let new_order = NewCustomOrder {
                id: CustomOrderId::generate(),
                friendly_id: FriendlyId::generate(&mut rand::rng()),
                contact: request.contact.clone(),
                order_type: request.order_type,
                material: request.material.clone(),
                description: request.description.clone(),
                reference_images: request.reference_images.clone(),
                currency: self.currency,
            };
            match self.orders.insert(&new_order, now).await {
                Ok(order) => break order,
                Err(RepositoryError::Conflict(_)) if attempt < FRIENDLY_ID_ATTEMPTS => {
                    tracing::debug!(attempt, "Friendly id collision, drawing another");
                }
                Err(e) => return Err(e.into()),
            }
        };

        tracing::info!(friendly_id = %order.friendly_id, "Custom order submitted");
        self.outbox
            .enqueue(Notification::CustomOrderReceived {
                custom_order_id: order.id,
                friendly_id: order.friendly_id.clone(),
                email: order.contact.email.clone(),
                name: order.contact.name.clone(),
            })
            .await;
        Ok(order)
    }

    /// Find an order by friendly id for the customer who submitted it.
    ///
    /// An email that does not match is reported as not found.
    ///
    /// # Errors
    ///
    /// Returns `CustomOrderError::NotFound` if there is no match.
    pub async fn lookup(&self, friendly_id: &FriendlyId, email: &Email) -> Result<CustomOrder, CustomOrderError> {
        self.orders
            .find_by_friendly_id(friendly_id)
            .await?
            .filter(|order| order.contact.email == *email)
            .ok_or(CustomOrderError::NotFound)
    }

    /// # Errors
    ///
    /// Returns `CustomOrderError::Repository` if the orders cannot be read.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<CustomOrder>, CustomOrderError> {
        Ok(self.orders.list(limit.clamp(1, 200), offset.max(0)).await?)
    }

    /// Set or revise the price and move the order to `awaiting_payment`.
    ///
    /// # Errors
    ///
    /// Returns `CustomOrderError::Validation` for a negative or
    /// over-precise price, `CustomOrderError::Precondition` if the order is
    /// already paid and `CustomOrderError::Conflict` if it changed
    /// underneath.
    #[instrument(skip(self), fields(%id))]
    pub async fn quote(
        &self,
        id: CustomOrderId,
        price: Decimal,
        currency: Option<CurrencyCode>,
    ) -> Result<CustomOrder, CustomOrderError> {
        let current = self.orders.get(id).await?.ok_or(CustomOrderError::NotFound)?;
        let currency = currency.unwrap_or(current.currency);

        if price.is_sign_negative() && !price.is_zero() {
            return Err(CustomOrderError::Validation("price must not be negative".to_owned()));
        }
        currency
            .check_precision(price)
            .and_then(|()| currency.to_minor_units(price))
            .map_err(|e| CustomOrderError::Validation(format!("price: {e}")))?;

        if !current.status.accepts_quote() {
            return Err(CustomOrderError::Precondition(format!(
                "custom order is {} and can no longer be quoted",
                current.status
            )));
        }

        let order = self
            .orders
            .set_quote(id, price, currency, current.status, Utc::now())
            .await?
            .ok_or(CustomOrderError::Conflict)?;

        tracing::info!(friendly_id = %order.friendly_id, %price, %currency, "Custom order quoted");
        self.outbox
            .enqueue(Notification::QuoteReady {
                custom_order_id: order.id,
                friendly_id: order.friendly_id.clone(),
                email: order.contact.email.clone(),
                name: order.contact.name.clone(),
                price,
                currency,
            })
            .await;
        Ok(order)
    }
}

fn validate_request(request: CustomOrderRequest) -> Result<CustomOrderRequest, CustomOrderError> {
    let invalid = |msg: &str| CustomOrderError::Validation(msg.to_owned());

    let contact = request.contact.normalized().map_err(invalid)?;

    let material = request.material.trim().to_owned();
    if material.is_empty() {
        return Err(invalid("material is required"));
    }
    if material.chars().count() > MAX_MATERIAL_LENGTH {
        return Err(invalid("material is too long"));
    }

    let description = request.description.trim().to_owned();
    if description.is_empty() {
        return Err(invalid("description is required"));
    }
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(invalid("description is too long"));
    }

    if request.reference_images.len() > MAX_REFERENCE_IMAGES {
        return Err(invalid("too many reference images"));
    }
    let reference_images = request
        .reference_images
        .into_iter()
        .map(|url| url.trim().to_owned())
        .filter(|url| !url.is_empty())
        .collect::<Vec<_>>();
    if reference_images
        .iter()
        .any(|url| url.len() > MAX_URL_LENGTH || !url.starts_with("https://"))
    {
        return Err(invalid("reference images must be https URLs"));
    }

    Ok(CustomOrderRequest {
        contact,
        order_type: request.order_type,
        material,
        description,
        reference_images,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atelier_core::CustomOrderStatus;

    use super::*;
    use crate::db::Stores;
    use crate::db::memory::MemoryOutboxStore;

    fn service(stores: &Stores, outbox: Arc<MemoryOutboxStore>) -> CustomOrderService {
        CustomOrderService::new(
            stores.custom_orders.clone(),
            Outbox::new(outbox),
            CurrencyCode::USD,
        )
    }

    fn request() -> CustomOrderRequest {
        CustomOrderRequest {
            contact: CustomerContact {
                email: Email::parse("ada@shop.example").unwrap(),
                name: "Ada".to_owned(),
                phone: None,
            },
            order_type: CustomOrderType::Modify,
            material: " silver ".to_owned(),
            description: "Resize my grandmother's ring".to_owned(),
            reference_images: vec!["https://img.example/ring.jpg".to_owned()],
        }
    }

    #[tokio::test]
    async fn test_submit_then_lookup() {
        let stores = Stores::in_memory();
        let outbox = Arc::new(MemoryOutboxStore::default());
        let service = service(&stores, outbox.clone());

        let order = service.submit(request()).await.unwrap();
        assert_eq!(order.status, CustomOrderStatus::PendingQuote);
        assert!(order.price.is_none());
        assert_eq!(order.material, "silver");

        let email = Email::parse("ada@shop.example").unwrap();
        let found = service.lookup(&order.friendly_id, &email).await.unwrap();
        assert_eq!(found.id, order.id);

        let other = Email::parse("eve@shop.example").unwrap();
        assert!(matches!(
            service.lookup(&order.friendly_id, &other).await,
            Err(CustomOrderError::NotFound)
        ));

        let queued = outbox.snapshot().await;
        assert!(matches!(
            queued.first().map(|(n, _)| n),
            Some(Notification::CustomOrderReceived { .. })
        ));
    }

    #[tokio::test]
    async fn test_submit_validates() {
        let stores = Stores::in_memory();
        let service = service(&stores, Arc::new(MemoryOutboxStore::default()));

        let mut bad = request();
        bad.description = "   ".to_owned();
        assert!(matches!(service.submit(bad).await, Err(CustomOrderError::Validation(_))));

        let mut bad = request();
        bad.reference_images = vec!["file:///etc/passwd".to_owned()];
        assert!(matches!(service.submit(bad).await, Err(CustomOrderError::Validation(_))));
    }

    #[tokio::test]
    async fn test_quote_and_requote() {
        let stores = Stores::in_memory();
        let outbox = Arc::new(MemoryOutboxStore::default());
        let service = service(&stores, outbox.clone());
        let order = service.submit(request()).await.unwrap();

        let quoted = service.quote(order.id, Decimal::new(200, 0), None).await.unwrap();
        assert_eq!(quoted.status, CustomOrderStatus::AwaitingPayment);
        assert_eq!(quoted.price, Some(Decimal::new(200, 0)));

        let requoted = service
            .quote(order.id, Decimal::new(18050, 2), Some(CurrencyCode::EUR))
            .await
            .unwrap();
        assert_eq!(requoted.price, Some(Decimal::new(18050, 2)));
        assert_eq!(requoted.currency, CurrencyCode::EUR);

        assert_eq!(outbox.snapshot().await.len(), 3);
    }

    #[tokio::test]
    async fn test_quote_rejects_bad_price_and_paid_orders() {
        let stores = Stores::in_memory();
        let service = service(&stores, Arc::new(MemoryOutboxStore::default()));
        let order = service.submit(request()).await.unwrap();

        assert!(matches!(
            service.quote(order.id, Decimal::new(-1, 0), None).await,
            Err(CustomOrderError::Validation(_))
        ));
        assert!(matches!(
            service.quote(order.id, Decimal::new(1001, 3), None).await,
            Err(CustomOrderError::Validation(_))
        ));

        service.quote(order.id, Decimal::new(200, 0), None).await.unwrap();
        stores
            .custom_orders
            .mark_paid(order.id, "cs_test_1", None, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            service.quote(order.id, Decimal::new(250, 0), None).await,
            Err(CustomOrderError::Precondition(_))
        ));
        assert!(matches!(
            service.quote(CustomOrderId::generate(), Decimal::ONE, None).await,
            Err(CustomOrderError::NotFound)
        ));
    }
}
