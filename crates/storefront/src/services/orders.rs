//! Admin management of standard orders.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::instrument;

use atelier_core::{OrderId, TransitionError};

use crate::db::{OrderRepository, RepositoryError};
use crate::models::{Order, OrderPatch};

/// Longest accepted tracking number or courier name.
const MAX_SHORT_FIELD: usize = 200;

/// Longest accepted tracking URL.
const MAX_URL_LENGTH: usize = 2048;

/// Longest accepted notes.
const MAX_NOTES_LENGTH: usize = 5000;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("order was modified concurrently, reload and retry")]
    Conflict,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Validates and applies admin changes to orders.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
}

impl OrderService {
    #[must_use]
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the orders cannot be read.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list(limit.clamp(1, 200), offset.max(0)).await?)
    }

    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if there is no such order.
    pub async fn get(&self, id: OrderId) -> Result<Order, OrderError> {
        self.orders.get(id).await?.ok_or(OrderError::NotFound)
    }

    /// Apply a partial update.
    ///
    /// Status changes are checked against the lifecycle, and the write only
    /// lands if both statuses are still the ones that were checked. A paid
    /// order can therefore never be moved back to pending or failed, even
    /// by a patch racing a webhook.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for an empty or malformed patch,
    /// `OrderError::Transition` for a forbidden status change and
    /// `OrderError::Conflict` if the order changed underneath.
    #[instrument(skip(self, patch), fields(%id))]
    pub async fn update(&self, id: OrderId, patch: &OrderPatch) -> Result<Order, OrderError> {
        validate_patch(patch)?;
        let current = self.get(id).await?;

        if let Some(status) = patch.status {
            current.status.transition_to(status)?;
        }
        if let Some(payment_status) = patch.payment_status {
            current.payment_status.transition_to(payment_status)?;
        }

        let updated = self
            .orders
            .apply_patch(id, (current.status, current.payment_status), patch, Utc::now())
            .await?
            .ok_or(OrderError::Conflict)?;

        tracing::info!(
            order_number = %updated.order_number,
            status = %updated.status,
            payment_status = %updated.payment_status,
            "Order updated"
        );
        Ok(updated)
    }

    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if there is no such order.
    #[instrument(skip(self), fields(%id))]
    pub async fn delete(&self, id: OrderId) -> Result<(), OrderError> {
        if self.orders.delete(id).await? {
            tracing::info!("Order deleted");
            Ok(())
        } else {
            Err(OrderError::NotFound)
        }
    }
}

fn validate_patch(patch: &OrderPatch) -> Result<(), OrderError> {
    if patch.is_empty() {
        return Err(OrderError::Validation("nothing to update".to_owned()));
    }
    let too_long = |value: &Option<String>, max: usize| {
        value.as_ref().is_some_and(|v| v.trim().chars().count() > max)
    };
    if too_long(&patch.tracking_number, MAX_SHORT_FIELD) || too_long(&patch.courier_name, MAX_SHORT_FIELD) {
        return Err(OrderError::Validation(format!(
            "tracking number and courier name must be at most {MAX_SHORT_FIELD} characters"
        )));
    }
    if too_long(&patch.notes, MAX_NOTES_LENGTH) {
        return Err(OrderError::Validation(format!(
            "notes must be at most {MAX_NOTES_LENGTH} characters"
        )));
    }
    if let Some(url) = patch.tracking_url.as_deref().map(str::trim)
        && !url.is_empty()
        && (url.len() > MAX_URL_LENGTH
            || !(url.starts_with("https://") || url.starts_with("http://")))
    {
        return Err(OrderError::Validation(
            "tracking URL must be an http(s) URL".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atelier_core::{
        CurrencyCode, CustomerContact, Email, OrderNumber, OrderStatus, PaymentStatus,
    };

    use super::*;
    use crate::db::Stores;
    use crate::models::{NewOrder, PaymentSettlement};

    async fn paid_order(stores: &Stores) -> Order {
        let id = OrderId::generate();
        stores
            .orders
            .insert_for_session(&NewOrder {
                id,
                order_number: OrderNumber::from_string("ORD-20261016-ABCDEF".to_owned()),
                contact: CustomerContact {
                    email: Email::parse("ada@shop.example").unwrap(),
                    name: "Ada".to_owned(),
                    phone: None,
                },
                customer_id: None,
                line_items: vec![],
                currency: CurrencyCode::USD,
                subtotal_minor: 1000,
                shipping_minor: 0,
                tax_minor: 0,
                total_minor: 1000,
                provider_session_id: "cs_test_1".to_owned(),
            })
            .await
            .unwrap();
        stores
            .orders
            .mark_paid("cs_test_1", &PaymentSettlement::default(), Utc::now())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_update_tracking_and_status() {
        let stores = Stores::in_memory();
        let order = paid_order(&stores).await;
        let service = OrderService::new(stores.orders.clone());

        let patch = OrderPatch {
            status: Some(OrderStatus::Shipped),
            tracking_number: Some("1Z999".to_owned()),
            tracking_url: Some("https://track.example/1Z999".to_owned()),
            ..OrderPatch::default()
        };
        let updated = service.update(order.id, &patch).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Shipped);
        assert_eq!(updated.tracking_number.as_deref(), Some("1Z999"));
        assert_eq!(updated.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_paid_cannot_revert() {
        let stores = Stores::in_memory();
        let order = paid_order(&stores).await;
        let service = OrderService::new(stores.orders.clone());

        for status in [PaymentStatus::Pending, PaymentStatus::Failed] {
            let patch = OrderPatch {
                payment_status: Some(status),
                ..OrderPatch::default()
            };
            let err = service.update(order.id, &patch).await.unwrap_err();
            assert!(matches!(err, OrderError::Transition(_)));
        }
        let stored = service.get(order.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_rejects_bad_patches() {
        let stores = Stores::in_memory();
        let order = paid_order(&stores).await;
        let service = OrderService::new(stores.orders.clone());

        let err = service.update(order.id, &OrderPatch::default()).await.unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));

        let patch = OrderPatch {
            tracking_url: Some("javascript:alert(1)".to_owned()),
            ..OrderPatch::default()
        };
        let err = service.update(order.id, &patch).await.unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));

        let err = service
            .update(OrderId::generate(), &OrderPatch {
                notes: Some("hi".to_owned()),
                ..OrderPatch::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound));
    }

    #[tokio::test]
    async fn test_delete() {
        let stores = Stores::in_memory();
        let order = paid_order(&stores).await;
        let service = OrderService::new(stores.orders.clone());

        service.delete(order.id).await.unwrap();
        assert!(matches!(service.get(order.id).await, Err(OrderError::NotFound)));
        assert!(matches!(service.delete(order.id).await, Err(OrderError::NotFound)));
    }
}
