//! Order repository.
//!
//! Payment transitions are conditional updates so concurrent webhook
//! deliveries and admin edits cannot overwrite each other: whichever writer
//! matches the expected state wins, the others see `None`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use atelier_core::{
    CustomerContact, CustomerId, Email, LineItem, OrderId, OrderNumber, OrderStatus,
    PaymentStatus, ShippingAddress,
};

use super::RepositoryError;
use crate::models::{NewOrder, Order, OrderPatch, PaymentSettlement};

/// Storage for standard orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a pending order for a checkout session.
    ///
    /// Idempotent on the provider session id: inserting the same session
    /// twice returns the existing order.
    async fn insert_for_session(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn find_by_session(&self, session_id: &str) -> Result<Option<Order>, RepositoryError>;

    /// Most recent first.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Order>, RepositoryError>;

    /// Orders placed with this contact email, most recent first.
    async fn list_for_email(&self, email: &Email) -> Result<Vec<Order>, RepositoryError>;

    /// Mark the session's order paid unless it already is.
    ///
    /// Returns the updated order when this call made the transition and
    /// `None` when the order was already paid (or refunded) or is missing.
    async fn mark_paid(
        &self,
        session_id: &str,
        settlement: &PaymentSettlement,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Mark a still-pending payment as failed.
    async fn mark_payment_failed(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Cancel an unpaid, unfulfilled order whose session expired.
    async fn cancel_unpaid(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Apply an admin patch if the order still has the expected statuses.
    ///
    /// Returns `None` if the order changed since it was read (or is gone).
    async fn apply_patch(
        &self,
        id: OrderId,
        expected: (OrderStatus, PaymentStatus),
        patch: &OrderPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Returns whether a row was deleted.
    async fn delete(&self, id: OrderId) -> Result<bool, RepositoryError>;
}

const ORDER_COLUMNS: &str = "id, order_number, customer_id, customer_email, customer_name, \
     customer_phone, line_items, currency, subtotal_minor, shipping_minor, tax_minor, \
     total_minor, status, payment_status, provider_session_id, shipping_address, courier_name, \
     tracking_number, tracking_url, notes, paid_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: String,
    customer_id: Option<CustomerId>,
    customer_email: String,
    customer_name: String,
    customer_phone: Option<String>,
    line_items: Json<Vec<LineItem>>,
    currency: String,
    subtotal_minor: i64,
    shipping_minor: i64,
    tax_minor: i64,
    total_minor: i64,
    status: String,
    payment_status: String,
    provider_session_id: Option<String>,
    shipping_address: Option<Json<ShippingAddress>>,
    courier_name: Option<String>,
    tracking_number: Option<String>,
    tracking_url: Option<String>,
    notes: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, e: &dyn std::fmt::Display| {
            RepositoryError::DataCorruption(format!("order {}: invalid {what}: {e}", row.id))
        };
        let email = Email::parse(&row.customer_email).map_err(|e| corrupt("email", &e))?;
        let currency = row.currency.parse().map_err(|e| corrupt("currency", &e))?;
        let status = row.status.parse().map_err(|e| corrupt("status", &e))?;
        let payment_status = row
            .payment_status
            .parse()
            .map_err(|e| corrupt("payment status", &e))?;

        Ok(Self {
            id: row.id,
            order_number: OrderNumber::from_string(row.order_number),
            contact: CustomerContact {
                email,
                name: row.customer_name,
                phone: row.customer_phone,
            },
            customer_id: row.customer_id,
            line_items: row.line_items.0,
            currency,
            subtotal_minor: row.subtotal_minor,
            shipping_minor: row.shipping_minor,
            tax_minor: row.tax_minor,
            total_minor: row.total_minor,
            status,
            payment_status,
            provider_session_id: row.provider_session_id,
            shipping_address: row.shipping_address.map(|a| a.0),
            courier_name: row.courier_name,
            tracking_number: row.tracking_number,
            tracking_url: row.tracking_url,
            notes: row.notes,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_order(row: Option<OrderRow>) -> Result<Option<Order>, RepositoryError> {
    row.map(Order::try_from).transpose()
}

/// `PostgreSQL` order repository.
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert_for_session(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let sql = format!(
            "INSERT INTO orders (id, order_number, customer_id, customer_email, customer_name, \
                 customer_phone, line_items, currency, subtotal_minor, shipping_minor, tax_minor, \
                 total_minor, provider_session_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (provider_session_id) DO NOTHING \
             RETURNING {ORDER_COLUMNS}"
        );
        let inserted: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(order.id)
            .bind(order.order_number.as_str())
            .bind(order.customer_id)
            .bind(order.contact.email.as_str())
            .bind(&order.contact.name)
            .bind(order.contact.phone.as_deref())
            .bind(Json(&order.line_items))
            .bind(order.currency.code())
            .bind(order.subtotal_minor)
            .bind(order.shipping_minor)
            .bind(order.tax_minor)
            .bind(order.total_minor)
            .bind(&order.provider_session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_insert(e, "order number"))?;

        match inserted {
            Some(row) => row.try_into(),
            None => self
                .find_by_session(&order.provider_session_id)
                .await?
                .ok_or(RepositoryError::NotFound),
        }
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        into_order(row)
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE provider_session_id = $1");
        let row = sqlx::query_as(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        into_order(row)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn list_for_email(&self, email: &Email) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_email = $1 ORDER BY created_at DESC"
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(email.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn mark_paid(
        &self,
        session_id: &str,
        settlement: &PaymentSettlement,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!(
            "UPDATE orders SET \
                 payment_status = 'paid', \
                 status = CASE WHEN status = 'pending' THEN 'processing' ELSE status END, \
                 paid_at = $2, \
                 subtotal_minor = COALESCE($3, subtotal_minor), \
                 shipping_minor = COALESCE($4, shipping_minor), \
                 tax_minor = COALESCE($5, tax_minor), \
                 total_minor = COALESCE($6, total_minor), \
                 shipping_address = COALESCE($7, shipping_address), \
                 updated_at = $2 \
             WHERE provider_session_id = $1 AND payment_status IN ('pending', 'failed') \
             RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as(&sql)
            .bind(session_id)
            .bind(now)
            .bind(settlement.subtotal_minor)
            .bind(settlement.shipping_minor)
            .bind(settlement.tax_minor)
            .bind(settlement.total_minor)
            .bind(settlement.shipping_address.as_ref().map(Json))
            .fetch_optional(&self.pool)
            .await?;
        into_order(row)
    }

    async fn mark_payment_failed(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!(
            "UPDATE orders SET payment_status = 'failed', updated_at = $2 \
             WHERE provider_session_id = $1 AND payment_status = 'pending' \
             RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as(&sql)
            .bind(session_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        into_order(row)
    }

    async fn cancel_unpaid(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!(
            "UPDATE orders SET status = 'cancelled', payment_status = 'failed', updated_at = $2 \
             WHERE provider_session_id = $1 AND status = 'pending' \
               AND payment_status IN ('pending', 'failed') \
             RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as(&sql)
            .bind(session_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        into_order(row)
    }

    async fn apply_patch(
        &self,
        id: OrderId,
        expected: (OrderStatus, PaymentStatus),
        patch: &OrderPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!(
            "UPDATE orders SET \
                 status = COALESCE($4::text, status), \
                 payment_status = COALESCE($5::text, payment_status), \
                 paid_at = CASE WHEN $5::text = 'paid' AND paid_at IS NULL THEN $10 ELSE paid_at END, \
                 tracking_number = CASE WHEN $6::text IS NULL THEN tracking_number \
                                        ELSE NULLIF(btrim($6::text), '') END, \
                 courier_name = CASE WHEN $7::text IS NULL THEN courier_name \
                                     ELSE NULLIF(btrim($7::text), '') END, \
                 tracking_url = CASE WHEN $8::text IS NULL THEN tracking_url \
                                     ELSE NULLIF(btrim($8::text), '') END, \
                 notes = CASE WHEN $9::text IS NULL THEN notes \
                              ELSE NULLIF(btrim($9::text), '') END, \
                 updated_at = $10 \
             WHERE id = $1 AND status = $2 AND payment_status = $3 \
             RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as(&sql)
            .bind(id)
            .bind(expected.0.as_str())
            .bind(expected.1.as_str())
            .bind(patch.status.map(OrderStatus::as_str))
            .bind(patch.payment_status.map(PaymentStatus::as_str))
            .bind(patch.tracking_number.as_deref())
            .bind(patch.courier_name.as_deref())
            .bind(patch.tracking_url.as_deref())
            .bind(patch.notes.as_deref())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        into_order(row)
    }

    async fn delete(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
