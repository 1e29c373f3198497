//! Custom order repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;

use atelier_core::{
    CurrencyCode, CustomOrderId, CustomOrderStatus, CustomerContact, Email, FriendlyId,
    ShippingAddress,
};

use super::RepositoryError;
use crate::models::{CustomOrder, NewCustomOrder};

/// Storage for custom orders.
#[async_trait]
pub trait CustomOrderRepository: Send + Sync {
    /// Insert a new request in `pending_quote`.
    ///
    /// Returns `RepositoryError::Conflict` if the friendly id is taken.
    async fn insert(
        &self,
        order: &NewCustomOrder,
        now: DateTime<Utc>,
    ) -> Result<CustomOrder, RepositoryError>;

    async fn get(&self, id: CustomOrderId) -> Result<Option<CustomOrder>, RepositoryError>;

    async fn find_by_friendly_id(
        &self,
        friendly_id: &FriendlyId,
    ) -> Result<Option<CustomOrder>, RepositoryError>;

    /// Most recent first.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<CustomOrder>, RepositoryError>;

    /// Set the price and move to `awaiting_payment`, if the status is still
    /// `expected`.
    async fn set_quote(
        &self,
        id: CustomOrderId,
        price: Decimal,
        currency: CurrencyCode,
        expected: CustomOrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<CustomOrder>, RepositoryError>;

    /// Record the checkout session for an order awaiting payment.
    async fn attach_session(
        &self,
        id: CustomOrderId,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CustomOrder>, RepositoryError>;

    /// Mark an order awaiting payment as paid.
    ///
    /// Returns `None` if it was already paid, so only one caller wins.
    async fn mark_paid(
        &self,
        id: CustomOrderId,
        session_id: &str,
        shipping_address: Option<&ShippingAddress>,
        now: DateTime<Utc>,
    ) -> Result<Option<CustomOrder>, RepositoryError>;
}

const CUSTOM_ORDER_COLUMNS: &str = "id, friendly_id, customer_email, customer_name, \
     customer_phone, order_type, material, description, reference_images, price, currency, \
     status, provider_session_id, shipping_address, paid_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CustomOrderRow {
    id: CustomOrderId,
    friendly_id: String,
    customer_email: String,
    customer_name: String,
    customer_phone: Option<String>,
    order_type: String,
    material: String,
    description: String,
    reference_images: Json<Vec<String>>,
    price: Option<Decimal>,
    currency: String,
    status: String,
    provider_session_id: Option<String>,
    shipping_address: Option<Json<ShippingAddress>>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CustomOrderRow> for CustomOrder {
    type Error = RepositoryError;

    fn try_from(row: CustomOrderRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |what: &str, e: &dyn std::fmt::Display| {
            RepositoryError::DataCorruption(format!("custom order {id}: invalid {what}: {e}"))
        };

        Ok(Self {
            id,
            friendly_id: FriendlyId::from_string(row.friendly_id),
            contact: CustomerContact {
                email: Email::parse(&row.customer_email).map_err(|e| corrupt("email", &e))?,
                name: row.customer_name,
                phone: row.customer_phone,
            },
            order_type: row
                .order_type
                .parse()
                .map_err(|e| corrupt("order type", &e))?,
            material: row.material,
            description: row.description,
            reference_images: row.reference_images.0,
            price: row.price,
            currency: row.currency.parse().map_err(|e| corrupt("currency", &e))?,
            status: row.status.parse().map_err(|e| corrupt("status", &e))?,
            provider_session_id: row.provider_session_id,
            shipping_address: row.shipping_address.map(|a| a.0),
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_custom_order(row: Option<CustomOrderRow>) -> Result<Option<CustomOrder>, RepositoryError> {
    row.map(CustomOrder::try_from).transpose()
}

/// `PostgreSQL` custom order repository.
pub struct PgCustomOrderRepository {
    pool: PgPool,
}

impl PgCustomOrderRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomOrderRepository for PgCustomOrderRepository {
    async fn insert(
        &self,
        order: &NewCustomOrder,
        now: DateTime<Utc>,
    ) -> Result<CustomOrder, RepositoryError> {
        let sql = format!(
            "INSERT INTO custom_orders (id, friendly_id, customer_email, customer_name, \
                 customer_phone, order_type, material, description, reference_images, currency, \
                 status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending_quote', $11, $11) \
             RETURNING {CUSTOM_ORDER_COLUMNS}"
        );
        let row: CustomOrderRow = sqlx::query_as(&sql)
            .bind(order.id)
            .bind(order.friendly_id.as_str())
            .bind(order.contact.email.as_str())
            .bind(&order.contact.name)
            .bind(order.contact.phone.as_deref())
            .bind(order.order_type.as_str())
            .bind(&order.material)
            .bind(&order.description)
            .bind(Json(&order.reference_images))
            .bind(order.currency.code())
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_insert(e, "friendly id"))?;
        row.try_into()
    }

    async fn get(&self, id: CustomOrderId) -> Result<Option<CustomOrder>, RepositoryError> {
        let sql = format!("SELECT {CUSTOM_ORDER_COLUMNS} FROM custom_orders WHERE id = $1");
        let row = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        into_custom_order(row)
    }

    async fn find_by_friendly_id(
        &self,
        friendly_id: &FriendlyId,
    ) -> Result<Option<CustomOrder>, RepositoryError> {
        let sql = format!("SELECT {CUSTOM_ORDER_COLUMNS} FROM custom_orders WHERE friendly_id = $1");
        let row = sqlx::query_as(&sql)
            .bind(friendly_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        into_custom_order(row)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<CustomOrder>, RepositoryError> {
        let sql = format!(
            "SELECT {CUSTOM_ORDER_COLUMNS} FROM custom_orders \
             ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        let rows: Vec<CustomOrderRow> = sqlx::query_as(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(CustomOrder::try_from).collect()
    }

    async fn set_quote(
        &self,
        id: CustomOrderId,
        price: Decimal,
        currency: CurrencyCode,
        expected: CustomOrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<CustomOrder>, RepositoryError> {
        let sql = format!(
            "UPDATE custom_orders SET price = $2, currency = $3, status = 'awaiting_payment', \
                 updated_at = $5 \
             WHERE id = $1 AND status = $4 \
             RETURNING {CUSTOM_ORDER_COLUMNS}"
        );
        let row = sqlx::query_as(&sql)
            .bind(id)
            .bind(price)
            .bind(currency.code())
            .bind(expected.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        into_custom_order(row)
    }

    async fn attach_session(
        &self,
        id: CustomOrderId,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CustomOrder>, RepositoryError> {
        let sql = format!(
            "UPDATE custom_orders SET provider_session_id = $2, updated_at = $3 \
             WHERE id = $1 AND status = 'awaiting_payment' \
             RETURNING {CUSTOM_ORDER_COLUMNS}"
        );
        let row = sqlx::query_as(&sql)
            .bind(id)
            .bind(session_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        into_custom_order(row)
    }

    async fn mark_paid(
        &self,
        id: CustomOrderId,
        session_id: &str,
        shipping_address: Option<&ShippingAddress>,
        now: DateTime<Utc>,
    ) -> Result<Option<CustomOrder>, RepositoryError> {
        let sql = format!(
            "UPDATE custom_orders SET status = 'paid', paid_at = $3, \
                 provider_session_id = $2, \
                 shipping_address = COALESCE($4, shipping_address), updated_at = $3 \
             WHERE id = $1 AND status = 'awaiting_payment' \
             RETURNING {CUSTOM_ORDER_COLUMNS}"
        );
        let row = sqlx::query_as(&sql)
            .bind(id)
            .bind(session_id)
            .bind(now)
            .bind(shipping_address.map(Json))
            .fetch_optional(&self.pool)
            .await?;
        into_custom_order(row)
    }
}
