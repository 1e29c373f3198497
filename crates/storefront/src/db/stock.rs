//! Stock ledger.
//!
//! The only writer of product stock. Each decrement is recorded against
//! the order that caused it, so replaying a settlement cannot apply it
//! twice, and stock is clamped at zero rather than rejected.

use async_trait::async_trait;
use sqlx::PgPool;

use atelier_core::{OrderId, ProductId};

use super::RepositoryError;

/// A decrement caused by a paid order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDecrement {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Result of a decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// Stock was reduced.
    Applied {
        previous: i32,
        remaining: i32,
        /// The requested quantity exceeded the stock on hand.
        clamped: bool,
    },
    /// This order already decremented this product.
    AlreadyApplied,
    /// No such product.
    UnknownProduct,
}

/// Clamp a decrement so stock never goes below zero.
#[must_use]
pub fn clamp_decrement(current: i32, quantity: u32) -> DecrementOutcome {
    let requested = i64::from(quantity);
    let remaining = (i64::from(current) - requested).max(0);
    DecrementOutcome::Applied {
        previous: current,
        remaining: i32::try_from(remaining).unwrap_or(0),
        clamped: requested > i64::from(current),
    }
}

/// Authoritative per-product stock counts.
#[async_trait]
pub trait StockLedger: Send + Sync {
    async fn level(&self, product_id: ProductId) -> Result<Option<i32>, RepositoryError>;

    /// Create or overwrite a product's stock count.
    async fn set_level(
        &self,
        product_id: ProductId,
        name: &str,
        stock: u32,
    ) -> Result<(), RepositoryError>;

    /// Apply a decrement at most once per (order, product).
    ///
    /// Atomic relative to concurrent decrements of the same product.
    async fn decrement(&self, decrement: &StockDecrement)
    -> Result<DecrementOutcome, RepositoryError>;
}

/// `PostgreSQL` stock ledger.
///
/// Locks the product row for the duration of a decrement and records the
/// movement in `stock_movements`, whose primary key is `(order_id, product_id)`.
pub struct PgStockLedger {
    pool: PgPool,
}

impl PgStockLedger {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StockLedger for PgStockLedger {
    async fn level(&self, product_id: ProductId) -> Result<Option<i32>, RepositoryError> {
        let stock = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(stock)
    }

    async fn set_level(
        &self,
        product_id: ProductId,
        name: &str,
        stock: u32,
    ) -> Result<(), RepositoryError> {
        let stock = i32::try_from(stock)
            .map_err(|_| RepositoryError::Conflict(format!("stock {stock} is out of range")))?;
        sqlx::query(
            "INSERT INTO products (id, name, stock) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, stock = EXCLUDED.stock",
        )
        .bind(product_id)
        .bind(name)
        .bind(stock)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn decrement(
        &self,
        decrement: &StockDecrement,
    ) -> Result<DecrementOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<i32> =
            sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
                .bind(decrement.product_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(current) = current else {
            return Ok(DecrementOutcome::UnknownProduct);
        };

        let outcome = clamp_decrement(current, decrement.quantity);
        let DecrementOutcome::Applied { remaining, .. } = outcome else {
            return Ok(outcome);
        };

        let recorded = sqlx::query(
            "INSERT INTO stock_movements (order_id, product_id, quantity, previous_stock, new_stock) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (order_id, product_id) DO NOTHING",
        )
        .bind(decrement.order_id)
        .bind(decrement.product_id)
        .bind(i64::from(decrement.quantity))
        .bind(current)
        .bind(remaining)
        .execute(&mut *tx)
        .await?;
        if recorded.rows_affected() == 0 {
            return Ok(DecrementOutcome::AlreadyApplied);
        }

        sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
            .bind(decrement.product_id)
            .bind(remaining)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_decrement() {
        assert_eq!(
            clamp_decrement(5, 2),
            DecrementOutcome::Applied {
                previous: 5,
                remaining: 3,
                clamped: false
            }
        );
        assert_eq!(
            clamp_decrement(1, 3),
            DecrementOutcome::Applied {
                previous: 1,
                remaining: 0,
                clamped: true
            }
        );
        assert_eq!(
            clamp_decrement(0, u32::MAX),
            DecrementOutcome::Applied {
                previous: 0,
                remaining: 0,
                clamped: true
            }
        );
    }
}
