//! Admin custom order management and quoting.

use axum::{
    Json,
    extract::State,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use atelier_core::{CurrencyCode, CustomOrderId};

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::CustomOrder;
use crate::routes::admin::Pagination;
use crate::routes::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiQuery(page): ApiQuery<Pagination>,
) -> Result<Json<Vec<CustomOrder>>> {
    let orders = state
        .custom_orders()
        .list(page.limit(), page.offset())
        .await?;
    Ok(Json(orders))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuoteRequest {
    pub price: Decimal,
    #[serde(default)]
    pub currency: Option<CurrencyCode>,
}

/// Price a custom order, moving it to awaiting payment.
///
/// Re-quoting is allowed until the order is paid.
#[instrument(skip_all, fields(custom_order_id = %id, admin = %admin.username, price = %body.price))]
pub async fn quote(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<CustomOrderId>,
    ApiJson(body): ApiJson<QuoteRequest>,
) -> Result<Json<CustomOrder>> {
    let order = state
        .custom_orders()
        .quote(id, body.price, body.currency)
        .await?;
    tracing::info!(friendly_id = %order.friendly_id, "Custom order quoted");
    Ok(Json(order))
}
