//! Admin order management.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use tracing::instrument;

use atelier_core::OrderId;

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{Order, OrderPatch};
use crate::routes::admin::Pagination;
use crate::routes::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiQuery(page): ApiQuery<Pagination>,
) -> Result<Json<Vec<Order>>> {
    let orders = state.orders().list(page.limit(), page.offset()).await?;
    Ok(Json(orders))
}

pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().get(id).await?))
}

/// Apply a partial update.
///
/// Status changes go through the order and payment state machines; a paid
/// order can never be moved back to pending or failed from here.
#[instrument(skip_all, fields(order_id = %id, admin = %admin.username))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(patch): ApiJson<OrderPatch>,
) -> Result<Json<Order>> {
    let order = state.orders().update(id, &patch).await?;
    tracing::info!(
        status = %order.status,
        payment_status = %order.payment_status,
        "Order updated"
    );
    Ok(Json(order))
}

#[instrument(skip_all, fields(order_id = %id, admin = %admin.username))]
pub async fn destroy(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<StatusCode> {
    state.orders().delete(id).await?;
    tracing::info!("Order deleted");
    Ok(StatusCode::NO_CONTENT)
}
