//! Admin stock lookup.

use axum::{
    Json,
    extract::State,
};
use serde::Serialize;

use atelier_core::ProductId;

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::routes::ApiPath;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub product_id: ProductId,
    pub stock: i32,
}

/// Current ledger level for a product.
pub async fn stock(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiPath(product_id): ApiPath<ProductId>,
) -> Result<Json<StockLevel>> {
    let stock = state
        .stores()
        .stock
        .level(product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("product not found".to_owned()))?;
    Ok(Json(StockLevel { product_id, stock }))
}
