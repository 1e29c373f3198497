//! Signed-in customer routes.

use axum::{Json, extract::State};

use crate::error::Result;
use crate::middleware::RequireCustomer;
use crate::models::Order;
use crate::state::AppState;

/// Orders placed with the signed-in customer's email, newest first.
pub async fn orders(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
) -> Result<Json<Vec<Order>>> {
    let orders = state.stores().orders.list_for_email(&customer.email).await?;
    Ok(Json(orders))
}
