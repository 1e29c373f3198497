//! Custom order submission, lookup and checkout.
//!
//! Customers do not need an account for commissions. A custom order is
//! addressed by its friendly id and only disclosed to a caller who also
//! knows the email it was submitted with.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use atelier_core::{CurrencyCode, CustomOrderStatus, CustomerContact, Email, FriendlyId};

use crate::error::{AppError, Result};
use crate::models::{CustomOrder, CustomOrderType};
use crate::routes::checkout::CheckoutResponse;
use crate::routes::{ApiJson, ApiQuery};
use crate::services::CustomOrderRequest;
use crate::state::AppState;

/// Custom order submission body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub contact: CustomerContact,
    pub order_type: CustomOrderType,
    pub material: String,
    pub description: String,
    #[serde(default)]
    pub reference_images: Vec<String>,
}

/// What a customer may see about their custom order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomOrderView {
    pub friendly_id: FriendlyId,
    pub status: CustomOrderStatus,
    pub order_type: CustomOrderType,
    pub material: String,
    pub price: Option<Decimal>,
    pub currency: CurrencyCode,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<CustomOrder> for CustomOrderView {
    fn from(order: CustomOrder) -> Self {
        Self {
            friendly_id: order.friendly_id,
            status: order.status,
            order_type: order.order_type,
            material: order.material,
            price: order.price,
            currency: order.currency,
            paid_at: order.paid_at,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub email: Email,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub email: Email,
}

fn parse_friendly_id(raw: &str) -> Result<FriendlyId> {
    FriendlyId::parse(raw).ok_or_else(|| AppError::NotFound("custom order not found".to_owned()))
}

/// Submit a commission request.
#[instrument(skip_all, fields(order_type = %body.order_type))]
pub async fn submit(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SubmitRequest>,
) -> Result<(StatusCode, Json<CustomOrderView>)> {
    let request = CustomOrderRequest {
        contact: body.contact,
        order_type: body.order_type,
        material: body.material,
        description: body.description,
        reference_images: body.reference_images,
    };
    let order = state.custom_orders().submit(request).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// Look up a custom order by friendly id and the submitting email.
pub async fn show(
    State(state): State<AppState>,
    Path(friendly_id): Path<String>,
    ApiQuery(query): ApiQuery<LookupQuery>,
) -> Result<Json<CustomOrderView>> {
    let friendly_id = parse_friendly_id(&friendly_id)?;
    let order = state
        .custom_orders()
        .lookup(&friendly_id, &query.email)
        .await?;
    Ok(Json(order.into()))
}

/// Open a hosted checkout session for a quoted custom order.
#[instrument(skip_all, fields(friendly_id = %friendly_id))]
pub async fn checkout(
    State(state): State<AppState>,
    Path(friendly_id): Path<String>,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let friendly_id = parse_friendly_id(&friendly_id)?;
    let redirect = state
        .checkout()
        .checkout_custom_order(&friendly_id, &body.email)
        .await?;
    Ok(Json(redirect.into()))
}
