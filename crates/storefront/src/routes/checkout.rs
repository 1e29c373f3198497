//! Cart checkout and the provider's redirect landings.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use atelier_core::{CustomerContact, LineItem, Money, OrderNumber, OrderStatus, PaymentStatus};

use crate::error::Result;
use crate::middleware::OptionalCustomer;
use crate::routes::ApiJson;
use crate::services::{CartCheckout, CheckoutRedirect};
use crate::state::AppState;

/// Cart checkout request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub contact: CustomerContact,
    pub line_items: Vec<LineItem>,
}

/// Where the client should send the customer to pay.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
    pub reference: String,
    pub total: Money,
}

impl From<CheckoutRedirect> for CheckoutResponse {
    fn from(redirect: CheckoutRedirect) -> Self {
        Self {
            session_id: redirect.session_id,
            url: redirect.url,
            reference: redirect.reference,
            total: redirect.total,
        }
    }
}

/// Open a hosted checkout session for a cart.
///
/// Totals are recomputed here from the submitted line items. Stock is not
/// reserved; it is decremented once the payment is confirmed.
#[instrument(skip_all, fields(items = body.line_items.len()))]
pub async fn create(
    State(state): State<AppState>,
    OptionalCustomer(customer): OptionalCustomer,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let cart = CartCheckout {
        contact: body.contact,
        line_items: body.line_items,
        customer_id: customer.map(|c| c.id),
    };
    let redirect = state.checkout().checkout_cart(cart).await?;
    Ok(Json(redirect.into()))
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: Option<String>,
}

/// Landing page the provider redirects to after payment.
///
/// Payment may still be settling; the webhook is the source of truth, so
/// this only reports what is known right now.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLanding {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<OrderNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
}

pub async fn success(
    State(state): State<AppState>,
    Query(query): Query<SuccessQuery>,
) -> Result<Json<CheckoutLanding>> {
    let order = match query.session_id.as_deref() {
        Some(session_id) if !session_id.is_empty() => {
            state.stores().orders.find_by_session(session_id).await?
        }
        _ => None,
    };

    Ok(Json(CheckoutLanding {
        outcome: "success",
        order_number: order.as_ref().map(|o| o.order_number.clone()),
        status: order.as_ref().map(|o| o.status),
        payment_status: order.as_ref().map(|o| o.payment_status),
    }))
}

pub async fn cancel() -> Json<CheckoutLanding> {
    Json(CheckoutLanding {
        outcome: "cancelled",
        order_number: None,
        status: None,
        payment_status: None,
    })
}
