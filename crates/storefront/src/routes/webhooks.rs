//! Payment provider webhook endpoint.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde::Serialize;

use crate::error::Result;
use crate::payments::SIGNATURE_HEADER;
use crate::services::WebhookOutcome;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Acknowledged {
    pub received: bool,
}

/// Receive a signed provider event.
///
/// The raw body is verified before anything is parsed. Any 2xx tells the
/// provider to stop retrying, so errors that a retry could fix (storage)
/// surface as 5xx, while duplicates and unknown event types are
/// acknowledged.
pub async fn payments(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Acknowledged>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.reconciler().handle(signature, &body).await?;
    if outcome == WebhookOutcome::Duplicate {
        tracing::debug!("Webhook event already processed");
    }

    Ok(Json(Acknowledged { received: true }))
}
