//! Session bootstrap.

use axum::Json;
use serde::Serialize;
use tower_sessions::Session;

use crate::error::Result;
use crate::middleware::csrf_token;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

/// Return the CSRF token bound to the caller's session, minting one on
/// first use. Clients echo it back in `X-CSRF-Token`.
pub async fn csrf(session: Session) -> Result<Json<CsrfTokenResponse>> {
    let csrf_token = csrf_token(&session).await?;
    Ok(Json(CsrfTokenResponse { csrf_token }))
}
