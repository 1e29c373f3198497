//! Admin login and logout.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{end_session, rotate_csrf_token, set_current_admin};
use crate::models::{AdminUser, CurrentAdmin};
use crate::routes::ApiJson;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSignedIn {
    pub admin: AdminUser,
    pub csrf_token: String,
}

/// Sign an admin in.
///
/// The admin session lives behind its own cookie, so this never touches
/// a customer session held by the same browser.
#[instrument(skip_all, fields(username = %form.username))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(form): ApiJson<AdminLoginRequest>,
) -> Result<Json<AdminSignedIn>> {
    let admin = match state.auth().login_admin(&form.username, &form.password).await {
        Ok(admin) => admin,
        Err(e) => {
            tracing::warn!("Admin login failed");
            return Err(e.into());
        }
    };

    let current = CurrentAdmin {
        id: admin.id,
        username: admin.username.clone(),
    };
    set_current_admin(&session, &current).await?;
    let csrf_token = rotate_csrf_token(&session).await?;
    set_sentry_user(&admin.id, None);
    tracing::info!(admin_id = %admin.id, "Admin logged in");

    Ok(Json(AdminSignedIn { admin, csrf_token }))
}

pub async fn logout(session: Session) -> Result<StatusCode> {
    end_session(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}
