//! Customer authentication route handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{end_session, rotate_csrf_token, set_current_customer};
use crate::models::{CurrentCustomer, Customer};
use crate::routes::ApiJson;
use crate::state::AppState;

/// Sign-up request body.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned after sign-up or login.
///
/// The CSRF token is rotated with the session, so clients must replace
/// any token they held before.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedIn {
    pub customer: Customer,
    pub csrf_token: String,
}

async fn start_session(session: &Session, customer: Customer) -> Result<SignedIn> {
    let current = CurrentCustomer {
        id: customer.id,
        email: customer.email.clone(),
    };
    set_current_customer(session, &current).await?;
    let csrf_token = rotate_csrf_token(session).await?;
    set_sentry_user(&customer.id, Some(customer.email.as_str()));

    Ok(SignedIn {
        customer,
        csrf_token,
    })
}

/// Create a customer account and sign it in.
#[instrument(skip_all, fields(email = %form.email))]
pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    ApiJson(form): ApiJson<SignupRequest>,
) -> Result<(StatusCode, Json<SignedIn>)> {
    let customer = state
        .auth()
        .register_customer(&form.email, &form.name, &form.password)
        .await?;
    tracing::info!(customer_id = %customer.id, "Customer registered");

    let signed_in = start_session(&session, customer).await?;
    Ok((StatusCode::CREATED, Json(signed_in)))
}

/// Sign a customer in with email and password.
#[instrument(skip_all, fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(form): ApiJson<LoginRequest>,
) -> Result<Json<SignedIn>> {
    let customer = match state.auth().login_customer(&form.email, &form.password).await {
        Ok(customer) => customer,
        Err(e) => {
            tracing::warn!("Customer login failed");
            return Err(e.into());
        }
    };
    tracing::info!(customer_id = %customer.id, "Customer logged in");

    Ok(Json(start_session(&session, customer).await?))
}

/// End the customer session.
pub async fn logout(session: Session) -> Result<StatusCode> {
    end_session(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}
