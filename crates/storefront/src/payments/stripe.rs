//! Stripe Checkout client.
//!
//! Creates hosted checkout sessions with `POST /v1/checkout/sessions`.
//! Stripe takes form-encoded bodies with bracketed keys for nested fields,
//! e.g. `line_items[0][price_data][unit_amount]`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentProvider};
use crate::config::PaymentConfig;

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: SecretString,
    api_base: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build or no secret key is configured.
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let secret_key = config
            .stripe_secret_key
            .clone()
            .ok_or_else(|| PaymentError::InvalidResponse("STRIPE_SECRET_KEY not set".to_owned()))?;

        let mut headers = HeaderMap::new();
        headers.insert("Stripe-Version", HeaderValue::from_static("2024-06-20"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            secret_key,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
        })
    }
}

/// Flatten a session request into Stripe's bracketed form fields.
pub(crate) fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_owned(), "payment".to_owned()),
        ("success_url".to_owned(), request.success_url.clone()),
        ("cancel_url".to_owned(), request.cancel_url.clone()),
        (
            "client_reference_id".to_owned(),
            request.idempotency_key.clone(),
        ),
    ];

    if let Some(email) = &request.customer_email {
        form.push(("customer_email".to_owned(), email.clone()));
    }

    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.push((
            format!("{prefix}[price_data][currency]"),
            request.currency.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount_minor.to_string(),
        ));
        form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
    }

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }

    for (i, country) in request.shipping_countries.iter().enumerate() {
        form.push((
            format!("shipping_address_collection[allowed_countries][{i}]"),
            country.clone(),
        ));
    }

    form
}

#[async_trait]
impl PaymentProvider for StripeClient {
    fn name(&self) -> &'static str {
        "stripe"
    }

    #[tracing::instrument(skip(self, request), fields(idempotency_key = %request.idempotency_key))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let url = format!("{}/v1/checkout/sessions", self.api_base);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&session_form(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PaymentError::Timeout
                } else {
                    PaymentError::Http(e)
                }
            })?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|envelope| envelope.error.message)
                .unwrap_or(body);
            tracing::warn!(status = status.as_u16(), %message, "Stripe rejected checkout session");
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        let url = session
            .url
            .ok_or_else(|| PaymentError::InvalidResponse("session has no url".to_owned()))?;

        tracing::info!(session_id = %session.id, "Created Stripe checkout session");
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::payments::SessionLineItem;

    #[test]
    fn test_session_form_fields() {
        let request = CheckoutSessionRequest {
            idempotency_key: "ORD-20261016-ABCDEF".to_owned(),
            currency: "usd".to_owned(),
            line_items: vec![SessionLineItem {
                name: "Ring".to_owned(),
                unit_amount_minor: 15000,
                quantity: 1,
            }],
            customer_email: Some("buyer@shop.example".to_owned()),
            metadata: BTreeMap::from([("intent".to_owned(), "cart".to_owned())]),
            success_url: "https://shop.example/checkout/success".to_owned(),
            cancel_url: "https://shop.example/checkout/cancel".to_owned(),
            shipping_countries: vec!["US".to_owned(), "CA".to_owned()],
        };

        let form = session_form(&request);
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("15000"));
        assert_eq!(get("line_items[0][price_data][currency]"), Some("usd"));
        assert_eq!(get("line_items[0][quantity]"), Some("1"));
        assert_eq!(get("metadata[intent]"), Some("cart"));
        assert_eq!(
            get("shipping_address_collection[allowed_countries][1]"),
            Some("CA")
        );
        assert_eq!(get("customer_email"), Some("buyer@shop.example"));
    }
}
