//! Test harness for the storefront router.
//!
//! Each [`TestApp`] is a complete router over fresh in-process stores, with
//! a payment provider that records every session request instead of
//! calling out. [`TestClient`] plays a browser: it keeps the cookies the
//! app sets and echoes the CSRF token it was given.
//!
//! ```rust,ignore
//! let app = TestApp::new();
//! let client = app.client();
//! client.fetch_csrf().await;
//! let response = client.post("/api/checkout", json!({ ... })).await;
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc, clippy::must_use_candidate)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::Utc;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use atelier_core::ProductId;
use atelier_storefront::app::build_router;
use atelier_storefront::config::StorefrontConfig;
use atelier_storefront::db::Stores;
use atelier_storefront::db::memory::MemoryOutboxStore;
use atelier_storefront::middleware::{CSRF_HEADER, SessionBackend};
use atelier_storefront::models::Notification;
use atelier_storefront::payments::signature::sign;
use atelier_storefront::payments::{
    CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentProvider, SIGNATURE_HEADER,
};
use atelier_storefront::state::AppState;

/// Signing secret the test app verifies webhooks against.
pub const WEBHOOK_SECRET: &str = "whsec_9f3kQ2mZr7Lx4VtB8nYc1HdP6sJw0GaE";

/// Password used for accounts created by the harness.
pub const PASSWORD: &str = "correct horse battery";

/// Payment provider that records requests and hands out `cs_test_<n>` ids.
#[derive(Default)]
pub struct RecordingProvider {
    requests: Mutex<Vec<CheckoutSessionRequest>>,
}

impl RecordingProvider {
    pub fn requests(&self) -> Vec<CheckoutSessionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> CheckoutSessionRequest {
        self.requests().last().cloned().unwrap()
    }
}

#[async_trait]
impl PaymentProvider for RecordingProvider {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        Ok(CheckoutSession {
            id: format!("cs_test_{}", requests.len()),
            url: format!("https://pay.example/c/cs_test_{}", requests.len()),
        })
    }
}

/// A decoded response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `error` message of an error body.
    pub fn error(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }
}

async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    TestResponse {
        status,
        headers,
        body,
    }
}

/// The assembled app over fresh in-process stores.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub stores: Stores,
    pub outbox: Arc<MemoryOutboxStore>,
    pub provider: Arc<RecordingProvider>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Build an app after adjusting the default test configuration.
    pub fn with_config(adjust: impl FnOnce(&mut StorefrontConfig)) -> Self {
        let mut config = StorefrontConfig::new("http://localhost:3000");
        config.payment.webhook_secret = Some(SecretString::from(WEBHOOK_SECRET));
        adjust(&mut config);

        let outbox = Arc::new(MemoryOutboxStore::default());
        let mut stores = Stores::in_memory();
        stores.outbox = outbox.clone();

        let provider = Arc::new(RecordingProvider::default());
        let state = AppState::with_provider(config, stores.clone(), provider.clone());
        let router = build_router(state.clone(), &SessionBackend::new(None));

        Self {
            router,
            state,
            stores,
            outbox,
            provider,
        }
    }

    /// A browser with its own cookie jar, seen as `ip`.
    pub fn client_from(&self, ip: &str) -> TestClient {
        TestClient {
            router: self.router.clone(),
            ip: ip.to_owned(),
            cookies: Mutex::new(BTreeMap::new()),
            csrf: Mutex::new(None),
        }
    }

    pub fn client(&self) -> TestClient {
        self.client_from("203.0.113.10")
    }

    /// Add a product with `stock` units.
    pub async fn seed_product(&self, name: &str, stock: u32) -> ProductId {
        let id = ProductId::generate();
        self.stores.stock.set_level(id, name, stock).await.unwrap();
        id
    }

    pub async fn stock(&self, id: ProductId) -> i32 {
        self.stores.stock.level(id).await.unwrap().unwrap()
    }

    pub async fn create_admin(&self, username: &str) {
        self.state.auth().create_admin(username, PASSWORD).await.unwrap();
    }

    /// Post a correctly signed provider event.
    pub async fn deliver_event(&self, event_id: &str, event_type: &str, object: &Value) -> TestResponse {
        let body = serde_json::json!({
            "id": event_id,
            "type": event_type,
            "data": { "object": object },
        })
        .to_string();
        let signature = sign(WEBHOOK_SECRET, Utc::now().timestamp(), body.as_bytes());
        self.deliver_raw(Some(&signature), body).await
    }

    /// Post a webhook body with whatever signature header is given.
    pub async fn deliver_raw(&self, signature: Option<&str>, body: String) -> TestResponse {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/api/webhooks/payments")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        send(&self.router, request.body(Body::from(body)).unwrap()).await
    }

    /// Notifications enqueued so far.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.outbox
            .snapshot()
            .await
            .into_iter()
            .map(|(notification, _)| notification)
            .collect()
    }
}

/// A cookie-keeping client.
pub struct TestClient {
    router: Router,
    ip: String,
    cookies: Mutex<BTreeMap<String, String>>,
    csrf: Mutex<Option<String>>,
}

impl TestClient {
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("x-forwarded-for", &self.ip);

        let cookie_header = self
            .cookies
            .lock()
            .unwrap()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        if !cookie_header.is_empty() {
            builder = builder.header(header::COOKIE, cookie_header);
        }
        if let Some(token) = self.csrf.lock().unwrap().clone() {
            builder = builder.header(CSRF_HEADER, token);
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = send(&self.router, request).await;
        self.store_cookies(&response.headers);
        response
    }

    fn store_cookies(&self, headers: &HeaderMap) {
        let mut cookies = self.cookies.lock().unwrap();
        for set_cookie in headers.get_all(header::SET_COOKIE) {
            let Ok(set_cookie) = set_cookie.to_str() else {
                continue;
            };
            let pair = set_cookie.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let removed = value.is_empty() || set_cookie.contains("Max-Age=0");
            if removed {
                cookies.remove(name.trim());
            } else {
                cookies.insert(name.trim().to_owned(), value.trim().to_owned());
            }
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> TestResponse {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> TestResponse {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(Method::DELETE, path, None).await
    }

    /// Fetch the session's CSRF token and send it from now on.
    pub async fn fetch_csrf(&self) -> String {
        let response = self.get("/api/session/csrf").await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        let token = response.body["csrfToken"].as_str().unwrap().to_owned();
        self.set_csrf(Some(token.clone()));
        token
    }

    pub fn set_csrf(&self, token: Option<String>) {
        *self.csrf.lock().unwrap() = token;
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.lock().unwrap().get(name).cloned()
    }

    pub fn set_cookie(&self, name: &str, value: &str) {
        self.cookies
            .lock()
            .unwrap()
            .insert(name.to_owned(), value.to_owned());
    }

    /// Sign in as an admin and adopt the returned CSRF token.
    pub async fn admin_login(&self, username: &str) -> TestResponse {
        let response = self
            .post(
                "/admin/api/login",
                &serde_json::json!({ "username": username, "password": PASSWORD }),
            )
            .await;
        if let Some(token) = response.body["csrfToken"].as_str() {
            self.set_csrf(Some(token.to_owned()));
        }
        response
    }

    /// Sign up as a customer and adopt the returned CSRF token.
    pub async fn signup(&self, email: &str) -> TestResponse {
        let response = self
            .post(
                "/api/auth/signup",
                &serde_json::json!({ "email": email, "name": "Ada Lovelace", "password": PASSWORD }),
            )
            .await;
        if let Some(token) = response.body["csrfToken"].as_str() {
            self.set_csrf(Some(token.to_owned()));
        }
        response
    }
}
