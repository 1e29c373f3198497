//! CSRF, rate limiting, session scopes and response headers.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use atelier_integration_tests::TestApp;
use atelier_storefront::middleware::session::{ADMIN_COOKIE_NAME, CUSTOMER_COOKIE_NAME};

fn custom_order_body() -> serde_json::Value {
    json!({
        "contact": { "email": "ada@example.com", "name": "Ada Lovelace" },
        "orderType": "modify",
        "material": "Gold",
        "description": "Resize to N",
    })
}

#[tokio::test]
async fn test_mutations_require_session_csrf_token() {
    let app = TestApp::new();
    let client = app.client();

    // No session at all.
    let response = client.post("/api/custom-orders", &custom_order_body()).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.error(), "invalid CSRF token");

    // A session, but a token it never issued.
    client.fetch_csrf().await;
    let issued = client.fetch_csrf().await;
    client.set_csrf(Some("0".repeat(issued.len())));
    let response = client.post("/api/custom-orders", &custom_order_body()).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    client.set_csrf(Some(issued));
    let response = client.post("/api/custom-orders", &custom_order_body()).await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);

    // Reads are never checked.
    client.set_csrf(None);
    let response = client.get("/api/session/csrf").await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_csrf_token_is_stable_until_login_rotates_it() {
    let app = TestApp::new();
    let client = app.client();

    let first = client.fetch_csrf().await;
    assert_eq!(client.fetch_csrf().await, first);

    let response = client.signup("ada@example.com").await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    let rotated = response.body["csrfToken"].as_str().unwrap().to_owned();
    assert_ne!(rotated, first);

    client.set_csrf(Some(first));
    let response = client.post("/api/auth/logout", &json!({})).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    client.set_csrf(Some(rotated));
    let response = client.post("/api/auth/logout", &json!({})).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_webhook_route_needs_no_session() {
    let app = TestApp::new();
    let response = app
        .deliver_event("evt_ping", "customer.created", &json!({ "id": "cus_1" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.header("x-ratelimit-remaining").is_none());
}

#[tokio::test]
async fn test_login_attempts_are_rate_limited_per_client() {
    let app = TestApp::new();
    let attacker = app.client_from("192.0.2.66");
    let credentials = json!({ "email": "ada@example.com", "password": "guess-guess-guess" });

    for expected_remaining in ["4", "3", "2", "1", "0"] {
        let response = attacker.post("/api/auth/login", &credentials).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.header("x-ratelimit-remaining"), Some(expected_remaining));
    }

    let response = attacker.post("/api/auth/login", &credentials).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.header("retry-after").unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 15 * 60);

    // The admin login shares the class.
    let response = attacker
        .post("/admin/api/login", &json!({ "username": "studio", "password": "x" }))
        .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    // Other clients and other classes are unaffected.
    let bystander = app.client_from("192.0.2.67");
    let response = bystander.post("/api/auth/login", &credentials).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    let response = attacker.get("/api/session/csrf").await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_session_scopes_do_not_cross() {
    let app = TestApp::new();
    app.create_admin("studio").await;

    let customer = app.client();
    assert_eq!(customer.signup("ada@example.com").await.status, StatusCode::CREATED);
    let customer_session = customer.cookie(CUSTOMER_COOKIE_NAME).unwrap();
    assert_eq!(customer.get("/api/account/orders").await.status, StatusCode::OK);

    // The customer's session id under the admin cookie is not an admin.
    let forged = app.client_from("203.0.113.11");
    forged.set_cookie(ADMIN_COOKIE_NAME, &customer_session);
    let response = forged.get("/admin/api/orders").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(customer.get("/admin/api/orders").await.status, StatusCode::UNAUTHORIZED);

    let admin = app.client_from("198.51.100.20");
    assert_eq!(admin.admin_login("studio").await.status, StatusCode::OK);
    let admin_session = admin.cookie(ADMIN_COOKIE_NAME).unwrap();
    assert!(admin.cookie(CUSTOMER_COOKIE_NAME).is_none());
    assert_eq!(admin.get("/admin/api/orders").await.status, StatusCode::OK);
    assert_eq!(admin.get("/api/account/orders").await.status, StatusCode::UNAUTHORIZED);

    let forged = app.client_from("203.0.113.12");
    forged.set_cookie(CUSTOMER_COOKIE_NAME, &admin_session);
    let response = forged.get("/api/account/orders").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let app = TestApp::new();
    let client = app.client();

    for path in ["/health", "/api/session/csrf", "/admin/api/orders"] {
        let response = client.get(path).await;
        assert_eq!(response.header("x-frame-options"), Some("DENY"), "{path}");
        assert_eq!(response.header("x-content-type-options"), Some("nosniff"), "{path}");
        assert_eq!(response.header("cache-control"), Some("no-store"), "{path}");
        assert!(response.header("content-security-policy").is_some(), "{path}");
    }
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();
    let client = app.client();
    let response = client.get("/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!("ok"));
    assert_eq!(client.get("/health/ready").await.status, StatusCode::OK);
}
