//! Admin order management over the admin session scope.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use atelier_integration_tests::{TestApp, TestClient};

/// Check out one ring and deliver the paid event. Returns the order id.
async fn paid_order(app: &TestApp) -> String {
    let ring = app.seed_product("Silver ring", 3).await;
    let customer = app.client();
    customer.fetch_csrf().await;
    let response = customer
        .post(
            "/api/checkout",
            &json!({
                "contact": { "email": "ada@example.com", "name": "Ada Lovelace" },
                "lineItems": [
                    { "productId": ring, "name": "Silver ring", "unitPrice": "150.00", "quantity": 1 },
                ],
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    let session_id = response.body["sessionId"].as_str().unwrap().to_owned();

    let session = json!({
        "id": session_id,
        "payment_status": "paid",
        "currency": "usd",
        "amount_total": 15000,
        "metadata": app.provider.last_request().metadata,
    });
    let response = app
        .deliver_event("evt_paid", "checkout.session.completed", &session)
        .await;
    assert_eq!(response.status, StatusCode::OK);

    app.stores
        .orders
        .find_by_session(&session_id)
        .await
        .unwrap()
        .unwrap()
        .id
        .to_string()
}

async fn signed_in_admin(app: &TestApp) -> TestClient {
    app.create_admin("studio").await;
    let admin = app.client_from("198.51.100.20");
    let response = admin.admin_login("studio").await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    assert_eq!(response.body["admin"]["username"], "studio");
    admin
}

#[tokio::test]
async fn test_admin_updates_fulfilment_but_not_paid_status() {
    let app = TestApp::new();
    let id = paid_order(&app).await;
    let admin = signed_in_admin(&app).await;
    let path = format!("/admin/api/orders/{id}");

    let response = admin.get("/admin/api/orders").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_array().unwrap().len(), 1);

    let response = admin.patch(&path, &json!({ "paymentStatus": "pending" })).await;
    assert_eq!(response.status, StatusCode::CONFLICT, "{:?}", response.body);

    let response = admin
        .patch(
            &path,
            &json!({
                "status": "shipped",
                "trackingNumber": "1Z999AA10123456784",
                "courierName": "UPS",
                "trackingUrl": "https://track.example/1Z999AA10123456784",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    assert_eq!(response.body["status"], "shipped");
    assert_eq!(response.body["paymentStatus"], "paid");
    assert_eq!(response.body["trackingNumber"], "1Z999AA10123456784");

    // Shipped orders cannot go back to pending.
    let response = admin.patch(&path, &json!({ "status": "pending" })).await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let response = admin.patch(&path, &json!({ "refund": true })).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = admin.patch(&path, &json!({})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = admin
        .patch(&path, &json!({ "trackingUrl": "javascript:alert(1)" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_deletes_order() {
    let app = TestApp::new();
    let id = paid_order(&app).await;
    let admin = signed_in_admin(&app).await;
    let path = format!("/admin/api/orders/{id}");

    let response = admin.delete(&path).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = admin.get(&path).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = admin.delete(&path).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = admin.get("/admin/api/orders/not-a-uuid").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_routes_require_admin_session() {
    let app = TestApp::new();
    let id = paid_order(&app).await;

    let anonymous = app.client();
    let response = anonymous.get("/admin/api/orders").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    let response = anonymous.get(&format!("/admin/api/orders/{id}")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    app.create_admin("studio").await;
    let wrong = app.client_from("198.51.100.30");
    let response = wrong
        .post(
            "/admin/api/login",
            &json!({ "username": "studio", "password": "not the password" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    let response = wrong.get("/admin/api/orders").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_logout_ends_session() {
    let app = TestApp::new();
    let admin = signed_in_admin(&app).await;
    let ring = app.seed_product("Silver ring", 7).await;

    let response = admin.get(&format!("/admin/api/products/{ring}/stock")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["stock"], 7);

    let response = admin.post("/admin/api/logout", &json!({})).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = admin.get("/admin/api/orders").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}
