//! Stock ledger behaviour under concurrent webhook delivery.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use futures::future::join_all;
use serde_json::{Value, json};

use atelier_core::ProductId;
use atelier_integration_tests::{TestApp, TestClient};
use atelier_storefront::models::Notification;

/// Start a checkout for `quantity` rings and return the paid session object.
async fn paid_session(app: &TestApp, client: &TestClient, ring: ProductId, quantity: u32) -> Value {
    let response = client
        .post(
            "/api/checkout",
            &json!({
                "contact": { "email": "ada@example.com", "name": "Ada Lovelace" },
                "lineItems": [
                    { "productId": ring, "name": "Silver ring", "unitPrice": "80.00", "quantity": quantity },
                ],
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    json!({
        "id": response.body["sessionId"],
        "payment_status": "paid",
        "currency": "usd",
        "amount_total": response.body["total"]["minor"],
        "metadata": app.provider.last_request().metadata,
    })
}

#[tokio::test]
async fn test_concurrent_orders_clamp_at_zero() {
    let app = TestApp::new();
    let ring = app.seed_product("Silver ring", 3).await;
    let client = app.client();
    client.fetch_csrf().await;

    let first = paid_session(&app, &client, ring, 2).await;
    let second = paid_session(&app, &client, ring, 2).await;

    let responses = join_all([
        app.deliver_event("evt_a", "checkout.session.completed", &first),
        app.deliver_event("evt_b", "checkout.session.completed", &second),
    ])
    .await;
    assert!(responses.iter().all(|r| r.status == StatusCode::OK));

    // Both orders are paid; the ledger never goes negative.
    assert_eq!(app.stock(ring).await, 0);
    let orders = app.stores.orders.list(10, 0).await.unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders.iter().all(|o| o.payment_status.to_string() == "paid"));
}

#[tokio::test]
async fn test_concurrent_redelivery_applies_once() {
    let app = TestApp::new();
    let ring = app.seed_product("Silver ring", 10).await;
    let client = app.client();
    client.fetch_csrf().await;
    let session = paid_session(&app, &client, ring, 3).await;

    let deliveries = (0..8).map(|n| {
        let event_id = format!("evt_{}", n % 4);
        let session = session.clone();
        let app = &app;
        async move {
            app.deliver_event(&event_id, "checkout.session.completed", &session)
                .await
        }
    });
    let responses = join_all(deliveries).await;
    assert!(responses.iter().all(|r| r.status == StatusCode::OK));

    assert_eq!(app.stock(ring).await, 7);
    let confirmations = app
        .notifications()
        .await
        .into_iter()
        .filter(|n| matches!(n, Notification::OrderConfirmation { .. }))
        .count();
    assert_eq!(confirmations, 1);
}

#[tokio::test]
async fn test_unknown_product_still_settles_payment() {
    let app = TestApp::new();
    let ring = app.seed_product("Silver ring", 4).await;
    let client = app.client();
    client.fetch_csrf().await;

    let response = client
        .post(
            "/api/checkout",
            &json!({
                "contact": { "email": "ada@example.com", "name": "Ada Lovelace" },
                "lineItems": [
                    { "productId": ring, "name": "Silver ring", "unitPrice": "80.00", "quantity": 1 },
                    { "productId": ProductId::generate(), "name": "Gift wrap", "unitPrice": "5.00", "quantity": 1 },
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
        "amount_total": 8500,
        "metadata": app.provider.last_request().metadata,
    });

    let response = app
        .deliver_event("evt_wrap", "checkout.session.completed", &session)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.stock(ring).await, 3);

    let order = app
        .stores
        .orders
        .find_by_session(&session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.payment_status.to_string(), "paid");
}
