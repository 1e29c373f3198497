//! Custom order lifecycle: submission, quote, payment.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use atelier_integration_tests::TestApp;
use atelier_storefront::models::Notification;

const EMAIL: &str = "grace@example.com";

async fn submit(app: &TestApp) -> (String, String) {
    let client = app.client();
    client.fetch_csrf().await;
    let response = client
        .post(
            "/api/custom-orders",
            &json!({
                "contact": { "email": EMAIL, "name": "Grace Hopper" },
                "orderType": "scratch",
                "material": "Sterling silver",
                "description": "A signet ring with a compass rose",
                "referenceImages": ["https://images.example/rose.jpg"],
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    assert_eq!(response.body["status"], "pending_quote");
    assert!(response.body["price"].is_null());

    let friendly_id = response.body["friendlyId"].as_str().unwrap().to_owned();
    let id = app
        .stores
        .custom_orders
        .find_by_friendly_id(&atelier_core::FriendlyId::parse(&friendly_id).unwrap())
        .await
        .unwrap()
        .unwrap()
        .id
        .to_string();
    (friendly_id, id)
}

#[tokio::test]
async fn test_custom_order_quote_then_pay() {
    let app = TestApp::new();
    app.create_admin("studio").await;
    let (friendly_id, id) = submit(&app).await;
    assert!(friendly_id.starts_with("CO-"));

    let customer = app.client();
    customer.fetch_csrf().await;

    // Not payable before it is priced.
    let checkout_path = format!("/api/custom-orders/{friendly_id}/checkout");
    let response = customer.post(&checkout_path, &json!({ "email": EMAIL })).await;
    assert_eq!(response.status, StatusCode::CONFLICT, "{:?}", response.body);
    assert!(app.provider.requests().is_empty());

    let admin = app.client_from("198.51.100.20");
    assert_eq!(admin.admin_login("studio").await.status, StatusCode::OK);
    let response = admin
        .patch(
            &format!("/admin/api/custom-orders/{id}/quote"),
            &json!({ "price": "200.00" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    assert_eq!(response.body["status"], "awaiting_payment");

    // Someone else's email cannot see or pay it.
    let response = customer
        .post(&checkout_path, &json!({ "email": "mallory@example.com" }))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = customer.post(&checkout_path, &json!({ "email": EMAIL })).await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    assert_eq!(response.body["total"]["minor"], 20000);
    assert_eq!(response.body["reference"], friendly_id.as_str());

    let request = app.provider.last_request();
    assert_eq!(request.total_minor(), Some(20000));
    let session = json!({
        "id": response.body["sessionId"],
        "payment_status": "paid",
        "currency": "usd",
        "amount_total": 20000,
        "metadata": request.metadata,
        "shipping_details": {
            "name": "Grace Hopper",
            "address": { "line1": "1 Navy Yard", "city": "Arlington", "country": "US" },
        },
    });
    let response = app
        .deliver_event("evt_custom", "checkout.session.completed", &session)
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = customer
        .get(&format!("/api/custom-orders/{friendly_id}?email={EMAIL}"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "paid");
    assert!(!response.body["paidAt"].is_null());

    // Paid work cannot be re-priced or paid again.
    let response = admin
        .patch(
            &format!("/admin/api/custom-orders/{id}/quote"),
            &json!({ "price": "10.00" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    let response = customer.post(&checkout_path, &json!({ "email": EMAIL })).await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let notifications = app.notifications().await;
    let paid = notifications
        .iter()
        .filter(|n| matches!(n, Notification::CustomOrderPaid { .. }))
        .count();
    assert_eq!(paid, 1);
    assert!(
        notifications
            .iter()
            .any(|n| matches!(n, Notification::QuoteReady { .. }))
    );
}

#[tokio::test]
async fn test_custom_order_lookup_requires_matching_email() {
    let app = TestApp::new();
    let (friendly_id, _) = submit(&app).await;
    let client = app.client();

    let response = client
        .get(&format!("/api/custom-orders/{friendly_id}?email={EMAIL}"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["friendlyId"], friendly_id.as_str());
    // Contact details are not part of the public view.
    assert!(response.body.get("contact").is_none());

    let response = client
        .get(&format!("/api/custom-orders/{friendly_id}?email=eve@example.com"))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = client
        .get(&format!("/api/custom-orders/CO-NOPE00?email={EMAIL}"))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = client.get(&format!("/api/custom-orders/{friendly_id}")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_custom_order_submission_is_validated() {
    let app = TestApp::new();
    let client = app.client();
    client.fetch_csrf().await;

    let response = client
        .post(
            "/api/custom-orders",
            &json!({
                "contact": { "email": EMAIL, "name": "Grace" },
                "orderType": "scratch",
                "material": "  ",
                "description": "A ring",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = client
        .post(
            "/api/custom-orders",
            &json!({
                "contact": { "email": EMAIL, "name": "Grace" },
                "orderType": "teleport",
                "material": "Gold",
                "description": "A ring",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}
