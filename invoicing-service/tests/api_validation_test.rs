//! Request validation behavior through the assembled router. None of these
//! tests require a reachable database or SMTP server.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{test_app, TEST_API_KEY};
use http_body_util::BodyExt;
use serde_json::json;
use tower::util::ServiceExt;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("Failed to parse JSON body")
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("X-API-Key", TEST_API_KEY)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn empty_customer_payload_fails_validation() {
    let app = test_app();

    let response = app.oneshot(post("/api/customers", json!({}))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid input data");
    let errors = body["errors"].as_array().unwrap();
    assert!(errors.iter().any(|e| e == "First name is required"));
    assert!(errors.iter().any(|e| e == "Last name is required"));
    assert!(errors.iter().any(|e| e == "State is required"));
}

#[tokio::test]
async fn invoice_without_items_fails_validation() {
    let app = test_app();

    let response = app
        .oneshot(post(
            "/api/invoices",
            json!({
                "customerId": 1,
                "invoiceDate": "2026-01-15",
                "taxRate": "8.25",
                "invoiceItems": []
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Invalid input data");
    let errors = body["errors"].as_array().unwrap();
    assert!(errors
        .iter()
        .any(|e| e == "At least one invoice item is required"));
}

#[tokio::test]
async fn invoice_item_problems_are_reported_per_item() {
    let app = test_app();

    let response = app
        .oneshot(post(
            "/api/invoices",
            json!({
                "customerId": 1,
                "invoiceDate": "2026-01-15",
                "taxRate": "8.25",
                "invoiceItems": [
                    {"productName": "Widget", "quantity": "0", "unitPrice": "10.00"},
                    {"productName": "", "quantity": "2", "unitPrice": "-1"}
                ]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    let errors = body["errors"].as_array().unwrap();
    assert!(errors
        .iter()
        .any(|e| e == "Item 1: Quantity must be greater than 0"));
    assert!(errors.iter().any(|e| e == "Item 2: Product name is required"));
    assert!(errors
        .iter()
        .any(|e| e == "Item 2: Unit price cannot be negative"));
}

#[tokio::test]
async fn calculate_totals_requires_items() {
    let app = test_app();

    let response = app
        .oneshot(post(
            "/api/invoices/calculate-totals",
            json!({"items": [], "taxRate": "10"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["message"], "At least one item is required");
}

#[tokio::test]
async fn calculate_totals_rejects_invalid_items() {
    let app = test_app();

    let response = app
        .oneshot(post(
            "/api/invoices/calculate-totals",
            json!({
                "items": [{"productName": "Widget", "quantity": "-1", "unitPrice": "5.00"}],
                "taxRate": "10"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Invalid item data");
    assert_eq!(
        body["errors"],
        json!(["Quantity must be greater than 0"])
    );
}

#[tokio::test]
async fn test_email_without_address_is_rejected() {
    let app = test_app();

    let response = app
        .oneshot(post("/api/invoices/test-email", json!({"email": "   "})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Email address is required");
}

#[tokio::test]
async fn test_email_reports_simulation_mode() {
    let app = test_app();

    let response = app
        .oneshot(post(
            "/api/invoices/test-email",
            json!({"email": "ops@example.com"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Test email sent successfully");
    assert_eq!(body["data"]["email"], "ops@example.com");
    assert_eq!(body["data"]["emailMode"], "Simulation");
    assert_eq!(body["data"]["subject"], "Test Email from Invoicing System");
}

#[tokio::test]
async fn database_failures_surface_as_operation_errors() {
    let app = test_app();

    // Valid payload, unreachable database: the pool times out and the
    // client sees the operation-specific message, not internals.
    let response = app
        .oneshot(post(
            "/api/customers",
            json!({
                "firstName": "Ada",
                "lastName": "Lovelace",
                "email": "ada@example.com",
                "state": "CA"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(
        body["message"],
        "An error occurred while creating the customer"
    );
}
