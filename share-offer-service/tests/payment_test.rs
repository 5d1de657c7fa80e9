//! Integration tests for the pay-by-bank flow and public rate limiting.

mod common;

use common::{spawn_app, spawn_app_with_rate_limit, TestApp};
use serde_json::{json, Value};
use share_offer_service::models::{ApplicationStatus, PaymentStatus};
use uuid::Uuid;

async fn initiate(app: &TestApp, application_id: Uuid) -> reqwest::Response {
    app.client
        .post(app.url("/payments/initiate"))
        .json(&json!({ "applicationId": application_id }))
        .send()
        .await
        .expect("Failed to initiate payment")
}

async fn webhook(app: &TestApp, reference: &str, status: &str) -> reqwest::Response {
    app.client
        .post(app.url("/webhooks/payment"))
        .json(&json!({ "reference": reference, "status": status }))
        .send()
        .await
        .expect("Failed to send webhook")
}

#[tokio::test]
async fn initiating_payment_returns_tracking_url() {
    let app = spawn_app().await;
    let application = app
        .seed("MAY-0001-AAAA", "250", ApplicationStatus::Pending)
        .await;

    let response = initiate(&app, application.id).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["url"],
        "http://shares.test/invest/track?appId=MAY-0001-AAAA&mock_payment=true"
    );

    let payments = app.store.payments_for(application.id).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status(), PaymentStatus::Pending);
    assert_eq!(payments[0].payment_method, "PAY_BY_BANK");
    assert!(payments[0]
        .provider_reference
        .as_deref()
        .is_some_and(|r| r.starts_with("mock_")));
}

#[tokio::test]
async fn initiating_payment_for_unknown_application_is_not_found() {
    let app = spawn_app().await;

    let response = initiate(&app, Uuid::new_v4()).await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn successful_webhook_confirms_payment_and_marks_application_paid() {
    let app = spawn_app().await;
    let application = app
        .seed("MAY-0001-AAAA", "250", ApplicationStatus::Pending)
        .await;
    initiate(&app, application.id).await;
    let provider_reference = app.store.payments_for(application.id).await[0]
        .provider_reference
        .clone()
        .unwrap();

    let response = webhook(&app, &provider_reference, "success").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "received": true }));

    let payment = &app.store.payments_for(application.id).await[0];
    assert_eq!(payment.status(), PaymentStatus::Confirmed);
    assert!(payment.confirmed_at.is_some());

    let list: Value = app
        .admin_get("/admin/applications")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list[0]["status"], "PAID");
    assert_eq!(list[0]["isPaid"], true);

    let again = webhook(&app, &provider_reference, "success").await;
    let body: Value = again.json().await.unwrap();
    assert_eq!(body["message"], "Already confirmed");
}

#[tokio::test]
async fn failed_webhook_matched_by_bank_reference_fails_payment() {
    let app = spawn_app().await;
    let application = app
        .seed("MAY-0002-BBBB", "400", ApplicationStatus::Pending)
        .await;
    initiate(&app, application.id).await;

    let response = webhook(&app, "MAY-0002-BBBB", "cancelled").await;
    assert_eq!(response.status(), 200);

    let payment = &app.store.payments_for(application.id).await[0];
    assert_eq!(payment.status(), PaymentStatus::Failed);
    assert!(payment.confirmed_at.is_none());
}

#[tokio::test]
async fn webhook_for_unknown_reference_is_not_found() {
    let app = spawn_app().await;

    let response = webhook(&app, "mock_0", "success").await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn public_submissions_are_rate_limited() {
    let app = spawn_app_with_rate_limit(2).await;
    let submit = || {
        app.client
            .post(app.url("/applications"))
            .json(&json!({
                "firstName": "Ada",
                "lastName": "Lovelace",
                "email": "ada@example.com",
                "amount": 300
            }))
            .send()
    };

    let first = submit().await.unwrap();
    assert_eq!(first.status(), 201);

    let second = submit().await.unwrap();
    assert_eq!(second.status(), 429);
    assert!(second.headers().contains_key("retry-after"));

    let health = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(health.status(), 200);
}

async fn application_status(app: &TestApp, application_id: Uuid) -> reqwest::Response {
    app.client
        .get(app.url(&format!("/applications/{}", application_id)))
        .send()
        .await
        .expect("Failed to fetch application status")
}

#[tokio::test]
async fn pending_application_status_shows_reference_and_latest_payment() {
    let app = spawn_app().await;
    let application = app
        .seed("MAY-0001-AAAA", "250", ApplicationStatus::Pending)
        .await;

    let before: Value = application_status(&app, application.id)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(before["reference"], "MAY-0001-AAAA");
    assert_eq!(before["status"], "PENDING");
    assert_eq!(before["isPaid"], false);
    assert_eq!(before["amount"], json!(250.0));
    assert_eq!(before["investorName"], "Test Investor");
    assert_eq!(before["latestPayment"], Value::Null);

    initiate(&app, application.id).await;

    let response = application_status(&app, application.id).await;
    assert_eq!(response.status(), 200);
    let after: Value = response.json().await.unwrap();
    assert_eq!(after["isPaid"], false);
    assert_eq!(after["latestPayment"]["status"], "PENDING");
    assert_eq!(after["latestPayment"]["paymentMethod"], "PAY_BY_BANK");
}

#[tokio::test]
async fn paid_application_status_reports_paid() {
    let app = spawn_app().await;
    let application = app
        .seed("MAY-0002-BBBB", "400", ApplicationStatus::Pending)
        .await;
    initiate(&app, application.id).await;
    webhook(&app, "MAY-0002-BBBB", "success").await;

    let body: Value = application_status(&app, application.id)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "PAID");
    assert_eq!(body["isPaid"], true);
    assert_eq!(body["latestPayment"]["status"], "CONFIRMED");
    assert!(body["latestPayment"]["confirmedAt"].is_string());
}

#[tokio::test]
async fn status_for_unknown_application_is_not_found() {
    let app = spawn_app().await;

    let response = application_status(&app, Uuid::new_v4()).await;

    assert_eq!(response.status(), 404);
}
