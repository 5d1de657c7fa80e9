use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        InitiatePaymentRequest, InitiatePaymentResponse, PaymentWebhookRequest,
        PaymentWebhookResponse,
    },
    models::{NewPayment, PaymentMethod, PaymentStatus},
    services::{metrics, WebhookOutcome},
    startup::AppState,
};

/// Start a pay-by-bank payment for an application and return the provider URL.
pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<Json<InitiatePaymentResponse>, AppError> {
    let application = state
        .store
        .get_application(payload.application_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Application not found")))?;

    let payment = state
        .store
        .create_payment(NewPayment {
            application_id: application.id,
            amount: application.amount,
            method: PaymentMethod::PayByBank,
            bank_reference: application.payment_reference.clone(),
            provider_reference: None,
            status: PaymentStatus::Pending,
        })
        .await?;

    let reference = application
        .payment_reference
        .clone()
        .unwrap_or_else(|| payment.id.to_string());
    let initiated = state.payment_provider.initiate_payment(&reference);

    state
        .store
        .set_payment_provider_reference(payment.id, &initiated.provider_reference)
        .await?;

    metrics::record_payment_event("initiated", PaymentStatus::Pending.as_str());
    tracing::info!(
        application_id = %application.id,
        payment_id = %payment.id,
        "Payment initiated"
    );

    Ok(Json(InitiatePaymentResponse { url: initiated.url }))
}

/// Provider callback. The reference may be the provider's or the bank one.
pub async fn payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PaymentWebhookRequest>,
) -> Result<Json<PaymentWebhookResponse>, AppError> {
    let payment = state
        .store
        .find_payment_by_reference(&payload.reference)
        .await?
        .ok_or_else(|| {
            tracing::warn!(reference = %payload.reference, "Payment not found for webhook");
            AppError::NotFound(anyhow::anyhow!("Payment not found"))
        })?;

    if payment.status() == PaymentStatus::Confirmed {
        return Ok(Json(PaymentWebhookResponse {
            received: true,
            message: Some("Already confirmed".to_string()),
        }));
    }

    match state.payment_provider.handle_webhook(&payload.status) {
        WebhookOutcome::Confirmed => {
            state.store.confirm_payment(payment.id).await?;
            metrics::record_payment_event("webhook", PaymentStatus::Confirmed.as_str());
            tracing::info!(
                payment_id = %payment.id,
                application_id = %payment.application_id,
                "Payment confirmed by provider"
            );
        }
        WebhookOutcome::Failed => {
            state.store.fail_payment(payment.id).await?;
            metrics::record_payment_event("webhook", PaymentStatus::Failed.as_str());
            tracing::warn!(
                payment_id = %payment.id,
                status = %payload.status,
                "Payment failed at provider"
            );
        }
    }

    Ok(Json(PaymentWebhookResponse {
        received: true,
        message: None,
    }))
}
