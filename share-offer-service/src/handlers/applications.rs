use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::prelude::ToPrimitive;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        ApplicationResponse, ApplicationStatusResponse, BatchPaidRequest, BatchPaidResponse,
        CreateApplicationRequest, CreateApplicationResponse, TogglePaidRequest,
    },
    models::NewApplication,
    startup::AppState,
};

/// How many applications the admin list shows.
pub const RECENT_APPLICATIONS_LIMIT: i64 = 50;

/// Public application submission. One share per whole pound.
pub async fn create_application(
    State(state): State<AppState>,
    Json(payload): Json<CreateApplicationRequest>,
) -> Result<(StatusCode, Json<CreateApplicationResponse>), AppError> {
    payload.validate()?;

    let shares = payload.amount.trunc().to_i32().ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("Investment amount is out of range"))
    })?;

    let application = state
        .store
        .create_application(NewApplication {
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            email: payload.email.trim().to_lowercase(),
            amount: payload.amount,
            shares,
        })
        .await?;

    tracing::info!(
        application_id = %application.id,
        amount = %application.amount,
        "Application submitted"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateApplicationResponse {
            application_id: application.id,
            reference: application.payment_reference.unwrap_or_default(),
        }),
    ))
}

/// Public status lookup for the investor tracking page.
pub async fn get_application_status(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
) -> Result<Json<ApplicationStatusResponse>, AppError> {
    let application = state
        .store
        .get_application(application_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Application not found")))?;
    let latest_payment = state.store.find_latest_payment(application.id).await?;

    Ok(Json(ApplicationStatusResponse::new(
        application,
        latest_payment,
    )))
}

pub async fn list_applications(
    State(state): State<AppState>,
) -> Result<Json<Vec<ApplicationResponse>>, AppError> {
    let applications = state
        .store
        .list_recent_applications(RECENT_APPLICATIONS_LIMIT)
        .await?;

    Ok(Json(
        applications
            .into_iter()
            .map(ApplicationResponse::from)
            .collect(),
    ))
}

/// Manually mark one application paid or unpaid.
pub async fn set_application_paid(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Json(payload): Json<TogglePaidRequest>,
) -> Result<Json<ApplicationResponse>, AppError> {
    tracing::info!(
        application_id = %application_id,
        is_paid = payload.is_paid,
        "Updating paid flag"
    );

    let application = state
        .store
        .set_application_paid(application_id, payload.is_paid)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Application not found")))?;

    Ok(Json(ApplicationResponse::from(application)))
}

/// Apply several paid flags at once; nothing changes if any id is unknown.
pub async fn set_applications_paid(
    State(state): State<AppState>,
    Json(payload): Json<BatchPaidRequest>,
) -> Result<Json<BatchPaidResponse>, AppError> {
    payload.validate()?;

    let updates: Vec<(Uuid, bool)> = payload
        .updates
        .iter()
        .map(|update| (update.id, update.is_paid))
        .collect();

    tracing::info!(count = updates.len(), "Updating paid flags in batch");
    state.store.set_applications_paid(&updates).await?;

    Ok(Json(BatchPaidResponse {
        updated: updates.len(),
    }))
}
