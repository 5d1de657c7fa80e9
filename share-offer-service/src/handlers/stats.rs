use axum::{extract::State, Json};
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{SettingsResponse, StatsResponse, UpdateSettingsRequest},
    models::{
        default_raise_end_date, Settings, SettingsUpdate, DEFAULT_MINIMUM_RAISE,
        DEFAULT_TARGET_RAISE,
    },
    startup::AppState,
};

/// Raise progress from paid totals and the configured targets. A zero target
/// in the settings row falls back to the default.
pub fn fundraising_stats(
    settings: Option<&Settings>,
    total_raised: Decimal,
    investor_count: i64,
) -> StatsResponse {
    let or_default = |value: Option<Decimal>, default: Decimal| {
        value.filter(|v| !v.is_zero()).unwrap_or(default)
    };
    let target_amount = or_default(settings.map(|s| s.target_raise_amount), DEFAULT_TARGET_RAISE);
    let minimum_amount = or_default(settings.map(|s| s.min_raise_amount), DEFAULT_MINIMUM_RAISE);
    let raise_end_date = settings
        .map(|s| s.raise_end_date)
        .unwrap_or_else(default_raise_end_date);

    let percentage = (total_raised * Decimal::ONE_HUNDRED)
        .checked_div(minimum_amount)
        .unwrap_or_default()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    StatsResponse {
        total_raised,
        investor_count,
        target_amount,
        minimum_amount,
        percentage,
        raise_end_date,
    }
}

pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let settings = state.store.get_settings().await?;
    let (total_raised, investor_count) = state.store.paid_totals().await?;

    Ok(Json(fundraising_stats(
        settings.as_ref(),
        total_raised,
        investor_count,
    )))
}

pub async fn get_settings(
    State(state): State<AppState>,
) -> Result<Json<Option<SettingsResponse>>, AppError> {
    let settings = state.store.get_settings().await?;
    Ok(Json(settings.map(SettingsResponse::from)))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, AppError> {
    payload.validate()?;

    let settings = state
        .store
        .upsert_settings(SettingsUpdate {
            min_raise_amount: payload.min_raise_amount,
            target_raise_amount: payload.target_raise_amount,
            raise_end_date: payload.raise_end_date,
        })
        .await?;

    tracing::info!(
        min_raise_amount = %settings.min_raise_amount,
        target_raise_amount = %settings.target_raise_amount,
        "Raise settings saved"
    );

    Ok(Json(SettingsResponse::from(settings)))
}
