use crate::models::{Application, Payment, Settings};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub const MIN_INVESTMENT: Decimal = Decimal::from_parts(250, 0, 0, false, 0);
pub const MAX_INVESTMENT: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

fn validate_investment_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount < MIN_INVESTMENT || *amount > MAX_INVESTMENT {
        let mut err = ValidationError::new("investment_amount");
        err.message = Some("Investment must be between £250 and £100,000".into());
        return Err(err);
    }
    Ok(())
}

fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() || amount.is_zero() {
        let mut err = ValidationError::new("positive_amount");
        err.message = Some("Amount must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}

// ============================================================================
// Applications
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationRequest {
    #[validate(length(min = 2, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 2, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(custom(function = "validate_investment_amount"))]
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationResponse {
    pub application_id: Uuid,
    pub reference: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareholderSummary {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationResponse {
    pub id: Uuid,
    pub payment_reference: Option<String>,
    pub amount: Decimal,
    pub shares: i32,
    pub status: String,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub shareholder: ShareholderSummary,
}

impl From<Application> for ApplicationResponse {
    fn from(application: Application) -> Self {
        Self {
            id: application.id,
            payment_reference: application.payment_reference,
            amount: application.amount,
            shares: application.shares,
            status: application.status,
            is_paid: application.is_paid,
            paid_at: application.paid_at,
            created_at: application.created_at,
            shareholder: ShareholderSummary {
                first_name: application.shareholder_first_name,
                last_name: application.shareholder_last_name,
                email: application.shareholder_email,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub id: Uuid,
    pub amount: Decimal,
    pub payment_method: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentSummary {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            amount: payment.amount,
            payment_method: payment.payment_method,
            status: payment.status,
            created_at: payment.created_at,
            confirmed_at: payment.confirmed_at,
        }
    }
}

/// What an investor sees when tracking their application.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatusResponse {
    pub id: Uuid,
    pub reference: Option<String>,
    pub investor_name: String,
    pub amount: Decimal,
    pub shares: i32,
    pub status: String,
    /// PAID or COMPLETED.
    pub is_paid: bool,
    pub latest_payment: Option<PaymentSummary>,
}

impl ApplicationStatusResponse {
    pub fn new(application: Application, latest_payment: Option<Payment>) -> Self {
        Self {
            id: application.id,
            investor_name: application.applicant_name(),
            is_paid: application.status().is_settled(),
            reference: application.payment_reference,
            amount: application.amount,
            shares: application.shares,
            status: application.status,
            latest_payment: latest_payment.map(PaymentSummary::from),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TogglePaidRequest {
    pub is_paid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidUpdate {
    pub id: Uuid,
    pub is_paid: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BatchPaidRequest {
    #[validate(length(min = 1, message = "At least one update is required"))]
    pub updates: Vec<PaidUpdate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchPaidResponse {
    pub updated: usize,
}

// ============================================================================
// Payments
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub application_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitiatePaymentResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhookRequest {
    pub reference: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentWebhookResponse {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Stats & Settings
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_raised: Decimal,
    pub investor_count: i64,
    pub target_amount: Decimal,
    pub minimum_amount: Decimal,
    pub percentage: Decimal,
    pub raise_end_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    #[validate(custom(function = "validate_positive_amount"))]
    pub min_raise_amount: Decimal,
    #[validate(custom(function = "validate_positive_amount"))]
    pub target_raise_amount: Decimal,
    pub raise_end_date: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub id: Uuid,
    pub min_raise_amount: Decimal,
    pub target_raise_amount: Decimal,
    pub raise_end_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Settings> for SettingsResponse {
    fn from(settings: Settings) -> Self {
        Self {
            id: settings.id,
            min_raise_amount: settings.min_raise_amount,
            target_raise_amount: settings.target_raise_amount,
            raise_end_date: settings.raise_end_date,
            updated_at: settings.updated_at,
        }
    }
}
