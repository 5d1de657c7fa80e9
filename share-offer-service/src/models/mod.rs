//! Domain models for share-offer-service.

#![allow(clippy::should_implement_trait)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Application Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationStatus {
    Draft,
    Pending,
    Paid,
    Completed,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "DRAFT" => Self::Draft,
            "PENDING" => Self::Pending,
            "PAID" => Self::Paid,
            "COMPLETED" => Self::Completed,
            _ => Self::Pending,
        }
    }

    /// PAID and COMPLETED applications are never matched again automatically.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Paid | Self::Completed)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Application {
    pub id: Uuid,
    pub shareholder_first_name: String,
    pub shareholder_last_name: String,
    pub shareholder_email: String,
    pub amount: Decimal,
    pub shares: i32,
    pub status: String,
    pub payment_reference: Option<String>,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn status(&self) -> ApplicationStatus {
        ApplicationStatus::from_str(&self.status)
    }

    pub fn applicant_name(&self) -> String {
        format!(
            "{} {}",
            self.shareholder_first_name, self.shareholder_last_name
        )
    }
}

/// Input for a newly submitted application.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub amount: Decimal,
    pub shares: i32,
}

// ============================================================================
// Payment Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "CONFIRMED" => Self::Confirmed,
            "FAILED" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    BankTransfer,
    PayByBank,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankTransfer => "BANK_TRANSFER",
            Self::PayByBank => "PAY_BY_BANK",
            Self::Card => "CARD",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "PAY_BY_BANK" => Self::PayByBank,
            "CARD" => Self::Card,
            _ => Self::BankTransfer,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub application_id: Uuid,
    pub amount: Decimal,
    pub payment_method: String,
    pub bank_reference: Option<String>,
    pub provider_reference: Option<String>,
    pub status: String,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_str(&self.status)
    }
}

/// Payment row to insert.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub application_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub bank_reference: Option<String>,
    pub provider_reference: Option<String>,
    pub status: PaymentStatus,
}

/// A statement row that matched an unsettled application.
///
/// Settling inserts a confirmed bank-transfer payment and marks the
/// application PAID in one transaction.
#[derive(Debug, Clone)]
pub struct SettlementRequest {
    pub application_id: Uuid,
    pub amount: Decimal,
    pub bank_reference: String,
    pub confirmed_at: DateTime<Utc>,
}

// ============================================================================
// Settings Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct Settings {
    pub id: Uuid,
    pub min_raise_amount: Decimal,
    pub target_raise_amount: Decimal,
    pub raise_end_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SettingsUpdate {
    pub min_raise_amount: Decimal,
    pub target_raise_amount: Decimal,
    pub raise_end_date: DateTime<Utc>,
}

pub const DEFAULT_TARGET_RAISE: Decimal = Decimal::from_parts(2_700_000, 0, 0, false, 0);
pub const DEFAULT_MINIMUM_RAISE: Decimal = Decimal::from_parts(1_300_000, 0, 0, false, 0);

pub fn default_raise_end_date() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2025, 3, 28)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or_else(Utc::now)
}
