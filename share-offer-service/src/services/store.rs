//! Persistence boundary used by the reconciliation engine and handlers.

use crate::models::{
    Application, NewApplication, NewPayment, Payment, SettlementRequest, Settings, SettingsUpdate,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

/// Query/update operations over applications, payments and settings.
///
/// Every method that touches more than one row (`settle`, `confirm_payment`,
/// `set_applications_paid`) is atomic: all of its writes commit or none do.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    /// Every application with a non-null payment reference, oldest first.
    async fn find_applications_with_reference(&self) -> Result<Vec<Application>, AppError>;

    /// Insert a confirmed bank-transfer payment and mark the application PAID.
    ///
    /// Fails with `Conflict` (and writes nothing) if the application has been
    /// settled since it was read.
    async fn settle(&self, request: SettlementRequest) -> Result<Payment, AppError>;

    async fn create_application(
        &self,
        application: NewApplication,
    ) -> Result<Application, AppError>;

    async fn get_application(&self, id: Uuid) -> Result<Option<Application>, AppError>;

    async fn list_recent_applications(&self, limit: i64) -> Result<Vec<Application>, AppError>;

    /// Manual admin override of the paid flag. Returns `None` for an unknown id.
    async fn set_application_paid(
        &self,
        id: Uuid,
        is_paid: bool,
    ) -> Result<Option<Application>, AppError>;

    /// Apply several paid-flag overrides in one transaction.
    async fn set_applications_paid(&self, updates: &[(Uuid, bool)]) -> Result<(), AppError>;

    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, AppError>;

    async fn set_payment_provider_reference(
        &self,
        payment_id: Uuid,
        provider_reference: &str,
    ) -> Result<(), AppError>;

    /// First payment whose provider or bank reference equals `reference`.
    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, AppError>;

    /// Most recently created payment for an application, if any.
    async fn find_latest_payment(
        &self,
        application_id: Uuid,
    ) -> Result<Option<Payment>, AppError>;

    /// Mark a payment CONFIRMED and its application PAID.
    async fn confirm_payment(&self, payment_id: Uuid) -> Result<Payment, AppError>;

    async fn fail_payment(&self, payment_id: Uuid) -> Result<(), AppError>;

    /// Sum of amounts and count of applications flagged paid.
    async fn paid_totals(&self) -> Result<(Decimal, i64), AppError>;

    async fn get_settings(&self) -> Result<Option<Settings>, AppError>;

    async fn upsert_settings(&self, update: SettingsUpdate) -> Result<Settings, AppError>;
}
