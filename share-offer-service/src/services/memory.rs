//! In-process [`ApplicationStore`] used when no database is configured and by
//! the test suites.

use crate::models::{
    Application, ApplicationStatus, NewApplication, NewPayment, Payment, PaymentMethod,
    PaymentStatus, SettlementRequest, Settings, SettingsUpdate,
};
use crate::reconciliation::reference::generate_reference_code;
use crate::services::store::ApplicationStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    applications: Vec<Application>,
    payments: Vec<Payment>,
    settings: Option<Settings>,
    settlement_failure: Option<String>,
}

impl State {
    fn application_mut(&mut self, id: Uuid) -> Option<&mut Application> {
        self.applications.iter_mut().find(|a| a.id == id)
    }
}

fn mark_paid(application: &mut Application, is_paid: bool, at: DateTime<Utc>) {
    if is_paid {
        application.status = ApplicationStatus::Paid.as_str().to_string();
        application.is_paid = true;
        application.paid_at = Some(at);
    } else {
        application.status = ApplicationStatus::Pending.as_str().to_string();
        application.is_paid = false;
        application.paid_at = None;
    }
    application.updated_at = Utc::now();
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed application as is.
    pub async fn insert_application(&self, application: Application) {
        self.state.lock().await.applications.push(application);
    }

    /// Insert an application with the given reference, amount and status.
    pub async fn seed_application(
        &self,
        reference: &str,
        amount: Decimal,
        status: ApplicationStatus,
    ) -> Application {
        let now = Utc::now();
        let application = Application {
            id: Uuid::new_v4(),
            shareholder_first_name: "Test".to_string(),
            shareholder_last_name: "Investor".to_string(),
            shareholder_email: format!("{}@example.com", reference.to_lowercase()),
            amount,
            shares: amount.trunc().to_i32().unwrap_or_default(),
            status: status.as_str().to_string(),
            payment_reference: Some(reference.to_string()),
            is_paid: status.is_settled(),
            paid_at: status.is_settled().then_some(now),
            created_at: now,
            updated_at: now,
        };
        self.insert_application(application.clone()).await;
        application
    }

    /// Make every later `settle` call fail with `reason` (pass `None` to clear).
    pub async fn fail_settlements(&self, reason: Option<&str>) {
        self.state.lock().await.settlement_failure = reason.map(str::to_string);
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.state.lock().await.payments.clone()
    }

    pub async fn payments_for(&self, application_id: Uuid) -> Vec<Payment> {
        self.state
            .lock()
            .await
            .payments
            .iter()
            .filter(|p| p.application_id == application_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn find_applications_with_reference(&self) -> Result<Vec<Application>, AppError> {
        let state = self.state.lock().await;
        let mut applications: Vec<Application> = state
            .applications
            .iter()
            .filter(|a| a.payment_reference.is_some())
            .cloned()
            .collect();
        applications.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(applications)
    }

    async fn settle(&self, request: SettlementRequest) -> Result<Payment, AppError> {
        let mut state = self.state.lock().await;
        if let Some(reason) = &state.settlement_failure {
            return Err(AppError::DatabaseError(anyhow::anyhow!("{}", reason)));
        }

        let application = state.application_mut(request.application_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Application {} not found",
                request.application_id
            ))
        })?;
        if application.status().is_settled() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Application {} is already settled",
                request.application_id
            )));
        }
        mark_paid(application, true, request.confirmed_at);

        let payment = Payment {
            id: Uuid::new_v4(),
            application_id: request.application_id,
            amount: request.amount,
            payment_method: PaymentMethod::BankTransfer.as_str().to_string(),
            bank_reference: Some(request.bank_reference),
            provider_reference: None,
            status: PaymentStatus::Confirmed.as_str().to_string(),
            confirmed_at: Some(request.confirmed_at),
            created_at: Utc::now(),
        };
        state.payments.push(payment.clone());
        Ok(payment)
    }

    async fn create_application(
        &self,
        application: NewApplication,
    ) -> Result<Application, AppError> {
        let now = Utc::now();
        let application = Application {
            id: Uuid::new_v4(),
            shareholder_first_name: application.first_name,
            shareholder_last_name: application.last_name,
            shareholder_email: application.email,
            amount: application.amount,
            shares: application.shares,
            status: ApplicationStatus::Pending.as_str().to_string(),
            payment_reference: Some(generate_reference_code()),
            is_paid: false,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        self.insert_application(application.clone()).await;
        Ok(application)
    }

    async fn get_application(&self, id: Uuid) -> Result<Option<Application>, AppError> {
        let state = self.state.lock().await;
        Ok(state.applications.iter().find(|a| a.id == id).cloned())
    }

    async fn list_recent_applications(&self, limit: i64) -> Result<Vec<Application>, AppError> {
        let state = self.state.lock().await;
        let mut applications = state.applications.clone();
        applications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        applications.truncate(usize::try_from(limit).unwrap_or_default());
        Ok(applications)
    }

    async fn set_application_paid(
        &self,
        id: Uuid,
        is_paid: bool,
    ) -> Result<Option<Application>, AppError> {
        let mut state = self.state.lock().await;
        Ok(state.application_mut(id).map(|application| {
            mark_paid(application, is_paid, Utc::now());
            application.clone()
        }))
    }

    async fn set_applications_paid(&self, updates: &[(Uuid, bool)]) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if let Some((missing, _)) = updates
            .iter()
            .find(|(id, _)| !state.applications.iter().any(|a| a.id == *id))
        {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Application {} not found",
                missing
            )));
        }

        let now = Utc::now();
        for (id, is_paid) in updates {
            if let Some(application) = state.application_mut(*id) {
                mark_paid(application, *is_paid, now);
            }
        }
        Ok(())
    }

    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, AppError> {
        let mut state = self.state.lock().await;
        if !state.applications.iter().any(|a| a.id == payment.application_id) {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Application {} not found",
                payment.application_id
            )));
        }

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            application_id: payment.application_id,
            amount: payment.amount,
            payment_method: payment.method.as_str().to_string(),
            bank_reference: payment.bank_reference,
            provider_reference: payment.provider_reference,
            status: payment.status.as_str().to_string(),
            confirmed_at: (payment.status == PaymentStatus::Confirmed).then_some(now),
            created_at: now,
        };
        state.payments.push(payment.clone());
        Ok(payment)
    }

    async fn set_payment_provider_reference(
        &self,
        payment_id: Uuid,
        provider_reference: &str,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let payment = state
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment {} not found", payment_id)))?;
        payment.provider_reference = Some(provider_reference.to_string());
        Ok(())
    }

    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .find(|p| {
                p.provider_reference.as_deref() == Some(reference)
                    || p.bank_reference.as_deref() == Some(reference)
            })
            .cloned())
    }

    async fn find_latest_payment(
        &self,
        application_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| p.application_id == application_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn confirm_payment(&self, payment_id: Uuid) -> Result<Payment, AppError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let application_id = state
            .payments
            .iter()
            .find(|p| p.id == payment_id)
            .map(|p| p.application_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment {} not found", payment_id)))?;
        let application = state.application_mut(application_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Application {} not found", application_id))
        })?;
        mark_paid(application, true, now);

        let payment = state
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment {} not found", payment_id)))?;
        payment.status = PaymentStatus::Confirmed.as_str().to_string();
        payment.confirmed_at = Some(now);
        Ok(payment.clone())
    }

    async fn fail_payment(&self, payment_id: Uuid) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let payment = state
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment {} not found", payment_id)))?;
        payment.status = PaymentStatus::Failed.as_str().to_string();
        Ok(())
    }

    async fn paid_totals(&self) -> Result<(Decimal, i64), AppError> {
        let state = self.state.lock().await;
        let paid = state.applications.iter().filter(|a| a.is_paid);
        let (total, count) = paid.fold((Decimal::ZERO, 0i64), |(total, count), a| {
            (total + a.amount, count + 1)
        });
        Ok((total, count))
    }

    async fn get_settings(&self) -> Result<Option<Settings>, AppError> {
        Ok(self.state.lock().await.settings.clone())
    }

    async fn upsert_settings(&self, update: SettingsUpdate) -> Result<Settings, AppError> {
        let mut state = self.state.lock().await;
        let id = state
            .settings
            .as_ref()
            .map(|s| s.id)
            .unwrap_or_else(Uuid::new_v4);
        let settings = Settings {
            id,
            min_raise_amount: update.min_raise_amount,
            target_raise_amount: update.target_raise_amount,
            raise_end_date: update.raise_end_date,
            updated_at: Utc::now(),
        };
        state.settings = Some(settings.clone());
        Ok(settings)
    }
}
