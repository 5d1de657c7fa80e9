//! PostgreSQL-backed [`ApplicationStore`].

use crate::models::{
    Application, ApplicationStatus, NewApplication, NewPayment, Payment, PaymentMethod,
    PaymentStatus, SettlementRequest, Settings, SettingsUpdate,
};
use crate::reconciliation::reference::generate_reference_code;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::ApplicationStore;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const APPLICATION_COLUMNS: &str = "id, shareholder_first_name, shareholder_last_name, shareholder_email, amount, shares, status, payment_reference, is_paid, paid_at, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, application_id, amount, payment_method, bank_reference, provider_reference, status, confirmed_at, created_at";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "share-offer-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

/// Shared by the single and batch paid toggles.
async fn update_paid_flag<'e, E>(
    executor: E,
    id: Uuid,
    is_paid: bool,
) -> Result<Option<Application>, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    let status = if is_paid {
        ApplicationStatus::Paid
    } else {
        ApplicationStatus::Pending
    };
    let paid_at = is_paid.then(Utc::now);

    sqlx::query_as::<_, Application>(&format!(
        r#"
        UPDATE applications
        SET status = $2, is_paid = $3, paid_at = $4, updated_at = NOW()
        WHERE id = $1
        RETURNING {APPLICATION_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(status.as_str())
    .bind(is_paid)
    .bind(paid_at)
    .fetch_optional(executor)
    .await
}

#[async_trait]
impl ApplicationStore for PgStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_applications_with_reference(&self) -> Result<Vec<Application>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_applications_with_reference"])
            .start_timer();

        let applications = sqlx::query_as::<_, Application>(&format!(
            r#"
            SELECT {APPLICATION_COLUMNS}
            FROM applications
            WHERE payment_reference IS NOT NULL
            ORDER BY created_at, id
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load applications: {}", e))
        })?;

        timer.observe_duration();
        Ok(applications)
    }

    #[instrument(skip(self, request), fields(application_id = %request.application_id))]
    async fn settle(&self, request: SettlementRequest) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["settle"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Only an application that is still unsettled may be claimed.
        let claimed = sqlx::query(
            r#"
            UPDATE applications
            SET status = $2, is_paid = TRUE, paid_at = $3, updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('PAID', 'COMPLETED')
            "#,
        )
        .bind(request.application_id)
        .bind(ApplicationStatus::Paid.as_str())
        .bind(request.confirmed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update application: {}", e)))?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Application {} is already settled",
                request.application_id
            )));
        }

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (id, application_id, amount, payment_method, bank_reference, provider_reference, status, confirmed_at)
            VALUES ($1, $2, $3, $4, $5, NULL, $6, $7)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(request.application_id)
        .bind(request.amount)
        .bind(PaymentMethod::BankTransfer.as_str())
        .bind(&request.bank_reference)
        .bind(PaymentStatus::Confirmed.as_str())
        .bind(request.confirmed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create payment: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit settlement: {}", e))
        })?;

        timer.observe_duration();
        info!(payment_id = %payment.id, "Settlement committed");

        Ok(payment)
    }

    #[instrument(skip(self, application), fields(email = %application.email))]
    async fn create_application(
        &self,
        application: NewApplication,
    ) -> Result<Application, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_application"])
            .start_timer();

        let created = sqlx::query_as::<_, Application>(&format!(
            r#"
            INSERT INTO applications (id, shareholder_first_name, shareholder_last_name, shareholder_email, amount, shares, status, payment_reference)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {APPLICATION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&application.first_name)
        .bind(&application.last_name)
        .bind(&application.email)
        .bind(application.amount)
        .bind(application.shares)
        .bind(ApplicationStatus::Pending.as_str())
        .bind(generate_reference_code())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create application: {}", e))
        })?;

        timer.observe_duration();
        info!(application_id = %created.id, "Application created");

        Ok(created)
    }

    #[instrument(skip(self), fields(application_id = %id))]
    async fn get_application(&self, id: Uuid) -> Result<Option<Application>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_application"])
            .start_timer();

        let application = sqlx::query_as::<_, Application>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get application: {}", e)))?;

        timer.observe_duration();
        Ok(application)
    }

    #[instrument(skip(self))]
    async fn list_recent_applications(&self, limit: i64) -> Result<Vec<Application>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_recent_applications"])
            .start_timer();

        let applications = sqlx::query_as::<_, Application>(&format!(
            r#"
            SELECT {APPLICATION_COLUMNS}
            FROM applications
            ORDER BY created_at DESC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list applications: {}", e))
        })?;

        timer.observe_duration();
        Ok(applications)
    }

    #[instrument(skip(self), fields(application_id = %id))]
    async fn set_application_paid(
        &self,
        id: Uuid,
        is_paid: bool,
    ) -> Result<Option<Application>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_application_paid"])
            .start_timer();

        let application = update_paid_flag(&self.pool, id, is_paid)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update application: {}", e))
            })?;

        timer.observe_duration();
        Ok(application)
    }

    #[instrument(skip(self, updates), fields(count = updates.len()))]
    async fn set_applications_paid(&self, updates: &[(Uuid, bool)]) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_applications_paid"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        for (id, is_paid) in updates {
            let updated = update_paid_flag(&mut *tx, *id, *is_paid)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to update application: {}", e))
                })?;
            if updated.is_none() {
                tx.rollback().await.ok();
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "Application {} not found",
                    id
                )));
            }
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit updates: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, payment), fields(application_id = %payment.application_id))]
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payment"])
            .start_timer();

        let confirmed_at = (payment.status == PaymentStatus::Confirmed).then(Utc::now);
        let created = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (id, application_id, amount, payment_method, bank_reference, provider_reference, status, confirmed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(payment.application_id)
        .bind(payment.amount)
        .bind(payment.method.as_str())
        .bind(&payment.bank_reference)
        .bind(&payment.provider_reference)
        .bind(payment.status.as_str())
        .bind(confirmed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create payment: {}", e)))?;

        timer.observe_duration();
        Ok(created)
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    async fn set_payment_provider_reference(
        &self,
        payment_id: Uuid,
        provider_reference: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_payment_provider_reference"])
            .start_timer();

        let result = sqlx::query("UPDATE payments SET provider_reference = $2 WHERE id = $1")
            .bind(payment_id)
            .bind(provider_reference)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update payment: {}", e))
            })?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Payment {} not found",
                payment_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_payment_by_reference"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE provider_reference = $1 OR bank_reference = $1
            ORDER BY created_at
            LIMIT 1
            "#
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find payment: {}", e)))?;

        timer.observe_duration();
        Ok(payment)
    }

    #[instrument(skip(self), fields(application_id = %application_id))]
    async fn find_latest_payment(
        &self,
        application_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_latest_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE application_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to find latest payment: {}", e))
        })?;

        timer.observe_duration();
        Ok(payment)
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    async fn confirm_payment(&self, payment_id: Uuid) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["confirm_payment"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = $2, confirmed_at = NOW()
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .bind(PaymentStatus::Confirmed.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to confirm payment: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment {} not found", payment_id)))?;

        update_paid_flag(&mut *tx, payment.application_id, true)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update application: {}", e))
            })?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Application {} not found",
                    payment.application_id
                ))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit confirmation: {}", e))
        })?;

        timer.observe_duration();
        info!(application_id = %payment.application_id, "Payment confirmed");

        Ok(payment)
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    async fn fail_payment(&self, payment_id: Uuid) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["fail_payment"])
            .start_timer();

        sqlx::query("UPDATE payments SET status = $2 WHERE id = $1")
            .bind(payment_id)
            .bind(PaymentStatus::Failed.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to mark payment failed: {}", e))
            })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn paid_totals(&self) -> Result<(Decimal, i64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["paid_totals"])
            .start_timer();

        let totals = sqlx::query_as::<_, (Option<Decimal>, i64)>(
            "SELECT SUM(amount), COUNT(*) FROM applications WHERE is_paid",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum payments: {}", e)))?;

        timer.observe_duration();
        Ok((totals.0.unwrap_or_default(), totals.1))
    }

    #[instrument(skip(self))]
    async fn get_settings(&self) -> Result<Option<Settings>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_settings"])
            .start_timer();

        let settings = sqlx::query_as::<_, Settings>(
            r#"
            SELECT id, min_raise_amount, target_raise_amount, raise_end_date, updated_at
            FROM settings
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get settings: {}", e)))?;

        timer.observe_duration();
        Ok(settings)
    }

    #[instrument(skip(self, update))]
    async fn upsert_settings(&self, update: SettingsUpdate) -> Result<Settings, AppError> {
        let existing = self.get_settings().await?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_settings"])
            .start_timer();

        let id = existing.map(|s| s.id).unwrap_or_else(Uuid::new_v4);
        let settings = sqlx::query_as::<_, Settings>(
            r#"
            INSERT INTO settings (id, min_raise_amount, target_raise_amount, raise_end_date)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET min_raise_amount = EXCLUDED.min_raise_amount,
                target_raise_amount = EXCLUDED.target_raise_amount,
                raise_end_date = EXCLUDED.raise_end_date,
                updated_at = NOW()
            RETURNING id, min_raise_amount, target_raise_amount, raise_end_date, updated_at
            "#,
        )
        .bind(id)
        .bind(update.min_raise_amount)
        .bind(update.target_raise_amount)
        .bind(update.raise_end_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to save settings: {}", e)))?;

        timer.observe_duration();
        info!(settings_id = %settings.id, "Raise settings updated");

        Ok(settings)
    }
}
