//! Statement-to-application matching.
//!
//! Rows are classified strictly in file order. Each row lands in exactly one
//! bucket (or in `errors`), and only a `matched` row writes to the store.

use super::index::{select_candidate, ApplicationIndex};
use super::reference::normalize_reference;
use super::statement::{
    parse_statement, parse_statement_date, read_amount, AmountError, StatementRow, UploadError,
};
use super::summary::{
    AlreadySettledRow, MatchedRow, MismatchRow, ReconciliationSummary, UploadedRow,
};
use crate::models::{Application, SettlementRequest};
use crate::services::metrics;
use crate::services::store::ApplicationStore;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Largest absolute difference between statement and application amounts
/// that still counts as a match (exclusive).
pub const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

pub const MISSING_REFERENCE_ERROR: &str = "Row missing payment reference and was skipped.";

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ApplicationStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self { store }
    }

    /// Full upload entry point. Upload-level failures come back as a zeroed
    /// summary with one error; only a failure to read applications is `Err`.
    #[instrument(skip_all, fields(bytes = file.map(<[u8]>::len)))]
    pub async fn process_upload(
        &self,
        file: Option<&[u8]>,
    ) -> Result<ReconciliationSummary, AppError> {
        let started = Instant::now();
        let rows = match file.ok_or(UploadError::MissingFile).and_then(read_rows) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = ?err, "Statement upload rejected");
                metrics::record_reconciliation_run("rejected", started.elapsed().as_secs_f64());
                return Ok(ReconciliationSummary::failed(err));
            }
        };

        match self.run(rows).await {
            Ok(summary) => {
                metrics::record_reconciliation_run("completed", started.elapsed().as_secs_f64());
                Ok(summary)
            }
            Err(err) => {
                metrics::record_reconciliation_run("failed", started.elapsed().as_secs_f64());
                metrics::record_error("reconciliation_index");
                Err(err)
            }
        }
    }

    /// Classify every row and settle the ones that match.
    #[instrument(skip_all, fields(rows = rows.len()))]
    pub async fn run(&self, rows: Vec<StatementRow>) -> Result<ReconciliationSummary, AppError> {
        let index = ApplicationIndex::load(self.store.as_ref(), &rows).await?;
        let mut summary = ReconciliationSummary::default();
        let mut seen: HashSet<String> = HashSet::new();

        for row in rows {
            self.classify(row, &index, &mut seen, &mut summary).await;
        }

        info!(
            processed_rows = summary.processed_rows,
            matched = summary.matched.len(),
            amount_mismatches = summary.amount_mismatches.len(),
            already_settled = summary.already_settled.len(),
            unknown_references = summary.unknown_references.len(),
            duplicate_references = summary.duplicate_references.len(),
            errors = summary.errors.len(),
            settled_total = %summary.settled_total,
            "Bank statement reconciled"
        );
        metrics::record_settled_amount(summary.settled_total.to_f64().unwrap_or_default());

        Ok(summary)
    }

    async fn classify(
        &self,
        row: StatementRow,
        index: &ApplicationIndex,
        seen: &mut HashSet<String>,
        summary: &mut ReconciliationSummary,
    ) {
        let reference = row.reference.as_deref().map(str::trim).unwrap_or_default();
        let key = normalize_reference(reference);
        if key.is_empty() {
            summary.errors.push(MISSING_REFERENCE_ERROR.to_string());
            metrics::record_statement_row("missing_reference");
            return;
        }

        let amount = read_amount(row.amount.as_deref());
        let uploaded = |amount: Decimal| UploadedRow {
            reference: reference.to_string(),
            amount,
            description: row.description.clone(),
            date: row.date.clone(),
        };

        if !seen.insert(key.clone()) {
            summary
                .duplicate_references
                .push(uploaded(amount.unwrap_or_default()));
            metrics::record_statement_row("duplicate_reference");
            return;
        }
        summary.processed_rows += 1;

        let amount = match amount {
            Ok(amount) => amount,
            Err(err) => {
                let raw = row.amount.as_deref().unwrap_or_default();
                summary.errors.push(match err {
                    AmountError::Invalid => {
                        format!("Invalid amount \"{}\" for reference {}.", raw, reference)
                    }
                    AmountError::OutOfRange => format!(
                        "Amount \"{}\" for reference {} is out of range.",
                        raw, reference
                    ),
                });
                metrics::record_statement_row("invalid_amount");
                return;
            }
        };

        let Some(application) = select_candidate(index.candidates(&key)) else {
            summary.unknown_references.push(uploaded(amount));
            metrics::record_statement_row("unknown_reference");
            return;
        };

        if application.status().is_settled() {
            summary.already_settled.push(AlreadySettledRow {
                row: uploaded(amount),
                application_id: application.id,
                applicant_name: application.applicant_name(),
                current_status: application.status.clone(),
            });
            metrics::record_statement_row("already_settled");
            return;
        }

        let within_tolerance = amount
            .checked_sub(application.amount)
            .is_some_and(|diff| diff.abs() < AMOUNT_TOLERANCE);
        if !within_tolerance {
            summary.amount_mismatches.push(MismatchRow {
                row: uploaded(amount),
                application_id: application.id,
                applicant_name: application.applicant_name(),
                expected_amount: application.amount,
            });
            metrics::record_statement_row("amount_mismatch");
            return;
        }

        let confirmed_at = parse_statement_date(row.date.as_deref()).unwrap_or_else(Utc::now);
        match self.settle(application, amount, reference, confirmed_at).await {
            Ok(()) => {
                summary.settled_total += amount;
                summary.matched.push(MatchedRow {
                    row: uploaded(amount),
                    application_id: application.id,
                    applicant_name: application.applicant_name(),
                });
                metrics::record_statement_row("matched");
            }
            Err(err) => {
                warn!(
                    reference = %reference,
                    application_id = %application.id,
                    error = %err,
                    "Failed to settle statement row"
                );
                summary.errors.push(format!(
                    "Failed to settle payment for reference {}: {}",
                    reference, err
                ));
                metrics::record_statement_row("settlement_failed");
                metrics::record_error("settlement");
            }
        }
    }

    async fn settle(
        &self,
        application: &Application,
        amount: Decimal,
        reference: &str,
        confirmed_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let payment = self
            .store
            .settle(SettlementRequest {
                application_id: application.id,
                amount,
                bank_reference: reference.to_string(),
                confirmed_at,
            })
            .await?;
        info!(
            payment_id = %payment.id,
            application_id = %application.id,
            amount = %amount,
            "Application settled from bank statement"
        );
        Ok(())
    }
}

fn read_rows(bytes: &[u8]) -> Result<Vec<StatementRow>, UploadError> {
    let content = std::str::from_utf8(bytes).map_err(|e| UploadError::Malformed {
        reason: e.to_string(),
    })?;
    parse_statement(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationStatus;
    use crate::services::memory::MemoryStore;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn reconciler(store: &MemoryStore) -> Reconciler {
        Reconciler::new(Arc::new(store.clone()))
    }

    async fn upload(store: &MemoryStore, csv: &str) -> ReconciliationSummary {
        reconciler(store)
            .process_upload(Some(csv.as_bytes()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn settles_matching_row() {
        let store = MemoryStore::new();
        let app = store
            .seed_application("MAY-0001-AAAA", dec("250.00"), ApplicationStatus::Pending)
            .await;

        let summary = upload(
            &store,
            "Date,Amount,Reference,Description\n01/05/2024,250.00,may 0001 aaaa,Share purchase\n",
        )
        .await;

        assert_eq!(summary.processed_rows, 1);
        assert_eq!(summary.matched.len(), 1);
        assert_eq!(summary.matched[0].application_id, app.id);
        assert_eq!(summary.matched[0].row.reference, "may 0001 aaaa");
        assert_eq!(summary.matched[0].applicant_name, "Test Investor");
        assert_eq!(summary.settled_total, dec("250.00"));
        assert!(summary.errors.is_empty());

        let payments = store.payments_for(app.id).await;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].payment_method, "BANK_TRANSFER");
        assert_eq!(payments[0].status, "CONFIRMED");
        assert_eq!(payments[0].bank_reference.as_deref(), Some("may 0001 aaaa"));
        assert_eq!(
            payments[0].confirmed_at.map(|d| d.to_rfc3339()),
            Some("2024-05-01T12:00:00+00:00".to_string())
        );

        let settled = store.get_application(app.id).await.unwrap().unwrap();
        assert_eq!(settled.status(), ApplicationStatus::Paid);
        assert!(settled.is_paid);
    }

    #[tokio::test]
    async fn amount_tolerance_is_under_half_a_unit() {
        let store = MemoryStore::new();
        store
            .seed_application("MAY-0001-AAAA", dec("250.49"), ApplicationStatus::Pending)
            .await;
        store
            .seed_application("MAY-0002-BBBB", dec("250.51"), ApplicationStatus::Pending)
            .await;

        let summary = upload(
            &store,
            "Date,Amount,Reference\n01/05/2024,250.00,MAY-0001-AAAA\n01/05/2024,250.00,MAY-0002-BBBB\n",
        )
        .await;

        assert_eq!(summary.matched.len(), 1);
        assert_eq!(summary.matched[0].row.reference, "MAY-0001-AAAA");
        assert_eq!(summary.amount_mismatches.len(), 1);
        assert_eq!(summary.amount_mismatches[0].expected_amount, dec("250.51"));
        assert_eq!(summary.settled_total, dec("250.00"));
    }

    #[tokio::test]
    async fn extreme_amount_is_a_mismatch_and_run_continues() {
        let store = MemoryStore::new();
        let extreme = store
            .seed_application("MAY-0001-AAAA", dec("100"), ApplicationStatus::Pending)
            .await;
        let next = store
            .seed_application("MAY-0002-BBBB", dec("200"), ApplicationStatus::Pending)
            .await;

        let summary = upload(
            &store,
            "Date,Amount,Reference
\
             01/05/2024,-79228162514264337593543950335,MAY-0001-AAAA
\
             01/05/2024,200,MAY-0002-BBBB
",
        )
        .await;

        assert_eq!(summary.amount_mismatches.len(), 1);
        assert_eq!(summary.amount_mismatches[0].application_id, extreme.id);
        assert_eq!(summary.amount_mismatches[0].row.amount, Decimal::MIN);
        assert_eq!(summary.matched.len(), 1);
        assert_eq!(summary.matched[0].application_id, next.id);
        assert_eq!(summary.processed_rows, 2);
        assert!(store.payments_for(extreme.id).await.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_amounts_are_row_errors() {
        let store = MemoryStore::new();
        store
            .seed_application("MAY-0001-AAAA", dec("100"), ApplicationStatus::Pending)
            .await;
        store
            .seed_application("MAY-0002-BBBB", dec("200"), ApplicationStatus::Pending)
            .await;

        let summary = upload(
            &store,
            "Date,Amount,Reference
\
             01/05/2024,1e40,MAY-0001-AAAA
\
             01/05/2024,79228162514264337593543950336,MAY-9999-ZZZZ
\
             01/05/2024,200,MAY-0002-BBBB
",
        )
        .await;

        assert_eq!(
            summary.errors,
            vec![
                "Amount \"1e40\" for reference MAY-0001-AAAA is out of range.".to_string(),
                "Amount \"79228162514264337593543950336\" for reference MAY-9999-ZZZZ is out of range."
                    .to_string(),
            ]
        );
        assert_eq!(summary.matched.len(), 1);
        assert_eq!(summary.settled_total, dec("200"));
        assert_eq!(summary.processed_rows, 3);
    }

    #[tokio::test]
    async fn later_rows_with_same_reference_are_duplicates() {
        let store = MemoryStore::new();
        let app = store
            .seed_application("MAY-0001-AAAA", dec("100"), ApplicationStatus::Pending)
            .await;

        let summary = upload(
            &store,
            "Date,Amount,Reference\n01/05/2024,100,MAY-0001-AAAA\n02/05/2024,abc,may0001aaaa\n",
        )
        .await;

        assert_eq!(summary.matched.len(), 1);
        assert_eq!(summary.duplicate_references.len(), 1);
        assert_eq!(summary.duplicate_references[0].reference, "may0001aaaa");
        assert_eq!(summary.duplicate_references[0].amount, Decimal::ZERO);
        assert_eq!(summary.processed_rows, 1);
        assert_eq!(store.payments_for(app.id).await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_reference_keeps_uploaded_fields() {
        let store = MemoryStore::new();
        let summary = upload(
            &store,
            "Date,Amount,Reference,Description\n03/05/2024,\"1,234.50\",MAY-9999-ZZZZ,Mystery\n",
        )
        .await;

        assert_eq!(summary.unknown_references.len(), 1);
        let row = &summary.unknown_references[0];
        assert_eq!(row.reference, "MAY-9999-ZZZZ");
        assert_eq!(row.amount, dec("1234.50"));
        assert_eq!(row.date.as_deref(), Some("03/05/2024"));
        assert_eq!(row.description.as_deref(), Some("Mystery"));
        assert!(store.payments().await.is_empty());
    }

    #[tokio::test]
    async fn settled_application_is_reported_not_rematched() {
        let store = MemoryStore::new();
        let app = store
            .seed_application("MAY-0001-AAAA", dec("100"), ApplicationStatus::Paid)
            .await;

        let summary = upload(&store, "Date,Amount,Reference\n01/05/2024,100,MAY-0001-AAAA\n").await;

        assert_eq!(summary.already_settled.len(), 1);
        assert_eq!(summary.already_settled[0].current_status, "PAID");
        assert_eq!(summary.already_settled[0].application_id, app.id);
        assert_eq!(summary.settled_total, Decimal::ZERO);
        assert!(store.payments().await.is_empty());
    }

    #[tokio::test]
    async fn prefers_unsettled_candidate_sharing_a_reference() {
        let store = MemoryStore::new();
        store
            .seed_application("MAY-0001-AAAA", dec("100"), ApplicationStatus::Completed)
            .await;
        let pending = store
            .seed_application("may-0001-aaaa", dec("100"), ApplicationStatus::Pending)
            .await;

        let summary = upload(&store, "Date,Amount,Reference\n01/05/2024,100,MAY0001AAAA\n").await;

        assert_eq!(summary.matched.len(), 1);
        assert_eq!(summary.matched[0].application_id, pending.id);
    }

    #[tokio::test]
    async fn rerunning_a_statement_is_idempotent() {
        let store = MemoryStore::new();
        store
            .seed_application("MAY-0001-AAAA", dec("100"), ApplicationStatus::Pending)
            .await;
        store
            .seed_application("MAY-0002-BBBB", dec("200"), ApplicationStatus::Pending)
            .await;
        let csv = "Date,Amount,Reference\n01/05/2024,100,MAY-0001-AAAA\n01/05/2024,200,MAY-0002-BBBB\n";

        let first = upload(&store, csv).await;
        assert_eq!(first.matched.len(), 2);

        let second = upload(&store, csv).await;
        assert!(second.matched.is_empty());
        assert_eq!(second.already_settled.len(), 2);
        assert_eq!(second.settled_total, Decimal::ZERO);
        assert_eq!(store.payments().await.len(), 2);
    }

    #[tokio::test]
    async fn row_errors_do_not_stop_processing() {
        let store = MemoryStore::new();
        store
            .seed_application("MAY-0002-BBBB", dec("200"), ApplicationStatus::Pending)
            .await;

        let summary = upload(
            &store,
            "Date,Amount,Reference\n01/05/2024,100,\n01/05/2024,lots,MAY-0001-AAAA\n01/05/2024,200,MAY-0002-BBBB\n01/05/2024,5,---\n",
        )
        .await;

        assert_eq!(
            summary.errors,
            vec![
                MISSING_REFERENCE_ERROR.to_string(),
                "Invalid amount \"lots\" for reference MAY-0001-AAAA.".to_string(),
                MISSING_REFERENCE_ERROR.to_string(),
            ]
        );
        assert_eq!(summary.matched.len(), 1);
        // 4 rows, 2 without a usable reference, no duplicates
        assert_eq!(summary.processed_rows, 2);
    }

    #[tokio::test]
    async fn settlement_failure_is_recorded_per_row() {
        let store = MemoryStore::new();
        let app = store
            .seed_application("MAY-0001-AAAA", dec("100"), ApplicationStatus::Pending)
            .await;
        store.fail_settlements(Some("connection reset")).await;

        let summary = upload(&store, "Date,Amount,Reference\n01/05/2024,100,MAY-0001-AAAA\n").await;

        assert!(summary.matched.is_empty());
        assert_eq!(summary.settled_total, Decimal::ZERO);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].starts_with("Failed to settle payment for reference MAY-0001-AAAA:"));
        assert!(summary.errors[0].contains("connection reset"));

        let unchanged = store.get_application(app.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status(), ApplicationStatus::Pending);
    }

    #[tokio::test]
    async fn upload_level_failures_return_single_error() {
        let store = MemoryStore::new();
        let reconciler = reconciler(&store);

        let missing = reconciler.process_upload(None).await.unwrap();
        assert_eq!(missing.errors, vec!["No statement file uploaded.".to_string()]);

        let empty = upload(&store, "Date,Amount,Reference,Description\n").await;
        assert_eq!(empty.errors, vec!["CSV file is empty.".to_string()]);
        assert_eq!(empty.processed_rows, 0);
        assert!(empty.matched.is_empty() && empty.unknown_references.is_empty());

        let malformed = reconciler
            .process_upload(Some(&[0xff, 0xfe, 0x00]))
            .await
            .unwrap();
        assert_eq!(
            malformed.errors,
            vec!["Unable to parse CSV file. Please ensure it has headers Date, Amount, Reference."
                .to_string()]
        );
    }
}
