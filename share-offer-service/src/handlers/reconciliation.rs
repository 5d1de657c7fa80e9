//! Admin bank statement upload and unmatched-row export.

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::header,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    reconciliation::{export::EXPORT_FILENAME, unknown_references_csv, ReconciliationSummary},
    startup::AppState,
};

/// Multipart field carrying the statement file.
pub const STATEMENT_FIELD: &str = "statement";

/// Reconcile an uploaded statement. Upload problems come back inside the
/// summary with `200 OK`; only store failures are HTTP errors.
pub async fn reconcile_statement(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ReconciliationSummary>, AppError> {
    let mut statement: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(STATEMENT_FIELD) || statement.is_some() {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read statement: {}", e)))?;
        tracing::info!(
            file_name = ?file_name,
            size = bytes.len(),
            "Bank statement received"
        );
        statement = Some(bytes);
    }

    let summary = state
        .reconciler
        .process_upload(statement.as_deref())
        .await?;

    Ok(Json(summary))
}

/// Re-serialise the unknown-reference bucket of a summary as a CSV download.
pub async fn export_unknown_references(
    Json(summary): Json<ReconciliationSummary>,
) -> impl IntoResponse {
    let csv = unknown_references_csv(&summary.unknown_references);
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILENAME),
            ),
        ],
        csv,
    )
}
