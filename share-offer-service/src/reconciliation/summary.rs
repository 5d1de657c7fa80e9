//! Outcome of one reconciliation run, as returned to the operator.

use super::reference::format_currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A statement row as it was uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedRow {
    pub reference: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedRow {
    #[serde(flatten)]
    pub row: UploadedRow,
    pub application_id: Uuid,
    pub applicant_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MismatchRow {
    #[serde(flatten)]
    pub row: UploadedRow,
    pub application_id: Uuid,
    pub applicant_name: String,
    pub expected_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlreadySettledRow {
    #[serde(flatten)]
    pub row: UploadedRow,
    pub application_id: Uuid,
    pub applicant_name: String,
    pub current_status: String,
}

/// Every bucket is always present, possibly empty. Rows in `errors` appear in
/// no other bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconciliationSummary {
    pub processed_rows: u32,
    pub settled_total: Decimal,
    pub matched: Vec<MatchedRow>,
    pub amount_mismatches: Vec<MismatchRow>,
    pub already_settled: Vec<AlreadySettledRow>,
    pub unknown_references: Vec<UploadedRow>,
    pub duplicate_references: Vec<UploadedRow>,
    pub errors: Vec<String>,
}

impl ReconciliationSummary {
    /// Zeroed summary carrying a single run-level error.
    pub fn failed(error: impl ToString) -> Self {
        Self {
            errors: vec![error.to_string()],
            ..Self::default()
        }
    }

    /// One-line result banner, e.g. `3 payments matched · £7,500 settled`.
    pub fn headline(&self) -> String {
        format!(
            "{} payments matched · {} settled",
            self.matched.len(),
            format_currency(self.settled_total)
        )
    }

    /// Rows that need an operator to look at them.
    pub fn needs_attention(&self) -> usize {
        self.amount_mismatches.len()
            + self.already_settled.len()
            + self.unknown_references.len()
            + self.duplicate_references.len()
            + self.errors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn row(reference: &str, amount: &str) -> UploadedRow {
        UploadedRow {
            reference: reference.to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            description: None,
            date: Some("01/05/2024".to_string()),
        }
    }

    #[test]
    fn serializes_with_camel_case_buckets() {
        let id = Uuid::new_v4();
        let summary = ReconciliationSummary {
            processed_rows: 2,
            settled_total: Decimal::from(250),
            matched: vec![MatchedRow {
                row: row("MAY-0001-AAAA", "250"),
                application_id: id,
                applicant_name: "Ada Lovelace".to_string(),
            }],
            amount_mismatches: vec![MismatchRow {
                row: row("MAY-0002-BBBB", "99.5"),
                application_id: id,
                applicant_name: "Ada Lovelace".to_string(),
                expected_amount: Decimal::from(100),
            }],
            ..Default::default()
        };

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["processedRows"], json!(2));
        assert_eq!(value["settledTotal"], json!(250.0));
        assert_eq!(value["matched"][0]["reference"], json!("MAY-0001-AAAA"));
        assert_eq!(value["matched"][0]["applicationId"], json!(id.to_string()));
        assert_eq!(value["matched"][0]["applicantName"], json!("Ada Lovelace"));
        assert!(value["matched"][0].get("description").is_none());
        assert_eq!(value["amountMismatches"][0]["expectedAmount"], json!(100.0));
        assert_eq!(value["alreadySettled"], json!([]));
        assert_eq!(value["unknownReferences"], json!([]));
        assert_eq!(value["duplicateReferences"], json!([]));
        assert_eq!(value["errors"], json!([]));
    }

    #[test]
    fn deserializes_partial_summary() {
        let summary: ReconciliationSummary = serde_json::from_value(json!({
            "unknownReferences": [
                {"reference": "MAY-9999-ZZZZ", "amount": 40, "date": "02/05/2024"}
            ]
        }))
        .unwrap();
        assert_eq!(summary.unknown_references.len(), 1);
        assert_eq!(summary.unknown_references[0].amount, Decimal::from(40));
        assert_eq!(summary.unknown_references[0].description, None);
        assert_eq!(summary.processed_rows, 0);
    }

    #[test]
    fn failed_summary_is_zeroed() {
        let summary = ReconciliationSummary::failed("CSV file is empty.");
        assert_eq!(summary.errors, vec!["CSV file is empty.".to_string()]);
        assert_eq!(summary.processed_rows, 0);
        assert!(summary.matched.is_empty());
        assert_eq!(summary.needs_attention(), 1);
    }

    #[test]
    fn headline_formats_total() {
        let mut summary = ReconciliationSummary::default();
        summary.matched.push(MatchedRow {
            row: row("A", "2500"),
            application_id: Uuid::new_v4(),
            applicant_name: "A B".to_string(),
        });
        summary.settled_total = Decimal::from(2500);
        assert_eq!(summary.headline(), "1 payments matched · £2,500 settled");
    }
}
