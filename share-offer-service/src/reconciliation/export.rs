//! CSV export of statement rows that matched no application.

use super::summary::UploadedRow;

pub const EXPORT_FILENAME: &str = "unmatched-transactions.csv";

const EXPORT_HEADER: &str = "Reference,Amount,Date,Description";

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Header plus one fully quoted line per row, joined with `\n`.
pub fn unknown_references_csv(rows: &[UploadedRow]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(EXPORT_HEADER.to_string());
    for row in rows {
        let fields = [
            quoted(&row.reference),
            quoted(&row.amount.normalize().to_string()),
            quoted(row.date.as_deref().unwrap_or_default()),
            quoted(row.description.as_deref().unwrap_or_default()),
        ];
        lines.push(fields.join(","));
    }
    lines.join("\n")
}
