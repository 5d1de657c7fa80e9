//! Bank statement reconciliation: parse an uploaded CSV, match each row to an
//! application by payment reference, settle the matches and summarise the
//! rest for manual review.

pub mod export;
pub mod index;
pub mod matcher;
pub mod reference;
pub mod statement;
pub mod summary;

pub use export::unknown_references_csv;
pub use matcher::Reconciler;
pub use statement::{parse_statement, StatementRow, UploadError};
pub use summary::ReconciliationSummary;
