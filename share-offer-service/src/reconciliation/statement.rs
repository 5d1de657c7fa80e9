//! Bank statement CSV ingestion.
//!
//! Parsing happens in two stages with different failure policies: the
//! structural pass ([`parse_statement`]) either yields rows or aborts the
//! whole upload, while the per-field helpers ([`parse_amount`],
//! [`parse_statement_date`]) never fail and return `None` instead.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

pub const DATE_HEADER: &str = "Date";
pub const AMOUNT_HEADER: &str = "Amount";
pub const REFERENCE_HEADER: &str = "Reference";
pub const DESCRIPTION_HEADER: &str = "Description";

const REQUIRED_HEADERS: [&str; 3] = [DATE_HEADER, AMOUNT_HEADER, REFERENCE_HEADER];

static ISO_DATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}").expect("Invalid date pattern"));

static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})$").expect("Invalid date pattern")
});

static NUMERIC_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("Invalid amount pattern")
});

/// Failures that abort a reconciliation run before any row is looked at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("No statement file uploaded.")]
    MissingFile,

    #[error("Unable to parse CSV file. Please ensure it has headers Date, Amount, Reference.")]
    Malformed { reason: String },

    #[error("CSV file is empty.")]
    Empty,
}

/// One uploaded statement line, fields exactly as they appeared (trimmed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementRow {
    pub date: Option<String>,
    pub amount: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
}

struct ColumnMap {
    date: usize,
    amount: usize,
    reference: usize,
    description: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self, UploadError> {
        let position = |name: &str| headers.iter().position(|h| h == name);

        let missing: Vec<&str> = REQUIRED_HEADERS
            .iter()
            .copied()
            .filter(|name| position(*name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(UploadError::Malformed {
                reason: format!("missing headers: {}", missing.join(", ")),
            });
        }

        Ok(Self {
            date: position(DATE_HEADER).unwrap_or_default(),
            amount: position(AMOUNT_HEADER).unwrap_or_default(),
            reference: position(REFERENCE_HEADER).unwrap_or_default(),
            description: position(DESCRIPTION_HEADER),
        })
    }

    fn row(&self, record: &StringRecord) -> StatementRow {
        let field = |idx: usize| record.get(idx).map(str::to_string);
        StatementRow {
            date: field(self.date),
            amount: field(self.amount),
            reference: field(self.reference),
            description: self.description.and_then(field),
        }
    }
}

/// Parse an uploaded statement with a `Date,Amount,Reference[,Description]`
/// header row. Fields are trimmed and blank lines skipped.
pub fn parse_statement(content: &str) -> Result<Vec<StatementRow>, UploadError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| UploadError::Malformed {
            reason: e.to_string(),
        })?
        .clone();

    let records = reader
        .records()
        .collect::<Result<Vec<StringRecord>, csv::Error>>()
        .map_err(|e| UploadError::Malformed {
            reason: e.to_string(),
        })?;

    if records.is_empty() {
        return Err(UploadError::Empty);
    }

    let columns = ColumnMap::from_headers(&headers)?;
    Ok(records.iter().map(|record| columns.row(record)).collect())
}

/// Why a statement amount could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is missing or not a number")]
    Invalid,

    /// A well-formed number beyond the range or precision of [`Decimal`].
    #[error("amount is out of range")]
    OutOfRange,
}

fn clean_amount(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ',' | '£' | '$' | '€') && !c.is_whitespace())
        .collect()
}

/// Statement amount with thousands separators, whitespace and currency
/// symbols removed.
pub fn read_amount(value: Option<&str>) -> Result<Decimal, AmountError> {
    let cleaned = clean_amount(value.ok_or(AmountError::Invalid)?);
    if cleaned.is_empty() {
        return Err(AmountError::Invalid);
    }

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| {
            if NUMERIC_LITERAL.is_match(&cleaned) {
                AmountError::OutOfRange
            } else {
                AmountError::Invalid
            }
        })
}

/// [`read_amount`] without the failure reason. `None` when absent, not a
/// number, or out of range.
pub fn parse_amount(value: Option<&str>) -> Option<Decimal> {
    read_amount(value).ok()
}

fn midday_utc(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(12, 0, 0).map(|dt| Utc.from_utc_datetime(&dt))
}

fn parse_generic_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if ISO_DATE_PREFIX.is_match(value) {
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
                return Some(Utc.from_utc_datetime(&dt));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return midday_utc(date);
        }
    }
    for format in ["%d %b %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return midday_utc(date);
        }
    }
    None
}

fn parse_day_month_year(value: &str) -> Option<DateTime<Utc>> {
    let caps = DAY_MONTH_YEAR.captures(value)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = match &caps[3] {
        yy if yy.len() == 2 => 2000 + yy.parse::<i32>().ok()?,
        yyyy if yyyy.len() == 4 => yyyy.parse().ok()?,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day).and_then(midday_utc)
}

/// Statement date: ISO/RFC forms first, then day-first `D/M/YY` or
/// `D-M-YYYY`. Date-only values land on 12:00 UTC so no timezone shifts the
/// calendar day.
///
/// Slash dates are always day-first as UK banks write them: `01/05/2024` is
/// 1 May, never 5 January.
pub fn parse_statement_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    parse_generic_date(value).or_else(|| parse_day_month_year(value))
}
