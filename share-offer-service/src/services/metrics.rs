//! Prometheus metrics for share-offer-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "share_offer_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for reconciliation runs by outcome.
pub static RECONCILIATION_RUNS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "share_offer_reconciliation_runs_total",
        "Total number of bank statement reconciliation runs",
        &["status"]
    )
    .expect("Failed to register RECONCILIATION_RUNS")
});

/// Histogram for reconciliation run duration.
pub static RECONCILIATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "share_offer_reconciliation_duration_seconds",
        "Bank statement reconciliation duration in seconds",
        &["status"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register RECONCILIATION_DURATION")
});

/// Counter for statement rows by classification.
pub static STATEMENT_ROWS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "share_offer_statement_rows_total",
        "Total number of statement rows by outcome",
        &["outcome"]
    )
    .expect("Failed to register STATEMENT_ROWS")
});

/// Running total of money settled from bank statements.
pub static SETTLED_AMOUNT: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "share_offer_settled_amount_total",
        "Total amount settled from bank statements"
    )
    .expect("Failed to register SETTLED_AMOUNT")
});

/// Counter for payment provider events.
pub static PAYMENT_EVENTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "share_offer_payment_events_total",
        "Total number of payment provider events",
        &["event", "status"]
    )
    .expect("Failed to register PAYMENT_EVENTS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "share_offer_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&RECONCILIATION_RUNS);
    Lazy::force(&RECONCILIATION_DURATION);
    Lazy::force(&STATEMENT_ROWS);
    Lazy::force(&SETTLED_AMOUNT);
    Lazy::force(&PAYMENT_EVENTS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record a finished reconciliation run.
pub fn record_reconciliation_run(status: &str, duration_secs: f64) {
    RECONCILIATION_RUNS.with_label_values(&[status]).inc();
    RECONCILIATION_DURATION
        .with_label_values(&[status])
        .observe(duration_secs);
}

/// Record the classification of one statement row.
pub fn record_statement_row(outcome: &str) {
    STATEMENT_ROWS.with_label_values(&[outcome]).inc();
}

/// Record money settled by a reconciliation run.
pub fn record_settled_amount(amount: f64) {
    if amount > 0.0 {
        SETTLED_AMOUNT.inc_by(amount);
    }
}

/// Record a payment provider event.
pub fn record_payment_event(event: &str, status: &str) {
    PAYMENT_EVENTS.with_label_values(&[event, status]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
