//! Services module for share-offer-service.

pub mod database;
pub mod memory;
pub mod metrics;
pub mod payment_provider;
pub mod store;

pub use database::PgStore;
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics, record_error};
pub use payment_provider::{InitiatedPayment, MockPaymentProvider, WebhookOutcome};
pub use store::ApplicationStore;
