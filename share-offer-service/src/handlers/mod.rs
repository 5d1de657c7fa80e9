pub mod applications;
pub mod health;
pub mod payments;
pub mod reconciliation;
pub mod stats;
