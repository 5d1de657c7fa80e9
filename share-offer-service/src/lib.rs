//! Share Offer Service - applications, payments and bank statement reconciliation
//! for a community share offer.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod reconciliation;
pub mod services;
pub mod startup;
