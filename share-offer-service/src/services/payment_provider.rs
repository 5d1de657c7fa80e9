//! Stand-in for a hosted pay-by-bank provider.
//!
//! Held once in application state. A real provider would be another
//! implementation behind the same methods.

use chrono::Utc;

/// Result of starting a hosted payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedPayment {
    pub provider_reference: String,
    pub url: String,
}

/// Outcome reported by a provider webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Confirmed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct MockPaymentProvider {
    public_base_url: String,
}

impl MockPaymentProvider {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Provider reference is `mock_<unix millis>`; the URL sends the
    /// investor straight to the tracking page.
    pub fn initiate_payment(&self, reference: &str) -> InitiatedPayment {
        let provider_reference = format!("mock_{}", Utc::now().timestamp_millis());
        let url = format!(
            "{}/invest/track?appId={}&mock_payment=true",
            self.public_base_url, reference
        );
        tracing::info!(
            reference = %reference,
            provider_reference = %provider_reference,
            "Mock payment initiated"
        );
        InitiatedPayment {
            provider_reference,
            url,
        }
    }

    /// `"success"` confirms; any other status fails the payment.
    pub fn handle_webhook(&self, status: &str) -> WebhookOutcome {
        if status == "success" {
            WebhookOutcome::Confirmed
        } else {
            WebhookOutcome::Failed
        }
    }
}
