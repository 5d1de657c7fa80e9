//! Common test utilities for share-offer-service integration tests.

use rust_decimal::Decimal;
use secrecy::Secret;
use service_core::config::Config as CommonConfig;
use service_core::middleware::rate_limit::RateLimitConfig;
use share_offer_service::config::{AdminConfig, ShareOfferConfig};
use share_offer_service::models::{Application, ApplicationStatus};
use share_offer_service::services::MemoryStore;
use share_offer_service::startup::Application as App;
use std::sync::{Arc, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,share_offer_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config(rate_limit: u32) -> ShareOfferConfig {
    ShareOfferConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "share-offer-service-test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: None,
        admin: AdminConfig {
            token: Some(Secret::new(ADMIN_TOKEN.to_string())),
        },
        public_app_url: "http://shares.test".to_string(),
        rate_limit: RateLimitConfig {
            interval: Duration::from_secs(60),
            capacity: 100,
            limit: rate_limit,
        },
    }
}

/// Test application wrapper.
#[allow(dead_code)]
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
    pub store: MemoryStore,
}

#[allow(dead_code)]
impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn admin_post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(ADMIN_TOKEN)
    }

    pub fn admin_get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(ADMIN_TOKEN)
    }

    pub async fn seed(
        &self,
        reference: &str,
        amount: &str,
        status: ApplicationStatus,
    ) -> Application {
        self.store
            .seed_application(reference, amount.parse::<Decimal>().unwrap(), status)
            .await
    }

    /// Upload `csv` as the `statement` field of a multipart form.
    pub async fn upload_statement(&self, csv: &str) -> reqwest::Response {
        let part = reqwest::multipart::Part::text(csv.to_string())
            .file_name("statement.csv")
            .mime_str("text/csv")
            .unwrap();
        let form = reqwest::multipart::Form::new().part("statement", part);
        self.admin_post("/admin/reconciliation")
            .multipart(form)
            .send()
            .await
            .expect("Failed to upload statement")
    }
}

/// Spawn the service on an ephemeral port backed by an in-memory store.
pub async fn spawn_app() -> TestApp {
    spawn_app_with_rate_limit(1_000).await
}

pub async fn spawn_app_with_rate_limit(rate_limit: u32) -> TestApp {
    init_tracing();

    let store = MemoryStore::new();
    let app = App::build_with_store(test_config(rate_limit), Arc::new(store.clone()))
        .await
        .expect("Failed to build application");

    let port = app.port();
    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        port,
        client: reqwest::Client::new(),
        store,
    }
}
