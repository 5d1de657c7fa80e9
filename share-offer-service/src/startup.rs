//! Application startup and lifecycle management.

use crate::config::ShareOfferConfig;
use crate::handlers::{
    applications::{
        create_application, get_application_status, list_applications, set_application_paid,
        set_applications_paid,
    },
    health::{health_check, metrics_handler, readiness_check},
    payments::{initiate_payment, payment_webhook},
    reconciliation::{export_unknown_references, reconcile_statement},
    stats::{get_settings, get_stats, update_settings},
};
use crate::middleware::admin_auth_middleware;
use crate::reconciliation::Reconciler;
use crate::services::{
    init_metrics, ApplicationStore, MemoryStore, MockPaymentProvider, PgStore,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::rate_limit::{rate_limit_middleware, RateLimiter};
use service_core::middleware::security_headers::security_headers_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Largest accepted statement upload.
pub const MAX_STATEMENT_BYTES: usize = 10 * 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ShareOfferConfig,
    pub store: Arc<dyn ApplicationStore>,
    pub reconciler: Reconciler,
    pub payment_provider: Arc<MockPaymentProvider>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: ShareOfferConfig, store: Arc<dyn ApplicationStore>) -> Self {
        Self {
            reconciler: Reconciler::new(store.clone()),
            payment_provider: Arc::new(MockPaymentProvider::new(config.public_app_url.clone())),
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            store,
            config,
        }
    }
}

/// Every route of the service with its middleware stack.
pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/applications", get(list_applications))
        .route("/applications/paid", post(set_applications_paid))
        .route("/applications/:id/paid", post(set_application_paid))
        .route("/settings", get(get_settings).post(update_settings))
        .route(
            "/reconciliation",
            post(reconcile_statement).layer(DefaultBodyLimit::max(MAX_STATEMENT_BYTES)),
        )
        .route("/reconciliation/unknown.csv", post(export_unknown_references))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    let rate_limited = Router::new()
        .route("/applications", post(create_application))
        .route("/payments/initiate", post(initiate_payment))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/stats", get(get_stats))
        .route("/applications/:id", get(get_application_status))
        .route("/webhooks/payment", post(payment_webhook))
        .merge(rate_limited)
        .nest("/admin", admin)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application, connecting to PostgreSQL when a database is
    /// configured and falling back to the in-memory store otherwise.
    pub async fn build(config: ShareOfferConfig) -> Result<Self, AppError> {
        let store: Arc<dyn ApplicationStore> = match &config.database {
            Some(database) => {
                let store = PgStore::new(
                    database.url.expose_secret(),
                    database.max_connections,
                    database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;
                store.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;
                Arc::new(store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set - using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        Self::build_with_store(config, store).await
    }

    /// Build the application on top of an existing store.
    pub async fn build_with_store(
        config: ShareOfferConfig,
        store: Arc<dyn ApplicationStore>,
    ) -> Result<Self, AppError> {
        init_metrics();

        if config.admin.token.is_none() {
            tracing::warn!("ADMIN_TOKEN not set - admin routes will reject every request");
        }

        let addr = format!("{}:{}", config.common.host, config.common.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Share offer service listener bound");

        Ok(Self {
            port,
            listener,
            state: AppState::new(config, store),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = router(self.state);

        tracing::info!(
            service = "share-offer-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(
            self.listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
