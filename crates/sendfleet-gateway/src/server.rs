//! HTTP server implementation using Axum.

use axum::{
    Router,
    routing::{get, post},
};
use sendfleet_core::config::SendFleetConfig;
use sendfleet_core::error::{Result, SendFleetError};
use sendfleet_dispatch::{BatchDispatcher, JobStore, Publisher, SuppressionStore};
use sendfleet_providers::{CredentialStore, ProviderRouter};
use sendfleet_scheduler::{ReminderDb, ReminderTicker};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub config: SendFleetConfig,
    pub publisher: Arc<Publisher>,
    pub jobs: Arc<JobStore>,
    pub suppression: Arc<SuppressionStore>,
    pub credentials: Arc<CredentialStore>,
    pub reminders: Arc<ReminderDb>,
    pub ticker: Arc<ReminderTicker>,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire up every store and engine from one config. The same state is
    /// used by the HTTP server and the CLI subcommands.
    pub fn from_config(config: SendFleetConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let jobs = Arc::new(JobStore::open(&config.data_dir.join("jobs.db"))?);
        let suppression = Arc::new(SuppressionStore::open(
            &config.data_dir.join("suppressions.db"),
        )?);
        let credentials = Arc::new(CredentialStore::open(
            &config.data_dir.join("credentials.db"),
            config.secrets.encrypt,
        )?);
        let reminders = Arc::new(ReminderDb::open(&config.data_dir.join("reminders.db"))?);

        let router = Arc::new(ProviderRouter::new(credentials.clone(), &config.dispatch));
        let publisher = Arc::new(Publisher::new(
            jobs.clone(),
            suppression.clone(),
            router.clone(),
            BatchDispatcher::new(&config.dispatch),
            None,
        ));
        let ticker = Arc::new(ReminderTicker::new(
            reminders.clone(),
            router,
            config.scheduler.tick_batch_limit,
        ));

        Ok(Self {
            config,
            publisher,
            jobs,
            suppression,
            credentials,
            reminders,
            ticker,
            start_time: std::time::Instant::now(),
        })
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/api/v1/campaigns", post(super::routes::publish_campaign))
        .route("/api/v1/jobs", get(super::routes::list_jobs))
        .route("/api/v1/jobs/{id}", get(super::routes::get_job))
        .route("/api/v1/reminders/tick", post(super::routes::reminder_tick))
        .route("/api/v1/appointments", post(super::routes::upsert_appointment))
        .route(
            "/api/v1/appointments/{id}/cancel",
            post(super::routes::cancel_appointment),
        )
        .route(
            "/api/v1/appointments/{id}/reschedule",
            post(super::routes::reschedule_appointment),
        )
        .route(
            "/api/v1/webhooks/suppression/{vendor}",
            post(super::routes::suppression_webhook),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SendFleetError::Config(format!("Bind {addr}: {e}")))?;
    tracing::info!("🚀 Gateway listening on {addr}");
    axum::serve(listener, app)
        .await
        .map_err(|e| SendFleetError::Config(format!("Server error: {e}")))
}
