//! Rollgate API /v1: REST endpoints
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod relay;

use axum::{
    routing::{get, post},
    Router,
};
use rollgate_workflow::{AuditLog, ChangeRequestWorkflow, MemoryStore};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use config::{ApiConfig, ConfigError};
pub use error::{ApiError, ServerError};
pub use metrics::Metrics;
pub use relay::RelayProxyRefresh;

#[derive(Clone)]
pub struct AppState {
    pub workflow: ChangeRequestWorkflow<MemoryStore>,
    pub audit: Arc<AuditLog>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire the workflow, audit log and relay client from `config`.
    pub fn from_config(config: &ApiConfig) -> Result<Self, ServerError> {
        let audit = Arc::new(AuditLog::with_max_entries(config.audit_max_entries));
        let mut workflow = ChangeRequestWorkflow::new(Arc::new(MemoryStore::new()))
            .with_audit(audit.clone())
            .with_settings(config.workflow_settings());

        if let Some(url) = &config.relay_proxy_url {
            let relay = RelayProxyRefresh::new(url, config.admin_api_key.clone())?;
            tracing::info!(endpoint = relay.endpoint(), "relay refresh enabled");
            workflow = workflow.with_refresh(Arc::new(relay));
        }

        Ok(Self {
            workflow,
            audit,
            metrics: Arc::new(Metrics::new()?),
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handlers::health))
        .route("/v1/validate", post(handlers::validate_config))
        .route("/v1/validate/query", post(handlers::validate_query))
        .route(
            "/v1/change-requests",
            get(handlers::list_change_requests).post(handlers::create_change_request),
        )
        .route("/v1/change-requests/count", get(handlers::count_pending))
        .route("/v1/change-requests/{id}", get(handlers::get_change_request))
        .route("/v1/change-requests/{id}/review", post(handlers::review_change_request))
        .route("/v1/change-requests/{id}/apply", post(handlers::apply_change_request))
        .route("/v1/change-requests/{id}/cancel", post(handlers::cancel_change_request))
        .route("/v1/projects/{project}/flags/{key}", get(handlers::get_flag))
        .route("/v1/audit", get(handlers::list_audit))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: ApiConfig) -> Result<(), ServerError> {
    let state = AppState::from_config(&config)?;
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(&config.addr).await?;

    tracing::info!(
        addr = %config.addr,
        stale_apply = %config.stale_apply,
        "Rollgate API listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
