//! HTTP service exposing batch evaluation.
//!
//! - `POST /evaluator` -- evaluate a model on the configured environment
//! - `GET  /health`    -- liveness, always `"ok"`
//!
//! Evaluations run on a blocking worker thread so a long batch never starves
//! the request loop.

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::agent::ApiAgent;
use crate::config::{AgentConfig, HarnessConfig};
use crate::env::{EnvRegistry, EnvSettings};
use crate::error::{HarnessError, Result};
use crate::eval::{run_batch, BatchSpec, EvaluationReport};

pub use api::{ApiError, EvaluatorRequest};

/// Shared, read-only state of the service.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<HarnessConfig>,
    pub registry: Arc<EnvRegistry>,
}

impl AppState {
    pub fn new(config: Arc<HarnessConfig>, registry: Arc<EnvRegistry>) -> Self {
        Self { config, registry }
    }
}

/// Build the axum `Router`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/evaluator", post(evaluator_handler))
        .with_state(Arc::new(state))
}

/// Bind `host:port` from the configuration and serve until shutdown.
pub async fn run(state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port)
        .parse()
        .map_err(|e| HarnessError::Config(format!("invalid listen address: {e}")))?;

    info!(
        %addr,
        env = %state.config.env_name,
        task = %state.config.task_name(),
        "starting evaluation service"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler() -> Json<&'static str> {
    Json("ok")
}

async fn evaluator_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EvaluatorRequest>,
) -> std::result::Result<Json<EvaluationReport>, ApiError> {
    let config = &state.config;
    let env = config.task_name().to_string();
    if !state.registry.contains(&env) {
        return Err(HarnessError::UnknownEnvironment {
            name: env,
            known: state.registry.names().join(", "),
        }
        .into());
    }

    if config.agent.api_key.is_empty() {
        return Err(ApiError::unauthorized(
            "CHUTES_API_KEY environment variable is not set",
        ));
    }

    let agent = ApiAgent::new(&AgentConfig {
        base_url: request.base_url.clone(),
        model: request.model.clone(),
        max_tokens: request.max_tokens.unwrap_or(0),
        temperature: request.temperature,
        top_p: request.top_p,
        ..config.agent.clone()
    })?;

    let key_ok = match agent.validate_key().await {
        Ok(ok) => ok,
        Err(e) => {
            warn!(error = %e, "API key validation failed");
            false
        }
    };
    if !key_ok {
        return Err(ApiError::unauthorized(format!(
            "Invalid API key for {}. Please check your CHUTES_API_KEY environment variable.",
            request.base_url
        )));
    }
    info!(base_url = %request.base_url, model = %request.model, "API key validated");

    let spec = BatchSpec {
        env,
        report_name: config.env_name.clone(),
        settings: EnvSettings::new(
            config.resolved_server_base(&request.server_base()),
            request.data_len,
            request.timeout,
        ),
        n_clients: config.n_clients,
        max_round: request.max_round,
        ids: request.resolved_ids(config.max_default_ids),
    };

    let registry = Arc::clone(&state.registry);
    let report = tokio::task::spawn_blocking(move || {
        Handle::current().block_on(async move { run_batch(&registry, &spec, agent).await })
    })
    .await
    .map_err(|e| ApiError::internal(format!("evaluation worker failed: {e}")))??;

    Ok(Json(report))
}
