//! # Run API
//!
//! Endpoints for starting pipeline runs, reading their status and reports,
//! and streaming live events.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use utoipa::ToSchema;

use symphony_core::models::LlmProvider;
use symphony_core::orchestrator::{Orchestrator, OrchestratorConfig};
use symphony_core::store::{self, RunManager, RunRecord};

use crate::{SharedState, StatusSnapshot};

/// Request to start a run
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartRunRequest {
    /// The project brief
    pub brief: String,
    /// Optional per-run overrides
    pub settings: Option<RunSettings>,
}

/// Per-run configuration overrides
#[derive(Debug, Deserialize, ToSchema)]
pub struct RunSettings {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_iterations: Option<u32>,
    pub max_restarts: Option<u32>,
    pub max_concurrent_tasks: Option<usize>,
}

/// Response after starting a run
#[derive(Debug, Serialize, ToSchema)]
pub struct StartRunResponse {
    pub success: bool,
    pub run_id: String,
    pub message: String,
}

/// One run in list/detail responses
#[derive(Debug, Serialize, ToSchema)]
pub struct RunSummary {
    pub id: String,
    pub brief: String,
    pub status: String,
    pub project_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Full run detail including the report when finished
#[derive(Debug, Serialize, ToSchema)]
pub struct RunDetail {
    #[serde(flatten)]
    pub summary: RunSummary,
    #[schema(value_type = Object)]
    pub report: Option<serde_json::Value>,
}

impl From<&RunRecord> for RunSummary {
    fn from(record: &RunRecord) -> Self {
        Self {
            id: record.id.clone(),
            brief: record.brief.clone(),
            status: format!("{:?}", record.status).to_lowercase(),
            project_name: record.project_name.clone(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }
}

pub fn run_routes() -> Router<SharedState> {
    Router::new()
        .route("/", post(start_run).get(list_runs))
        .route("/events", get(events))
        .route("/:id", get(get_run))
}

/// Build the run's orchestrator config: server defaults plus request
/// overrides.
fn build_config(base: &OrchestratorConfig, settings: Option<&RunSettings>) -> OrchestratorConfig {
    let mut config = base.clone();
    let Some(settings) = settings else {
        return config;
    };

    if let Some(provider) = &settings.provider {
        config.global_provider = match provider.as_str() {
            "gemini" => LlmProvider::Gemini,
            "huggingface" => LlmProvider::HuggingFace,
            "openai_compatible" => LlmProvider::OpenAiCompatible,
            _ => config.global_provider,
        };
    }
    if let Some(model) = &settings.model {
        config.global_model = Some(model.clone());
    }
    if let Some(base_url) = &settings.base_url {
        config.base_url = Some(base_url.clone());
    }
    if let Some(max_iterations) = settings.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(max_restarts) = settings.max_restarts {
        config.max_restarts = max_restarts;
    }
    if let Some(max_concurrent) = settings.max_concurrent_tasks {
        config.max_concurrent_tasks = max_concurrent;
    }

    config
}

/// Start a run; work continues in the background
#[utoipa::path(
    post,
    path = "/api/v1/runs",
    tag = "runs",
    request_body = StartRunRequest,
    responses(
        (status = 200, description = "Run started", body = StartRunResponse)
    )
)]
pub async fn start_run(
    State(state): State<SharedState>,
    Json(req): Json<StartRunRequest>,
) -> Json<StartRunResponse> {
    let run_id = store::generate_run_id();
    let config = build_config(&state.base_config, req.settings.as_ref());

    {
        let mut status = state.status.write().await;
        status.status = "running".to_string();
        status.active_run = Some(run_id.clone());
    }

    tracing::info!(run_id = %run_id, "starting pipeline run");

    // Bridge orchestrator events into the broadcast channel.
    let (event_tx, mut event_rx) = mpsc::channel(100);
    let broadcast_tx = state.event_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let _ = broadcast_tx.send(event);
        }
    });

    let db = Arc::clone(&state.db);
    let state_clone = Arc::clone(&state);
    let brief = req.brief.clone();
    let spawned_run_id = run_id.clone();

    tokio::spawn(async move {
        let mut orchestrator = Orchestrator::new(config)
            .with_store(db)
            .with_event_channel(event_tx);

        let outcome = orchestrator.run_with_id(&spawned_run_id, &brief).await;

        let mut status = state_clone.status.write().await;
        match outcome {
            Ok(report) => {
                tracing::info!(run_id = %spawned_run_id, status = ?report.status, "run finished");
                status.status = format!("{:?}", report.status).to_lowercase();
            }
            Err(e) => {
                tracing::error!(run_id = %spawned_run_id, error = %e, "run failed");
                status.status = "error".to_string();
            }
        }
        status.active_run = None;
    });

    Json(StartRunResponse {
        success: true,
        message: format!("Run {run_id} started"),
        run_id,
    })
}

/// List recent runs
#[utoipa::path(
    get,
    path = "/api/v1/runs",
    tag = "runs",
    responses(
        (status = 200, description = "Recent runs", body = Vec<RunSummary>)
    )
)]
pub async fn list_runs(State(state): State<SharedState>) -> Json<Vec<RunSummary>> {
    let mgr = RunManager::new(&state.db);
    match mgr.list(50) {
        Ok(records) => Json(records.iter().map(RunSummary::from).collect()),
        Err(e) => {
            tracing::error!(error = %e, "failed to list runs");
            Json(vec![])
        }
    }
}

/// Fetch one run with its report
#[utoipa::path(
    get,
    path = "/api/v1/runs/{id}",
    tag = "runs",
    params(("id" = String, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run detail", body = RunDetail),
        (status = 404, description = "Run not found")
    )
)]
pub async fn get_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<RunDetail>, StatusCode> {
    let mgr = RunManager::new(&state.db);
    let record = mgr.load(&id).map_err(|_| StatusCode::NOT_FOUND)?;

    let report = record
        .report
        .as_ref()
        .and_then(|r| serde_json::to_value(r).ok());

    Ok(Json(RunDetail {
        summary: RunSummary::from(&record),
        report,
    }))
}

/// SSE endpoint for real-time events with heartbeat
pub async fn events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();

    // Timeout-based stream with a heartbeat comment every 15 seconds.
    let stream = stream::unfold(rx, |mut rx| async move {
        let timeout = tokio::time::timeout(std::time::Duration::from_secs(15), rx.recv()).await;

        match timeout {
            Ok(Ok(event)) => {
                let json = serde_json::to_string(&event).unwrap_or_default();
                Some((Ok(Event::default().data(json)), rx))
            }
            Ok(Err(_)) => None, // Channel closed
            Err(_) => Some((Ok(Event::default().comment("heartbeat")), rx)),
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Current server status
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "status",
    responses(
        (status = 200, description = "Server status", body = StatusSnapshot)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<StatusSnapshot> {
    Json(state.status.read().await.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_applies_overrides() {
        let base = OrchestratorConfig::default();
        let settings = RunSettings {
            provider: Some("huggingface".to_string()),
            model: Some("google/flan-t5-xxl".to_string()),
            base_url: None,
            max_iterations: Some(5),
            max_restarts: None,
            max_concurrent_tasks: Some(1),
        };

        let config = build_config(&base, Some(&settings));
        assert_eq!(config.global_provider, LlmProvider::HuggingFace);
        assert_eq!(config.global_model.as_deref(), Some("google/flan-t5-xxl"));
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.max_concurrent_tasks, 1);
        // Untouched fields keep defaults.
        assert_eq!(config.max_restarts, base.max_restarts);
    }

    #[test]
    fn test_build_config_ignores_unknown_provider() {
        let base = OrchestratorConfig::default();
        let settings = RunSettings {
            provider: Some("skynet".to_string()),
            model: None,
            base_url: None,
            max_iterations: None,
            max_restarts: None,
            max_concurrent_tasks: None,
        };

        let config = build_config(&base, Some(&settings));
        assert_eq!(config.global_provider, base.global_provider);
    }
}
