//! Symphony Server
//!
//! Axum server exposing the pipeline over HTTP: run submission, run
//! history, and a live SSE event feed. Also runs briefs directly from the
//! command line without the server.

use anyhow::Result;
use axum::{routing::get, Json, Router};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tracing_subscriber::EnvFilter;
use utoipa::{OpenApi, ToSchema};

use symphony_core::orchestrator::{Orchestrator, OrchestratorConfig, PipelineEvent};
use symphony_core::store::SymphonyDb;

mod api;

/// Application state shared across handlers
pub struct AppState {
    pub status: RwLock<StatusSnapshot>,
    pub event_tx: broadcast::Sender<PipelineEvent>,
    pub db: Arc<SymphonyDb>,
    pub base_config: OrchestratorConfig,
}

pub type SharedState = Arc<AppState>;

/// What the status endpoint reports
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct StatusSnapshot {
    pub status: String,
    pub active_run: Option<String>,
}

#[derive(Serialize, ToSchema)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::runs::start_run,
        api::runs::list_runs,
        api::runs::get_run,
        api::runs::get_status,
        health,
    ),
    components(schemas(
        api::runs::StartRunRequest,
        api::runs::RunSettings,
        api::runs::StartRunResponse,
        api::runs::RunSummary,
        api::runs::RunDetail,
        StatusSnapshot,
        HealthResponse,
    )),
    tags(
        (name = "runs", description = "Pipeline runs"),
        (name = "status", description = "Server status")
    )
)]
struct ApiDoc;

#[derive(Parser)]
#[command(name = "symphony", about = "Multi-agent AI project generator")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Start the HTTP server
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run one brief directly and print the report
    Run {
        /// The project brief
        brief: String,
    },
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service healthy", body = HealthResponse))
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "symphony",
    })
}

async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// === Server Entry ===

pub async fn run_server(port: u16) -> Result<()> {
    let (event_tx, _) = broadcast::channel::<PipelineEvent>(100);

    let db = Arc::new(SymphonyDb::open()?);

    let state: SharedState = Arc::new(AppState {
        status: RwLock::new(StatusSnapshot {
            status: "idle".to_string(),
            active_run: None,
        }),
        event_tx,
        db,
        base_config: OrchestratorConfig::default(),
    });

    let app = Router::new()
        .nest("/api/v1/runs", api::runs::run_routes())
        .route("/api/v1/status", get(api::runs::get_status))
        .route("/api/v1/openapi.json", get(serve_openapi))
        .route("/health", get(health))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("🚀 Symphony Server running at http://{addr}");
    println!("   Runs:    POST /api/v1/runs, GET /api/v1/runs, GET /api/v1/runs/:id");
    println!("   Events:  GET /api/v1/runs/events (SSE)");
    println!("   Status:  GET /api/v1/status");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run a brief without the server and print a short report.
async fn run_direct(brief: &str) -> Result<()> {
    println!("🚀 Running pipeline for: {brief}");

    let db = Arc::new(SymphonyDb::open()?);
    let config = OrchestratorConfig::default();
    let mut orchestrator = Orchestrator::new(config).with_store(db);

    match orchestrator.run(brief).await {
        Ok(report) => {
            println!("✅ Run {} finished: {:?}", report.run_id, report.status);
            println!("   Project:    {}", report.project_name);
            println!(
                "   Iterations: {} (restarts: {})",
                report.iterations, report.restarts
            );
            if let Some(final_project) = &report.final_project {
                println!(
                    "   Files:      {} under {}",
                    final_project.total_files, final_project.project_dir
                );
                for instruction in &final_project.instructions {
                    println!("   Run with:   {instruction}");
                }
            }
        }
        Err(e) => {
            eprintln!("❌ Run failed: {e:#}");
        }
    }

    Ok(())
}

fn load_env() {
    // Project-local secrets first, then the conventional .env.
    let _ = dotenvy::from_path(".symphony/.env");
    let _ = dotenvy::dotenv();
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Some(CliCommand::Run { brief }) => run_direct(&brief).await,
        Some(CliCommand::Serve { port }) => run_server(port).await,
        None => run_server(8080).await,
    }
}
