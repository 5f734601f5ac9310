mod agents;
mod config;
mod error;
mod tasks;

use std::sync::Arc;

use agentctl_core::{Agent, AgentStatus, HumanInstruction, Task, TaskStatus, WorkflowEngineClient};
use agentctl_storage::Database;
use agentctl_worker::{BuildConfig, DatabaseConfig, PlatformConfig, TemporalClient, WorkerConfig};
use anyhow::{Context, Result};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

#[derive(OpenApi)]
#[openapi(
    paths(
        agents::create_agent,
        agents::list_agents,
        agents::get_agent,
        agents::delete_agent,
        tasks::create_task,
        tasks::get_task,
        tasks::list_tasks,
        tasks::instruct,
        tasks::approve,
        tasks::cancel,
        tasks::terminate,
    ),
    components(schemas(
        Agent, AgentStatus,
        Task, TaskStatus,
        HumanInstruction,
        agents::CreateAgentRequest,
        tasks::CreateTaskRequest,
        tasks::InstructRequest,
    )),
    tags(
        (name = "agents", description = "Agent registration and build lifecycle"),
        (name = "tasks", description = "Task execution, human-in-the-loop signals, and cancellation"),
    ),
    info(
        title = "Agent Control Plane API",
        version = "0.1.0",
        description = "REST surface over durable Agent Build and Task workflows",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "agentctl_api=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_config = DatabaseConfig::from_env()?;
    let worker_config = WorkerConfig::from_env();
    let build_config = BuildConfig::from_env();
    let platform_config = PlatformConfig::from_env();
    let server_config = config::ServerConfig::from_env();

    let db = Database::from_url(database_config.database_url()).await.context("failed to connect to database")?;
    db.migrate().await.context("failed to run migrations")?;
    let db = Arc::new(db);

    let engine: Arc<dyn WorkflowEngineClient> =
        Arc::new(TemporalClient::connect(&worker_config.temporal_address(), &worker_config.temporal_namespace()).await?);

    let agents_state = agents::AppState {
        db: db.clone(),
        engine: engine.clone(),
        task_queue: worker_config.temporal_task_queue(),
        agents_namespace: platform_config.agents_namespace(),
        registry_url: build_config.registry_url(),
    };
    let tasks_state = tasks::AppState {
        db: db.clone(),
        engine: engine.clone(),
        task_queue: worker_config.temporal_task_queue(),
        agents_namespace: platform_config.agents_namespace(),
    };

    let app = Router::new()
        .route("/health", get(health))
        .merge(agents::routes(agents_state))
        .merge(tasks::routes(tasks_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let addr = server_config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind to address")?;
    tracing::info!(%addr, "agentctl-api listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
