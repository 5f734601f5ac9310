//! Agent resource (§4.4 Build Workflow trigger): registers an agent row and
//! starts its Build Workflow with a deterministic workflow id equal to the
//! agent's own id.

use std::sync::Arc;
use std::time::Duration;

use agentctl_core::{
    Agent, AgentStatus, CoreError, DuplicateWorkflowPolicy, RetryPolicy, StartWorkflowOptions, WorkflowEngineClient,
    WorkflowInput,
};
use agentctl_storage::{AgentRow, CreateAgent, Database};
use agentctl_worker::workflows::{BuildWorkflow, BuildWorkflowInput, TaskWorkflow};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub engine: Arc<dyn WorkflowEngineClient>,
    /// Single task queue this deployment's worker polls for both Build and
    /// Task workflows.
    pub task_queue: String,
    pub agents_namespace: String,
    pub registry_url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAgentRequest {
    pub name: String,
    pub description: Option<String>,
    /// Path to the uploaded build context archive on the shared build volume.
    pub agent_tar_path: String,
    #[serde(default)]
    pub workflow_name: Option<String>,
    #[serde(default)]
    pub workflow_queue_name: Option<String>,
    #[serde(default = "default_container_port")]
    pub container_port: u16,
}

fn default_container_port() -> u16 {
    8080
}

fn to_domain(row: AgentRow) -> Agent {
    Agent {
        id: row.id,
        name: row.name,
        description: row.description,
        workflow_name: row.workflow_name,
        workflow_queue_name: row.workflow_queue_name,
        docker_image: row.docker_image,
        status: AgentStatus::from(row.status.as_str()),
        status_reason: row.status_reason,
        build_job_name: row.build_job_name,
        build_job_namespace: row.build_job_namespace,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

#[utoipa::path(
    post,
    path = "/agents",
    request_body = CreateAgentRequest,
    responses((status = 201, description = "Agent registered and build started", body = Agent)),
    tag = "agents"
)]
pub async fn create_agent(
    State(state): State<AppState>,
    Json(req): Json<CreateAgentRequest>,
) -> Result<Json<Agent>, ApiError> {
    if state.db.get_agent_by_name(&req.name).await?.is_some() {
        return Err(CoreError::duplicate(format!("agent name already taken: {}", req.name)).into());
    }

    let id = Uuid::now_v7();
    let workflow_name =
        req.workflow_name.unwrap_or_else(|| <TaskWorkflow as WorkflowInput>::WORKFLOW_TYPE.to_string());
    let workflow_queue_name = req.workflow_queue_name.unwrap_or_else(|| state.task_queue.clone());

    let row = state
        .db
        .create_agent(CreateAgent {
            id,
            name: req.name.clone(),
            description: req.description,
            workflow_name,
            workflow_queue_name,
        })
        .await?;

    let input = BuildWorkflowInput {
        agent_id: id,
        agent_name: req.name,
        agent_tar_path: req.agent_tar_path,
        namespace: state.agents_namespace.clone(),
        registry_url: state.registry_url.clone(),
        container_port: req.container_port,
    };

    state
        .engine
        .start_workflow(
            StartWorkflowOptions {
                workflow_name: <BuildWorkflow as WorkflowInput>::WORKFLOW_TYPE.to_string(),
                id: id.to_string(),
                task_queue: state.task_queue.clone(),
                duplicate_policy: DuplicateWorkflowPolicy::TerminateIfRunning,
                retry_policy: RetryPolicy::default(),
                task_timeout: Duration::from_secs(10),
                execution_timeout: Duration::from_secs(24 * 60 * 60),
            },
            serde_json::to_value(input).map_err(|e| CoreError::client(e.to_string()))?,
        )
        .await?;

    Ok(Json(to_domain(row)))
}

#[utoipa::path(
    get,
    path = "/agents/{id}",
    responses((status = 200, description = "Agent found", body = Agent), (status = 404, description = "Agent not found")),
    tag = "agents"
)]
pub async fn get_agent(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Agent>, ApiError> {
    let row = state.db.get_agent(id).await?.ok_or_else(|| ApiError::not_found(format!("agent {id} not found")))?;
    Ok(Json(to_domain(row)))
}

#[utoipa::path(
    get,
    path = "/agents",
    responses((status = 200, description = "List agents", body = [Agent])),
    tag = "agents"
)]
pub async fn list_agents(State(state): State<AppState>) -> Result<Json<Vec<Agent>>, ApiError> {
    let rows = state.db.list_agents().await?;
    Ok(Json(rows.into_iter().map(to_domain).collect()))
}

#[utoipa::path(
    delete,
    path = "/agents/{id}",
    responses((status = 204, description = "Agent deleted")),
    tag = "agents"
)]
pub async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, ApiError> {
    let _ = state.engine.terminate_workflow(&id.to_string()).await;
    state.db.delete_agent(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/agents", post(create_agent).get(list_agents))
        .route("/agents/{id}", get(get_agent).delete(delete_agent))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_container_port_is_8080() {
        assert_eq!(default_container_port(), 8080);
    }
}
