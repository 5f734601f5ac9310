//! Task resource (§4.5 Task Workflow trigger) plus the human-in-the-loop
//! signal surface (instruct/approve) and external cancel/terminate.

use std::sync::Arc;
use std::time::Duration;

use agentctl_core::{
    sanitize_resource_name, CoreError, DuplicateWorkflowPolicy, HumanInstruction, RetryPolicy, StartWorkflowOptions,
    Task, TaskStatus, WorkflowEngineClient, WorkflowInput,
};
use agentctl_storage::{CreateTask, Database, TaskRow};
use agentctl_worker::workflows::{TaskWorkflow, TaskWorkflowInput};
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
    pub task_queue: String,
    pub agents_namespace: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    pub agent_id: Uuid,
    pub prompt: String,
    #[serde(default)]
    pub require_approval: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InstructRequest {
    pub prompt: String,
}

fn to_domain(row: TaskRow) -> Task {
    Task {
        id: row.id,
        agent_id: row.agent_id,
        prompt: row.prompt,
        require_approval: row.require_approval,
        status: row.status.as_deref().map(TaskStatus::from),
        status_reason: row.status_reason,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

#[utoipa::path(
    post,
    path = "/tasks",
    request_body = CreateTaskRequest,
    responses((status = 201, description = "Task created and workflow started", body = Task)),
    tag = "tasks"
)]
pub async fn create_task(State(state): State<AppState>, Json(req): Json<CreateTaskRequest>) -> Result<Json<Task>, ApiError> {
    let agent = state
        .db
        .get_agent(req.agent_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("agent {} not found", req.agent_id)))?;

    let id = Uuid::now_v7();
    let row = state
        .db
        .create_task(CreateTask { id, agent_id: req.agent_id, prompt: req.prompt.clone(), require_approval: req.require_approval })
        .await?;

    let input = TaskWorkflowInput {
        task_id: id,
        agent_id: req.agent_id,
        prompt: req.prompt,
        namespace: state.agents_namespace.clone(),
        service_name: sanitize_resource_name(&agent.name),
        service_port: None,
        require_approval: req.require_approval,
    };

    state
        .engine
        .start_workflow(
            StartWorkflowOptions {
                workflow_name: <TaskWorkflow as WorkflowInput>::WORKFLOW_TYPE.to_string(),
                id: id.to_string(),
                task_queue: state.task_queue.clone(),
                duplicate_policy: DuplicateWorkflowPolicy::RejectDuplicate,
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
    path = "/tasks/{id}",
    responses((status = 200, description = "Task found", body = Task), (status = 404, description = "Task not found")),
    tag = "tasks"
)]
pub async fn get_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Task>, ApiError> {
    let row = state.db.get_task(id).await?.ok_or_else(|| ApiError::not_found(format!("task {id} not found")))?;

    let description = state.engine.get_workflow_status(&id.to_string()).await?;
    if description.is_terminal {
        let status = match description.status {
            agentctl_core::WorkflowStatus::Completed => Some(TaskStatus::Completed),
            agentctl_core::WorkflowStatus::Failed => Some(TaskStatus::Failed),
            agentctl_core::WorkflowStatus::Canceled => Some(TaskStatus::Canceled),
            agentctl_core::WorkflowStatus::Terminated => Some(TaskStatus::Terminated),
            agentctl_core::WorkflowStatus::TimedOut => Some(TaskStatus::TimedOut),
            _ => None,
        };
        if let Some(status) = status {
            let updated = state
                .db
                .update_task_status(
                    id,
                    agentctl_storage::UpdateTaskStatus { status: Some(status.to_string()), status_reason: description.reason },
                )
                .await?
                .unwrap_or(row);
            return Ok(Json(to_domain(updated)));
        }
    }

    Ok(Json(to_domain(row)))
}

#[utoipa::path(
    get,
    path = "/agents/{id}/tasks",
    responses((status = 200, description = "List tasks for an agent", body = [Task])),
    tag = "tasks"
)]
pub async fn list_tasks(State(state): State<AppState>, Path(agent_id): Path<Uuid>) -> Result<Json<Vec<Task>>, ApiError> {
    let rows = state.db.list_tasks_for_agent(agent_id).await?;
    Ok(Json(rows.into_iter().map(to_domain).collect()))
}

#[utoipa::path(
    post,
    path = "/tasks/{id}/instruct",
    request_body = InstructRequest,
    responses((status = 202, description = "Instruction delivered")),
    tag = "tasks"
)]
pub async fn instruct(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<InstructRequest>,
) -> Result<axum::http::StatusCode, ApiError> {
    let payload = serde_json::to_value(HumanInstruction { task_id: id, prompt: req.prompt })
        .map_err(|e| CoreError::client(e.to_string()))?;
    state.engine.send_signal(&id.to_string(), "instruct", payload).await?;
    Ok(axum::http::StatusCode::ACCEPTED)
}

#[utoipa::path(
    post,
    path = "/tasks/{id}/approve",
    responses((status = 202, description = "Approval delivered")),
    tag = "tasks"
)]
pub async fn approve(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<axum::http::StatusCode, ApiError> {
    state.engine.send_signal(&id.to_string(), "approve", serde_json::Value::Null).await?;
    Ok(axum::http::StatusCode::ACCEPTED)
}

#[utoipa::path(
    post,
    path = "/tasks/{id}/cancel",
    responses((status = 202, description = "Cancellation requested")),
    tag = "tasks"
)]
pub async fn cancel(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<axum::http::StatusCode, ApiError> {
    state.engine.cancel_workflow(&id.to_string()).await?;
    Ok(axum::http::StatusCode::ACCEPTED)
}

#[utoipa::path(
    post,
    path = "/tasks/{id}/terminate",
    responses((status = 202, description = "Termination requested")),
    tag = "tasks"
)]
pub async fn terminate(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<axum::http::StatusCode, ApiError> {
    state.engine.terminate_workflow(&id.to_string()).await?;
    Ok(axum::http::StatusCode::ACCEPTED)
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(create_task))
        .route("/tasks/{id}", get(get_task))
        .route("/agents/{id}/tasks", get(list_tasks))
        .route("/tasks/{id}/instruct", post(instruct))
        .route("/tasks/{id}/approve", post(approve))
        .route("/tasks/{id}/cancel", post(cancel))
        .route("/tasks/{id}/terminate", post(terminate))
        .with_state(state)
}
