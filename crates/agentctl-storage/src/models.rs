//! Row and input types for the Postgres schema. Kept separate from
//! `agentctl_core`'s domain types: a row is what the database returns, a
//! domain type is what the rest of the system consumes.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct AgentRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub workflow_name: String,
    pub workflow_queue_name: String,
    pub docker_image: Option<String>,
    pub status: String,
    pub status_reason: Option<String>,
    pub build_job_name: Option<String>,
    pub build_job_namespace: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAgent {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub workflow_name: String,
    pub workflow_queue_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateAgentStatus {
    pub status: Option<String>,
    pub status_reason: Option<String>,
    pub docker_image: Option<String>,
    pub build_job_name: Option<String>,
    pub build_job_namespace: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub prompt: String,
    pub require_approval: bool,
    pub status: Option<String>,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTask {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub prompt: String,
    pub require_approval: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskStatus {
    pub status: Option<String>,
    pub status_reason: Option<String>,
}
