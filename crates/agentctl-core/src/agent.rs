//! Agent domain entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Agent lifecycle status.
///
/// `Active`/`Idle` are per-task-execution statuses written by the Task
/// Workflow around each task; `Ready` is a fleet-level readiness signal
/// written once by the Build Workflow and never touched by the Task
/// Workflow. The two sets of writers never race because they write
/// disjoint fields via disjoint activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Building,
    Idle,
    Active,
    Ready,
    Failed,
    Unknown,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Building => "building",
            AgentStatus::Idle => "idle",
            AgentStatus::Active => "active",
            AgentStatus::Ready => "ready",
            AgentStatus::Failed => "failed",
            AgentStatus::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl From<&str> for AgentStatus {
    fn from(s: &str) -> Self {
        match s {
            "pending" => AgentStatus::Pending,
            "building" => AgentStatus::Building,
            "idle" => AgentStatus::Idle,
            "active" => AgentStatus::Active,
            "ready" => AgentStatus::Ready,
            "failed" => AgentStatus::Failed,
            _ => AgentStatus::Unknown,
        }
    }
}

/// A user-registered agent: a container image that exposes an HTTP action
/// catalog, driven by the Build Workflow (onboarding) and the Task Workflow
/// (per-task execution).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Agent {
    pub id: Uuid,
    /// Unique across all agents; also the seed for the deterministic,
    /// replay-safe Deployment/Service/PDB name (see `sanitize_resource_name`).
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Which workflow type and task queue the task router dispatches to.
    pub workflow_name: String,
    pub workflow_queue_name: String,
    /// Set once the Build Workflow has pushed the image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_job_namespace: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pure sanitization of `agent.name` into a valid Kubernetes-style resource
/// name: lowercase, `_` and `.` become `-`. No random suffix, so the same
/// agent always yields the same Deployment/Service/PDB name across replays.
pub fn sanitize_resource_name(agent_name: &str) -> String {
    agent_name
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == '.' { '-' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_is_deterministic_and_lowercases() {
        assert_eq!(sanitize_resource_name("Hello_World.v2"), "hello-world-v2");
        assert_eq!(sanitize_resource_name("Hello_World.v2"), sanitize_resource_name("Hello_World.v2"));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            AgentStatus::Pending,
            AgentStatus::Building,
            AgentStatus::Idle,
            AgentStatus::Active,
            AgentStatus::Ready,
            AgentStatus::Failed,
        ] {
            assert_eq!(AgentStatus::from(status.to_string().as_str()), status);
        }
    }

    #[test]
    fn unknown_string_maps_to_unknown_status() {
        assert_eq!(AgentStatus::from("bogus"), AgentStatus::Unknown);
    }
}
