//! Platform Port: the contract the Build Workflow's activities call through
//! to drive the workload platform (Jobs, Deployments, Services,
//! PodDisruptionBudgets, and HTTP calls into a named Service).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
    Running,
    Pending,
    Unknown,
}

/// Map raw Job counters to domain status (§4.2): succeeded>0 wins over
/// failed>0 wins over active>0; with none set, Pending if the job has not
/// started yet, else Unknown.
pub fn job_status_from_counts(succeeded: i32, failed: i32, active: i32, started: bool) -> JobStatus {
    if succeeded > 0 {
        JobStatus::Succeeded
    } else if failed > 0 {
        JobStatus::Failed
    } else if active > 0 {
        JobStatus::Running
    } else if !started {
        JobStatus::Pending
    } else {
        JobStatus::Unknown
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub namespace: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Ready,
    Unavailable,
    Unknown,
}

/// Map raw available-replica count to domain status (§4.2).
pub fn deployment_status_from_available_replicas(available_replicas: Option<i32>) -> DeploymentStatus {
    match available_replicas {
        Some(n) if n > 0 => DeploymentStatus::Ready,
        Some(0) => DeploymentStatus::Unavailable,
        _ => DeploymentStatus::Unknown,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub namespace: String,
    pub status: DeploymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodDisruptionBudget {
    pub name: String,
    pub namespace: String,
}

/// Specification for a build-and-push Job: given a tar archive on a shared
/// volume and a destination image reference, produce and push the image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJobSpec {
    pub job_name: String,
    pub namespace: String,
    pub tar_path: String,
    pub destination_image: String,
}

/// Specification for rolling out an agent's Deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub container_port: u16,
    pub replicas: i32,
}

impl DeploymentSpec {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            image: image.into(),
            container_port: 8000,
            replicas: 1,
        }
    }
}

/// Specification for exposing a Deployment via a ClusterIP Service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub namespace: String,
    pub service_port: u16,
    pub container_port: u16,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: namespace.into(), service_port: 80, container_port: 8000 }
    }
}

#[async_trait]
pub trait PlatformPort: Send + Sync {
    async fn create_job(&self, namespace: &str, spec: &BuildJobSpec, overwrite: bool) -> Result<Job>;
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>>;
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()>;

    async fn create_deployment(&self, namespace: &str, spec: &DeploymentSpec, overwrite: bool) -> Result<Deployment>;
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;
    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()>;

    async fn create_service(&self, namespace: &str, spec: &ServiceSpec, overwrite: bool) -> Result<Service>;
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()>;

    async fn create_pod_disruption_budget(
        &self,
        namespace: &str,
        name: &str,
        min_available: u32,
        overwrite: bool,
    ) -> Result<PodDisruptionBudget>;
    async fn delete_pod_disruption_budget(&self, namespace: &str, name: &str) -> Result<()>;

    /// Resolves to `http://{name}.{namespace}:{port|default}/{path}`.
    async fn call_service(
        &self,
        namespace: &str,
        name: &str,
        port: Option<u16>,
        path: &str,
        method: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<serde_json::Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_mapping_prefers_succeeded_over_failed_over_active() {
        assert_eq!(job_status_from_counts(1, 1, 1, true), JobStatus::Succeeded);
        assert_eq!(job_status_from_counts(0, 1, 1, true), JobStatus::Failed);
        assert_eq!(job_status_from_counts(0, 0, 1, true), JobStatus::Running);
    }

    #[test]
    fn job_status_pending_before_start_else_unknown() {
        assert_eq!(job_status_from_counts(0, 0, 0, false), JobStatus::Pending);
        assert_eq!(job_status_from_counts(0, 0, 0, true), JobStatus::Unknown);
    }

    #[test]
    fn deployment_status_mapping() {
        assert_eq!(deployment_status_from_available_replicas(Some(2)), DeploymentStatus::Ready);
        assert_eq!(deployment_status_from_available_replicas(Some(0)), DeploymentStatus::Unavailable);
        assert_eq!(deployment_status_from_available_replicas(None), DeploymentStatus::Unknown);
    }
}
