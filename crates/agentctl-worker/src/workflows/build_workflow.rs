//! Build Workflow (C4, §4.4): build → push → deploy → expose → readiness,
//! with compensating deletes on partial rollout failure.

use std::time::Duration;

use agentctl_core::{
    sanitize_resource_name, ActivityError, ActivityOptions, BuildJobSpec, Deployment, DeploymentSpec, DeploymentStatus,
    Job, JobStatus, RetryPolicy, ServiceSpec, Workflow, WorkflowAction, WorkflowError, WorkflowInput,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_POLL_ATTEMPTS: u32 = 360;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildWorkflowInput {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub agent_tar_path: String,
    pub namespace: String,
    pub registry_url: String,
    pub container_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting,
    PollingBuildJob { attempt: u32 },
    PollingDeployment { attempt: u32 },
    CreatingService,
    CreatingPdb,
    Done,
}

#[derive(Debug)]
pub struct BuildWorkflow {
    input: BuildWorkflowInput,
    resource_name: String,
    destination_image: String,
    build_job_name: String,
    phase: Phase,
    completed: bool,
}

impl BuildWorkflow {
    fn retrying(retry: RetryPolicy) -> ActivityOptions {
        ActivityOptions::default().with_retry(retry)
    }

    fn schedule(activity_id: &str, activity_type: &str, input: Value, options: ActivityOptions) -> WorkflowAction {
        WorkflowAction::schedule_activity(activity_id, activity_type, input, options)
    }

    fn build_job_spec(&self) -> BuildJobSpec {
        BuildJobSpec {
            job_name: self.build_job_name.clone(),
            namespace: self.input.namespace.clone(),
            tar_path: self.input.agent_tar_path.clone(),
            destination_image: self.destination_image.clone(),
        }
    }

    fn deployment_spec(&self) -> DeploymentSpec {
        let mut spec =
            DeploymentSpec::new(self.resource_name.clone(), self.input.namespace.clone(), self.destination_image.clone());
        spec.container_port = self.input.container_port;
        spec
    }

    fn service_spec(&self) -> ServiceSpec {
        let mut spec = ServiceSpec::new(self.resource_name.clone(), self.input.namespace.clone());
        spec.container_port = self.input.container_port;
        spec
    }

    fn build_failure_reason(&self) -> String {
        format!(
            "Build job '{}' failed. Build and push the image locally, then register the agent with a prebuilt image.",
            self.build_job_name
        )
    }

    fn mark_failed_action(&self, reason: impl Into<String>) -> WorkflowAction {
        Self::schedule(
            "mark-failed",
            "update_agent_status",
            json!({"agent_id": self.input.agent_id, "status": "failed", "status_reason": reason.into()}),
            Self::retrying(RetryPolicy::bounded(3)),
        )
    }

    fn fail(&mut self, message: impl Into<String>) -> Vec<WorkflowAction> {
        self.completed = true;
        self.phase = Phase::Done;
        let message = message.into();
        vec![self.mark_failed_action(message.clone()), WorkflowAction::fail(WorkflowError::new(message))]
    }

    /// Best-effort delete of Service then Deployment, attempted alongside
    /// (not blocking) the workflow's own failure.
    fn compensate_and_fail(&mut self, message: impl Into<String>) -> Vec<WorkflowAction> {
        self.completed = true;
        self.phase = Phase::Done;
        let message = message.into();
        vec![
            Self::schedule(
                "delete-service",
                "delete_service",
                json!({"namespace": self.input.namespace, "name": self.resource_name}),
                ActivityOptions::default(),
            ),
            Self::schedule(
                "delete-deployment",
                "delete_deployment",
                json!({"namespace": self.input.namespace, "name": self.resource_name}),
                ActivityOptions::default(),
            ),
            self.mark_failed_action(message.clone()),
            WorkflowAction::fail(WorkflowError::new(message)),
        ]
    }

    fn handle_build_job_poll(&mut self, result: Value) -> Vec<WorkflowAction> {
        let attempt = match self.phase {
            Phase::PollingBuildJob { attempt } => attempt,
            _ => 0,
        };
        let job: Option<Job> = serde_json::from_value(result).unwrap_or(None);
        match job.map(|j| j.status) {
            Some(JobStatus::Succeeded) => {
                self.phase = Phase::PollingDeployment { attempt: 0 };
                vec![Self::schedule(
                    "create-deployment",
                    "create_deployment",
                    json!({"namespace": self.input.namespace, "spec": self.deployment_spec()}),
                    Self::retrying(RetryPolicy::bounded(3)),
                )]
            }
            Some(JobStatus::Failed) | Some(JobStatus::Unknown) | None => {
                let message = self.build_failure_reason();
                self.fail(message)
            }
            Some(JobStatus::Pending) | Some(JobStatus::Running) => {
                if attempt + 1 >= MAX_POLL_ATTEMPTS {
                    self.completed = true;
                    self.phase = Phase::Done;
                    let message = format!(
                        "Build job '{}' timed out after 30 minutes without completing.",
                        self.build_job_name
                    );
                    vec![
                        Self::schedule(
                            "delete-build-job-timeout",
                            "delete_build_job",
                            json!({"namespace": self.input.namespace, "name": self.build_job_name}),
                            ActivityOptions::default(),
                        ),
                        self.mark_failed_action(message.clone()),
                        WorkflowAction::fail(WorkflowError::new(message)),
                    ]
                } else {
                    self.phase = Phase::PollingBuildJob { attempt: attempt + 1 };
                    vec![WorkflowAction::timer("poll-build-job", POLL_INTERVAL)]
                }
            }
        }
    }

    fn handle_deployment_poll(&mut self, result: Value) -> Vec<WorkflowAction> {
        let attempt = match self.phase {
            Phase::PollingDeployment { attempt } => attempt,
            _ => 0,
        };
        let deployment: Option<Deployment> = serde_json::from_value(result).unwrap_or(None);
        match deployment.map(|d| d.status) {
            Some(DeploymentStatus::Ready) => {
                self.phase = Phase::CreatingService;
                vec![Self::schedule(
                    "create-service",
                    "create_service",
                    json!({"namespace": self.input.namespace, "spec": self.service_spec()}),
                    Self::retrying(RetryPolicy::bounded(3)),
                )]
            }
            _ if attempt + 1 >= MAX_POLL_ATTEMPTS => {
                self.compensate_and_fail("deployment did not become ready within 30 minutes")
            }
            _ => {
                self.phase = Phase::PollingDeployment { attempt: attempt + 1 };
                vec![WorkflowAction::timer("poll-deployment", POLL_INTERVAL)]
            }
        }
    }

    fn mark_ready_action(&self, pdb_failure_reason: Option<&str>) -> WorkflowAction {
        let status_reason = match pdb_failure_reason {
            Some(reason) => format!("Agent built and ready to receive tasks. (pod disruption budget: {reason})"),
            None => "Agent built and ready to receive tasks.".to_string(),
        };
        Self::schedule(
            "mark-ready",
            "update_agent_status",
            json!({
                "agent_id": self.input.agent_id,
                "status": "ready",
                "status_reason": status_reason,
                "docker_image": self.destination_image,
                "build_job_name": self.build_job_name,
                "build_job_namespace": self.input.namespace,
            }),
            Self::retrying(RetryPolicy::bounded(3)),
        )
    }
}

impl WorkflowInput for BuildWorkflow {
    const WORKFLOW_TYPE: &'static str = "build_agent_workflow";
    type Input = BuildWorkflowInput;

    fn from_input(input: Self::Input) -> Self {
        let resource_name = sanitize_resource_name(&input.agent_name);
        let destination_image = format!("{}/{}:latest", input.registry_url, resource_name);
        let build_job_name = format!("build-{resource_name}");
        Self { input, resource_name, destination_image, build_job_name, phase: Phase::Starting, completed: false }
    }
}

impl Workflow for BuildWorkflow {
    fn workflow_type(&self) -> &'static str {
        Self::WORKFLOW_TYPE
    }

    fn on_start(&mut self) -> Vec<WorkflowAction> {
        vec![Self::schedule(
            "mark-building",
            "update_agent_status",
            json!({"agent_id": self.input.agent_id, "status": "building"}),
            Self::retrying(RetryPolicy::bounded(3)),
        )]
    }

    fn on_activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction> {
        match activity_id {
            "mark-building" => vec![Self::schedule(
                "submit-build-job",
                "submit_build_job",
                json!({"namespace": self.input.namespace, "spec": self.build_job_spec()}),
                Self::retrying(RetryPolicy::unbounded()).with_start_to_close_timeout(Duration::from_secs(60)),
            )],
            "submit-build-job" => vec![Self::schedule(
                "record-build-metadata",
                "update_agent_status",
                json!({
                    "agent_id": self.input.agent_id,
                    "status": "building",
                    "docker_image": self.destination_image,
                    "build_job_name": self.build_job_name,
                    "build_job_namespace": self.input.namespace,
                }),
                Self::retrying(RetryPolicy::bounded(3)),
            )],
            "record-build-metadata" => {
                self.phase = Phase::PollingBuildJob { attempt: 0 };
                vec![WorkflowAction::timer("poll-build-job", POLL_INTERVAL)]
            }
            "poll-build-job" => self.handle_build_job_poll(result),
            "create-deployment" => {
                self.phase = Phase::PollingDeployment { attempt: 0 };
                vec![WorkflowAction::timer("poll-deployment", POLL_INTERVAL)]
            }
            "poll-deployment" => self.handle_deployment_poll(result),
            "create-service" => {
                self.phase = Phase::CreatingPdb;
                vec![Self::schedule(
                    "create-pdb",
                    "create_pod_disruption_budget",
                    json!({"namespace": self.input.namespace, "name": self.resource_name, "min_available": 1}),
                    Self::retrying(RetryPolicy::bounded(3)),
                )]
            }
            "create-pdb" => vec![self.mark_ready_action(None)],
            "mark-ready" => {
                self.completed = true;
                self.phase = Phase::Done;
                vec![WorkflowAction::complete(
                    json!({"agent_id": self.input.agent_id, "docker_image": self.destination_image}),
                )]
            }
            "delete-service" | "delete-deployment" | "delete-build-job-timeout" => Vec::new(),
            _ => Vec::new(),
        }
    }

    fn on_activity_failed(&mut self, activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction> {
        match activity_id {
            // Non-fatal relative to Deployment/Service readiness (§4.4 step 6).
            "create-pdb" => vec![self.mark_ready_action(Some(&error.message))],
            "create-deployment" | "poll-deployment" | "create-service" => {
                self.compensate_and_fail(format!("rollout failed: {}", error.message))
            }
            "delete-service" | "delete-deployment" | "delete-build-job-timeout" => Vec::new(),
            _ => self.fail(error.message.clone()),
        }
    }

    fn on_timer_fired(&mut self, timer_id: &str) -> Vec<WorkflowAction> {
        match timer_id {
            "poll-build-job" => vec![Self::schedule(
                "poll-build-job",
                "poll_build_job",
                json!({"namespace": self.input.namespace, "name": self.build_job_name}),
                Self::retrying(RetryPolicy::bounded(3)),
            )],
            "poll-deployment" => vec![Self::schedule(
                "poll-deployment",
                "get_deployment",
                json!({"namespace": self.input.namespace, "name": self.resource_name}),
                Self::retrying(RetryPolicy::bounded(3)),
            )],
            _ => Vec::new(),
        }
    }

    fn is_completed(&self) -> bool {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> BuildWorkflowInput {
        BuildWorkflowInput {
            agent_id: Uuid::now_v7(),
            agent_name: "Hello_World".to_string(),
            agent_tar_path: "/ctx/hello.tar.gz".to_string(),
            namespace: "agents".to_string(),
            registry_url: "registry.internal".to_string(),
            container_port: 8000,
        }
    }

    #[test]
    fn resource_name_and_image_are_derived_deterministically() {
        let workflow = BuildWorkflow::from_input(input());
        assert_eq!(workflow.resource_name, "hello-world");
        assert_eq!(workflow.destination_image, "registry.internal/hello-world:latest");
    }

    #[test]
    fn happy_path_reaches_mark_ready_then_completes() {
        let mut workflow = BuildWorkflow::from_input(input());
        let actions = workflow.on_start();
        assert_eq!(actions.len(), 1);

        let actions = workflow.on_activity_completed("mark-building", Value::Null);
        assert!(matches!(actions[0], WorkflowAction::ScheduleActivity { ref activity_type, .. } if activity_type == "submit_build_job"));

        let actions = workflow.on_activity_completed("submit-build-job", Value::Null);
        assert!(matches!(actions[0], WorkflowAction::ScheduleActivity { ref activity_type, .. } if activity_type == "update_agent_status"));

        let actions = workflow.on_activity_completed("record-build-metadata", Value::Null);
        assert!(matches!(actions[0], WorkflowAction::StartTimer { .. }));

        let actions = workflow.on_timer_fired("poll-build-job");
        assert!(matches!(actions[0], WorkflowAction::ScheduleActivity { ref activity_type, .. } if activity_type == "poll_build_job"));

        let job = Job { name: "build-hello-world".into(), namespace: "agents".into(), status: JobStatus::Succeeded, started_at: None, completed_at: None };
        let actions = workflow.on_activity_completed("poll-build-job", serde_json::to_value(job).unwrap());
        assert!(matches!(actions[0], WorkflowAction::ScheduleActivity { ref activity_type, .. } if activity_type == "create_deployment"));

        workflow.on_activity_completed("create-deployment", Value::Null);
        let deployment = Deployment { name: "hello-world".into(), namespace: "agents".into(), status: DeploymentStatus::Ready };
        let actions = workflow.on_activity_completed("poll-deployment", serde_json::to_value(deployment).unwrap());
        assert!(matches!(actions[0], WorkflowAction::ScheduleActivity { ref activity_type, .. } if activity_type == "create_service"));

        let actions = workflow.on_activity_completed("create-service", Value::Null);
        assert!(matches!(actions[0], WorkflowAction::ScheduleActivity { ref activity_type, .. } if activity_type == "create_pod_disruption_budget"));

        let actions = workflow.on_activity_completed("create-pdb", Value::Null);
        assert!(matches!(actions[0], WorkflowAction::ScheduleActivity { ref activity_type, .. } if activity_type == "update_agent_status"));
        assert!(!workflow.is_completed());

        let actions = workflow.on_activity_completed("mark-ready", Value::Null);
        assert!(matches!(actions[0], WorkflowAction::CompleteWorkflow { .. }));
        assert!(workflow.is_completed());
    }

    #[test]
    fn failed_build_job_fails_workflow_without_touching_deployment() {
        let mut workflow = BuildWorkflow::from_input(input());
        workflow.on_start();
        workflow.on_activity_completed("mark-building", Value::Null);
        workflow.on_activity_completed("submit-build-job", Value::Null);
        workflow.on_activity_completed("record-build-metadata", Value::Null);
        workflow.on_timer_fired("poll-build-job");

        let job = Job { name: "build-hello-world".into(), namespace: "agents".into(), status: JobStatus::Failed, started_at: None, completed_at: None };
        let actions = workflow.on_activity_completed("poll-build-job", serde_json::to_value(job).unwrap());
        assert_eq!(actions.len(), 2);
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "update_agent_status"));
        assert!(
            matches!(&actions[1], WorkflowAction::FailWorkflow { error } if error.message.contains("Build job") && error.message.contains("build-hello-world") && error.message.contains("failed"))
        );
        assert!(workflow.is_completed());
    }

    #[test]
    fn pending_build_job_reschedules_the_poll_timer() {
        let mut workflow = BuildWorkflow::from_input(input());
        workflow.on_start();
        workflow.on_activity_completed("mark-building", Value::Null);
        workflow.on_activity_completed("submit-build-job", Value::Null);
        workflow.on_activity_completed("record-build-metadata", Value::Null);
        workflow.on_timer_fired("poll-build-job");

        let job = Job { name: "build-hello-world".into(), namespace: "agents".into(), status: JobStatus::Running, started_at: None, completed_at: None };
        let actions = workflow.on_activity_completed("poll-build-job", serde_json::to_value(job).unwrap());
        assert!(matches!(actions[0], WorkflowAction::StartTimer { ref timer_id, .. } if timer_id == "poll-build-job"));
        assert!(!workflow.is_completed());
    }

    #[test]
    fn deployment_rollout_failure_triggers_compensation_and_fails_workflow() {
        let mut workflow = BuildWorkflow::from_input(input());
        workflow.on_start();
        workflow.on_activity_completed("mark-building", Value::Null);
        workflow.on_activity_completed("submit-build-job", Value::Null);
        workflow.on_activity_completed("record-build-metadata", Value::Null);
        workflow.on_timer_fired("poll-build-job");
        let job = Job { name: "build-hello-world".into(), namespace: "agents".into(), status: JobStatus::Succeeded, started_at: None, completed_at: None };
        workflow.on_activity_completed("poll-build-job", serde_json::to_value(job).unwrap());
        workflow.on_activity_completed("create-deployment", Value::Null);

        let error = ActivityError::new("platform unavailable");
        let actions = workflow.on_activity_failed("poll-deployment", &error);
        assert_eq!(actions.len(), 4);
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "delete_service"));
        assert!(matches!(&actions[1], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "delete_deployment"));
        assert!(matches!(&actions[2], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "update_agent_status"));
        assert!(matches!(&actions[3], WorkflowAction::FailWorkflow { .. }));
        assert!(workflow.is_completed());
    }

    #[test]
    fn pod_disruption_budget_failure_does_not_fail_the_workflow() {
        let mut workflow = BuildWorkflow::from_input(input());
        workflow.on_start();
        workflow.on_activity_completed("mark-building", Value::Null);
        workflow.on_activity_completed("submit-build-job", Value::Null);
        workflow.on_activity_completed("record-build-metadata", Value::Null);
        workflow.on_timer_fired("poll-build-job");
        let job = Job { name: "build-hello-world".into(), namespace: "agents".into(), status: JobStatus::Succeeded, started_at: None, completed_at: None };
        workflow.on_activity_completed("poll-build-job", serde_json::to_value(job).unwrap());
        workflow.on_activity_completed("create-deployment", Value::Null);
        let deployment = Deployment { name: "hello-world".into(), namespace: "agents".into(), status: DeploymentStatus::Ready };
        workflow.on_activity_completed("poll-deployment", serde_json::to_value(deployment).unwrap());
        workflow.on_activity_completed("create-service", Value::Null);

        let error = ActivityError::new("pdb quota exceeded");
        let actions = workflow.on_activity_failed("create-pdb", &error);
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "update_agent_status"));
        assert!(!workflow.is_completed());
    }
}
