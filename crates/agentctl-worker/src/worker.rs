//! Worker Host (C7): the poll loop that pulls workflow and activity tasks
//! off a Temporal task queue and drives them through the `WorkflowRegistry`
//! and the activity `dispatch` table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentctl_core::{RetryPolicy, Workflow, WorkflowAction};
use prost_types::Duration as ProstDuration;
use temporal_sdk_core::protos::coresdk::activity_task::activity_task::Variant as ActivityTaskVariant;
use temporal_sdk_core::protos::coresdk::activity_result::{ActivityExecutionResult, ActivityResolution};
use temporal_sdk_core::protos::coresdk::workflow_activation::wf_activation_job::Variant as WfActivationVariant;
use temporal_sdk_core::protos::coresdk::workflow_commands::{
    workflow_command, CompleteWorkflowExecution, FailWorkflowExecution, ScheduleActivity, StartTimer as StartTimerCommand,
    WorkflowCommand,
};
use temporal_sdk_core::protos::coresdk::workflow_completion::WfActivationCompletion;
use temporal_sdk_core::protos::coresdk::{ActivityTaskCompletion, ActivityHeartbeat};
use temporal_sdk_core::protos::temporal::api::common::v1::RetryPolicy as ProtoRetryPolicy;
use temporal_sdk_core::CoreRuntime;
use tracing::{error, info, warn};

use crate::activities::{self, Dependencies};
use crate::registry::WorkflowRegistry;

/// `prost_types::Duration` has no infallible `From<std::time::Duration>` we
/// can rely on across the whole proto surface, so every timeout/interval is
/// routed through this one conversion rather than a blanket `.into()`.
fn to_proto_duration(duration: Duration) -> ProstDuration {
    ProstDuration { seconds: duration.as_secs() as i64, nanos: duration.subsec_nanos() as i32 }
}

/// `agentctl_core::RetryPolicy` and the proto `RetryPolicy` are both foreign
/// to this crate, so a `From` impl between them would violate the orphan
/// rule; a plain function does the same job.
fn retry_policy_to_proto(policy: RetryPolicy) -> ProtoRetryPolicy {
    ProtoRetryPolicy {
        initial_interval: Some(to_proto_duration(policy.initial_interval)),
        backoff_coefficient: policy.backoff_coefficient,
        maximum_interval: policy.maximum_interval.map(to_proto_duration),
        maximum_attempts: policy.maximum_attempts as i32,
        non_retryable_error_types: Vec::new(),
    }
}

/// Translates a `WorkflowAction` into the proto command the core SDK expects
/// to see appended to a workflow task's completion.
fn action_to_command(action: WorkflowAction) -> WorkflowCommand {
    match action {
        WorkflowAction::ScheduleActivity { activity_id, activity_type, input, options } => WorkflowCommand {
            variant: Some(workflow_command::Variant::ScheduleActivity(ScheduleActivity {
                activity_id,
                activity_type,
                arguments: vec![serde_json::to_vec(&input).unwrap_or_default().into()],
                schedule_to_start_timeout: Some(to_proto_duration(options.schedule_to_start_timeout)),
                start_to_close_timeout: Some(to_proto_duration(options.start_to_close_timeout)),
                heartbeat_timeout: options.heartbeat_timeout.map(to_proto_duration),
                retry_policy: Some(retry_policy_to_proto(options.retry_policy)),
                ..Default::default()
            })),
        },
        WorkflowAction::StartTimer { timer_id, duration } => WorkflowCommand {
            variant: Some(workflow_command::Variant::StartTimer(StartTimerCommand {
                timer_id,
                start_to_fire_timeout: Some(to_proto_duration(duration)),
            })),
        },
        WorkflowAction::CompleteWorkflow { result } => WorkflowCommand {
            variant: Some(workflow_command::Variant::CompleteWorkflowExecution(CompleteWorkflowExecution {
                result: Some(serde_json::to_vec(&result).unwrap_or_default().into()),
            })),
        },
        WorkflowAction::FailWorkflow { error } => WorkflowCommand {
            variant: Some(workflow_command::Variant::FailWorkflowExecution(FailWorkflowExecution {
                failure: Some(error.message.into()),
            })),
        },
        WorkflowAction::None => WorkflowCommand { variant: None },
    }
}

/// Drives one workflow instance's replay: feeds it the jobs in an
/// activation and collects the resulting commands, dropping `None` actions
/// (nothing to append to the completion).
fn drive_workflow(workflow: &mut dyn Workflow, jobs: Vec<WfActivationVariant>) -> Vec<WorkflowCommand> {
    let mut commands = Vec::new();
    for job in jobs {
        let actions = match job {
            WfActivationVariant::StartWorkflow(_) => workflow.on_start(),
            WfActivationVariant::ResolveActivity(resolved) => {
                let result = resolved.result.and_then(|r| r.status);
                match result {
                    Some(temporal_sdk_core::protos::coresdk::activity_result::activity_resolution::Status::Completed(c)) => {
                        let value = c.result.and_then(|p| serde_json::from_slice(&p.data).ok()).unwrap_or(serde_json::Value::Null);
                        workflow.on_activity_completed(&resolved.activity_id, value)
                    }
                    Some(temporal_sdk_core::protos::coresdk::activity_result::activity_resolution::Status::Failed(f)) => {
                        let message = f.failure.map(|fail| fail.message).unwrap_or_default();
                        workflow.on_activity_failed(&resolved.activity_id, &agentctl_core::ActivityError::new(message))
                    }
                    _ => Vec::new(),
                }
            }
            WfActivationVariant::FireTimer(timer) => workflow.on_timer_fired(&timer.timer_id),
            WfActivationVariant::SignalWorkflow(signal) => {
                let payload = signal
                    .input
                    .first()
                    .and_then(|p| serde_json::from_slice::<serde_json::Value>(&p.data).ok())
                    .unwrap_or(serde_json::Value::Null);
                workflow.on_signal(&signal.signal_name, payload)
            }
            WfActivationVariant::CancelWorkflow(_) => workflow.on_signal("__cancel__", serde_json::Value::Null),
            _ => Vec::new(),
        };
        commands.extend(actions.into_iter().filter(|a| !matches!(a, WorkflowAction::None)).map(action_to_command));
    }
    commands
}

pub struct TemporalWorker {
    runtime: Arc<CoreRuntime>,
    task_queue: String,
    registry: WorkflowRegistry,
    dependencies: Dependencies,
    instances: Mutex<HashMap<String, Box<dyn Workflow>>>,
    max_concurrent_activities: usize,
}

impl TemporalWorker {
    pub fn new(
        runtime: Arc<CoreRuntime>,
        task_queue: impl Into<String>,
        registry: WorkflowRegistry,
        dependencies: Dependencies,
        max_concurrent_activities: usize,
    ) -> Self {
        Self {
            runtime,
            task_queue: task_queue.into(),
            registry,
            dependencies,
            instances: Mutex::new(HashMap::new()),
            max_concurrent_activities,
        }
    }

    async fn poll_workflow_once(&self) -> anyhow::Result<()> {
        let activation = self.runtime.poll_workflow_task(&self.task_queue).await?;
        let run_id = activation.run_id.clone();

        let start_job = activation.jobs.iter().find_map(|job| match &job.variant {
            Some(WfActivationVariant::StartWorkflow(start)) => Some(start.clone()),
            _ => None,
        });

        let commands = {
            let mut instances = self.instances.lock().unwrap();
            if let Some(start) = start_job {
                let input: serde_json::Value = start
                    .arguments
                    .first()
                    .and_then(|p| serde_json::from_slice(&p.data).ok())
                    .unwrap_or(serde_json::Value::Null);
                match self.registry.create(&start.workflow_type, input) {
                    Ok(workflow) => {
                        instances.insert(run_id.clone(), workflow);
                    }
                    Err(error) => {
                        error!(%error, workflow_type = %start.workflow_type, "unknown workflow type");
                        self.runtime
                            .complete_workflow_task(WfActivationCompletion::fail(run_id, error.to_string()))
                            .await?;
                        return Ok(());
                    }
                }
            }

            match instances.get_mut(&run_id) {
                Some(workflow) => {
                    let jobs = activation.jobs.into_iter().filter_map(|j| j.variant).collect();
                    let commands = drive_workflow(workflow.as_mut(), jobs);
                    if workflow.is_completed() {
                        instances.remove(&run_id);
                    }
                    commands
                }
                None => {
                    warn!(run_id, "activation for unknown workflow instance");
                    Vec::new()
                }
            }
        };

        self.runtime.complete_workflow_task(WfActivationCompletion::successful(run_id, commands)).await?;
        Ok(())
    }

    async fn poll_activity_once(&self) -> anyhow::Result<()> {
        let task = self.runtime.poll_activity_task(&self.task_queue).await?;
        let (activity_id, activity_type, input) = match task.variant {
            Some(ActivityTaskVariant::Start(start)) => {
                let input = start
                    .input
                    .first()
                    .and_then(|p| serde_json::from_slice(&p.data).ok())
                    .unwrap_or(serde_json::Value::Null);
                (task.activity_id, start.activity_type, input)
            }
            _ => return Ok(()),
        };

        let result = activities::dispatch(&self.dependencies, &activity_type, input).await;
        let resolution = match result {
            Ok(value) => ActivityResolution::completed(serde_json::to_vec(&value).unwrap_or_default()),
            Err(error) => ActivityResolution::failed(error.message, error.retryable),
        };
        self.runtime
            .complete_activity_task(ActivityTaskCompletion { activity_id, result: Some(ActivityExecutionResult::from(resolution)) })
            .await?;
        Ok(())
    }

    /// Runs the poll loop until `shutdown` resolves. Workflow and activity
    /// polling run on separate concurrent tasks, mirroring how the core SDK
    /// exposes independent workflow/activity queues; activity concurrency is
    /// bounded by `max_concurrent_activities` via a semaphore-backed pool.
    pub async fn run(self: Arc<Self>, shutdown: impl std::future::Future<Output = ()>) -> anyhow::Result<()> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.max_concurrent_activities));
        let workflow_worker = self.clone();
        let workflow_loop = tokio::spawn(async move {
            loop {
                if let Err(error) = workflow_worker.poll_workflow_once().await {
                    error!(%error, "workflow poll failed");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        });

        let activity_worker = self.clone();
        let activity_loop = tokio::spawn(async move {
            loop {
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                let worker = activity_worker.clone();
                tokio::spawn(async move {
                    if let Err(error) = worker.poll_activity_once().await {
                        error!(%error, "activity poll failed");
                    }
                    drop(permit);
                });
            }
        });

        info!(task_queue = %self.task_queue, "worker started");
        shutdown.await;
        workflow_loop.abort();
        activity_loop.abort();
        Ok(())
    }
}

pub fn build_registry() -> WorkflowRegistry {
    let mut registry = WorkflowRegistry::new();
    registry.register::<crate::workflows::BuildWorkflow>();
    registry.register::<crate::workflows::TaskWorkflow>();
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentctl_core::WorkflowAction as Action;
    use std::time::Duration as StdDuration;

    #[test]
    fn schedule_activity_action_becomes_schedule_activity_command() {
        let action = Action::schedule_activity(
            "step-1",
            "noop",
            serde_json::json!({}),
            agentctl_core::ActivityOptions::default(),
        );
        let command = action_to_command(action);
        assert!(matches!(command.variant, Some(workflow_command::Variant::ScheduleActivity(_))));
    }

    #[test]
    fn timer_action_becomes_start_timer_command() {
        let action = Action::timer("poll", StdDuration::from_secs(5));
        let command = action_to_command(action);
        assert!(matches!(command.variant, Some(workflow_command::Variant::StartTimer(_))));
    }

    #[test]
    fn none_action_has_no_variant() {
        let command = action_to_command(Action::None);
        assert!(command.variant.is_none());
    }

    #[test]
    fn registry_contains_both_workflow_types() {
        let registry = build_registry();
        assert!(registry.contains("build_agent_workflow"));
        assert!(registry.contains("agent_task_workflow"));
    }
}
