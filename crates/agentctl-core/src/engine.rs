//! Workflow Engine Port (C1).
//!
//! Split into two traits because the two call sites need different things:
//! `WorkflowEngineClient` is what the REST layer and signal endpoints hold
//! (start/signal/cancel/terminate/describe); `Workflow` is the deterministic
//! state machine a worker replays from engine events. `execute_activity`
//! only makes sense from inside a running workflow body, so it is not part
//! of either trait here — the worker crate's runtime supplies it internally
//! when driving a `Workflow` impl.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

use crate::error::Result;
use crate::workflow::{DuplicateWorkflowPolicy, RetryPolicy, WorkflowAction, WorkflowDescription};

/// Arguments to `start_workflow`. `id` is always the domain primary key
/// (Agent id for the Build Workflow, Task id for the Task Workflow) so
/// start/get/signal/cancel are keyed by it directly.
#[derive(Debug, Clone)]
pub struct StartWorkflowOptions {
    pub workflow_name: String,
    pub id: String,
    pub task_queue: String,
    pub duplicate_policy: DuplicateWorkflowPolicy,
    pub retry_policy: RetryPolicy,
    pub task_timeout: std::time::Duration,
    pub execution_timeout: std::time::Duration,
}

#[async_trait]
pub trait WorkflowEngineClient: Send + Sync {
    /// Starts a workflow, applying `duplicate_policy` for an id collision.
    /// The returned id always equals `options.id`.
    async fn start_workflow(&self, options: StartWorkflowOptions, arg: serde_json::Value) -> Result<String>;

    /// At-least-once delivery to the running workflow. Fails with
    /// `CoreError::NotFound` if `workflow_id` is unknown.
    async fn send_signal(&self, workflow_id: &str, signal_name: &str, payload: serde_json::Value) -> Result<()>;

    /// Requests cooperative cancellation (the workflow may run teardown).
    async fn cancel_workflow(&self, workflow_id: &str) -> Result<()>;

    /// Forceful stop; no teardown runs.
    async fn terminate_workflow(&self, workflow_id: &str) -> Result<()>;

    /// `NotFound` is returned as a synthetic terminal status, not an error.
    async fn get_workflow_status(&self, workflow_id: &str) -> Result<WorkflowDescription>;
}

/// An activity failure as observed by a workflow body, after the engine has
/// exhausted the activity's own `RetryPolicy`.
#[derive(Debug, Clone)]
pub struct ActivityError {
    pub message: String,
    pub retryable: bool,
}

impl ActivityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: false }
    }
}

/// A deterministic, replayable state machine. Given the same sequence of
/// `on_*` calls, a `Workflow` impl must produce the same sequence of
/// `WorkflowAction`s — this is what lets the engine recover a workflow by
/// replaying its history rather than persisting arbitrary program state.
pub trait Workflow: Send + Sync + Debug {
    fn workflow_type(&self) -> &'static str;

    fn on_start(&mut self) -> Vec<WorkflowAction>;

    fn on_activity_completed(&mut self, activity_id: &str, result: serde_json::Value) -> Vec<WorkflowAction>;

    fn on_activity_failed(&mut self, activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction>;

    fn on_timer_fired(&mut self, timer_id: &str) -> Vec<WorkflowAction> {
        let _ = timer_id;
        Vec::new()
    }

    fn on_signal(&mut self, signal_name: &str, payload: serde_json::Value) -> Vec<WorkflowAction> {
        let _ = (signal_name, payload);
        Vec::new()
    }

    fn is_completed(&self) -> bool;
}

/// Typed construction for a `Workflow`, and the bridge from the worker's
/// JSON-valued activation payload to a concrete input type.
pub trait WorkflowInput: Workflow + Sized {
    const WORKFLOW_TYPE: &'static str;
    type Input: Serialize + DeserializeOwned + Send;

    fn from_input(input: Self::Input) -> Self;

    fn from_json(value: serde_json::Value) -> anyhow::Result<Self> {
        let input: Self::Input = serde_json::from_value(value)?;
        Ok(Self::from_input(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowDescription;

    #[derive(Debug, Default)]
    struct CountingWorkflow {
        started: bool,
        completed: bool,
    }

    impl Workflow for CountingWorkflow {
        fn workflow_type(&self) -> &'static str {
            "counting_workflow"
        }

        fn on_start(&mut self) -> Vec<WorkflowAction> {
            self.started = true;
            vec![WorkflowAction::schedule_activity(
                "step-1",
                "noop",
                serde_json::json!({}),
                Default::default(),
            )]
        }

        fn on_activity_completed(&mut self, _activity_id: &str, _result: serde_json::Value) -> Vec<WorkflowAction> {
            self.completed = true;
            vec![WorkflowAction::complete(serde_json::json!({"ok": true}))]
        }

        fn on_activity_failed(&mut self, _activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction> {
            vec![WorkflowAction::fail(crate::workflow::WorkflowError::new(error.message.clone()))]
        }

        fn is_completed(&self) -> bool {
            self.completed
        }
    }

    #[test]
    fn workflow_drives_start_then_complete() {
        let mut wf = CountingWorkflow::default();
        let actions = wf.on_start();
        assert!(wf.started);
        assert_eq!(actions.len(), 1);
        let actions = wf.on_activity_completed("step-1", serde_json::json!({}));
        assert!(wf.is_completed());
        assert!(matches!(actions[0], WorkflowAction::CompleteWorkflow { .. }));
    }

    #[test]
    fn workflow_description_not_found_reports_terminal() {
        let description = WorkflowDescription::not_found();
        assert!(description.is_terminal);
    }
}
