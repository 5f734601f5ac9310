//! Workflow execution types: the vocabulary the Workflow Engine Port speaks
//! and the actions a workflow body can request of it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// How `start_workflow` should behave when a workflow with the same id
/// already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum DuplicateWorkflowPolicy {
    AllowDuplicate,
    AllowDuplicateFailedOnly,
    RejectDuplicate,
    TerminateIfRunning,
}

/// Retry policy for a single activity invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RetryPolicy {
    #[serde(with = "duration_ms")]
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    #[serde(with = "option_duration_ms")]
    pub maximum_interval: Option<Duration>,
    /// 0 means unbounded.
    pub maximum_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Some(Duration::from_secs(60)),
            maximum_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Unbounded retries, used for idempotent "submit" activities that
    /// collapse onto an existing resource rather than failing outright.
    pub fn unbounded() -> Self {
        Self { maximum_attempts: 0, ..Self::default() }
    }

    /// Bounded to `attempts`, used for polling/get activities.
    pub fn bounded(attempts: u32) -> Self {
        Self { maximum_attempts: attempts, ..Self::default() }
    }
}

/// Options governing a single `ScheduleActivity` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ActivityOptions {
    pub retry_policy: RetryPolicy,
    #[serde(with = "duration_ms")]
    pub schedule_to_start_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub start_to_close_timeout: Duration,
    #[serde(with = "option_duration_ms")]
    pub heartbeat_timeout: Option<Duration>,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            schedule_to_start_timeout: Duration::from_secs(60),
            start_to_close_timeout: Duration::from_secs(10),
            heartbeat_timeout: None,
        }
    }
}

impl ActivityOptions {
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = timeout;
        self
    }
}

/// An error a workflow body can fail with. Distinct from `CoreError`: this
/// one crosses the engine boundary and is what `get_workflow_status`
/// eventually reports back as `reason`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct WorkflowError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub retryable: bool,
}

impl WorkflowError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), code: None, retryable: false }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for WorkflowError {}

/// Actions a workflow body can request of the engine in response to an
/// event. Each is persisted to history before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowAction {
    ScheduleActivity {
        activity_id: String,
        activity_type: String,
        input: serde_json::Value,
        options: ActivityOptions,
    },
    StartTimer {
        timer_id: String,
        #[serde(with = "duration_ms")]
        duration: Duration,
    },
    CompleteWorkflow {
        result: serde_json::Value,
    },
    FailWorkflow {
        error: WorkflowError,
    },
    /// No action: the event was handled but did not trigger new work.
    None,
}

impl WorkflowAction {
    pub fn schedule_activity(
        activity_id: impl Into<String>,
        activity_type: impl Into<String>,
        input: serde_json::Value,
        options: ActivityOptions,
    ) -> Self {
        Self::ScheduleActivity {
            activity_id: activity_id.into(),
            activity_type: activity_type.into(),
            input,
            options,
        }
    }

    pub fn timer(timer_id: impl Into<String>, duration: Duration) -> Self {
        Self::StartTimer { timer_id: timer_id.into(), duration }
    }

    pub fn complete(result: serde_json::Value) -> Self {
        Self::CompleteWorkflow { result }
    }

    pub fn fail(error: WorkflowError) -> Self {
        Self::FailWorkflow { error }
    }
}

/// Domain-level status of a workflow execution, as reported by
/// `get_workflow_status`. `NotFound` is synthetic: a query for an unknown
/// workflow id returns this terminal status rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Canceled,
    Terminated,
    TimedOut,
    ContinuedAsNew,
    NotFound,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// The full description returned by `get_workflow_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct WorkflowDescription {
    pub status: WorkflowStatus,
    pub is_terminal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl WorkflowDescription {
    pub fn new(status: WorkflowStatus, reason: Option<String>) -> Self {
        Self { is_terminal: status.is_terminal(), status, reason }
    }

    pub fn not_found() -> Self {
        Self::new(WorkflowStatus::NotFound, None)
    }
}

mod duration_ms {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_duration_ms {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => d.as_millis().serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
