//! Workflow Engine Port (C1) client: a thin adapter from
//! `agentctl_core::WorkflowEngineClient` onto the Temporal gRPC surface.

use std::sync::Arc;

use agentctl_core::{
    CoreError, DuplicateWorkflowPolicy, Result as CoreResult, StartWorkflowOptions, WorkflowDescription,
    WorkflowEngineClient, WorkflowStatus,
};
use async_trait::async_trait;
use temporal_sdk_core::protos::temporal::api::common::v1::{Payload, Payloads, WorkflowExecution, WorkflowType};
use temporal_sdk_core::protos::temporal::api::enums::v1::WorkflowExecutionStatus;
use temporal_sdk_core::protos::temporal::api::taskqueue::v1::TaskQueue;
use temporal_sdk_core::protos::temporal::api::workflowservice::v1::{
    CancelWorkflowExecutionRequest, DescribeWorkflowExecutionRequest, DescribeWorkflowExecutionResponse,
    SignalWorkflowExecutionRequest, StartWorkflowExecutionRequest, TerminateWorkflowExecutionRequest,
};
use temporal_sdk_core::{ServerGateway, ServerGatewayApis, ServerGatewayOptions, Url};

/// Maps our duplicate-start policy onto Temporal's `WorkflowIdReusePolicy`
/// wire codes (proto enum, not re-exported as a Rust enum in this pin).
fn duplicate_policy_code(policy: DuplicateWorkflowPolicy) -> i32 {
    match policy {
        DuplicateWorkflowPolicy::AllowDuplicate => 1,
        DuplicateWorkflowPolicy::AllowDuplicateFailedOnly => 2,
        DuplicateWorkflowPolicy::RejectDuplicate => 3,
        DuplicateWorkflowPolicy::TerminateIfRunning => 4,
    }
}

fn json_payload(value: serde_json::Value) -> anyhow::Result<Payloads> {
    let data = serde_json::to_vec(&value)?;
    Ok(Payloads { payloads: vec![Payload { metadata: Default::default(), data }] })
}

fn execution(workflow_id: &str) -> WorkflowExecution {
    WorkflowExecution { workflow_id: workflow_id.to_string(), run_id: String::new() }
}

fn status_to_domain(status: i32) -> WorkflowStatus {
    match WorkflowExecutionStatus::from_i32(status) {
        Some(WorkflowExecutionStatus::Running) => WorkflowStatus::Running,
        Some(WorkflowExecutionStatus::Completed) => WorkflowStatus::Completed,
        Some(WorkflowExecutionStatus::Failed) => WorkflowStatus::Failed,
        Some(WorkflowExecutionStatus::Canceled) => WorkflowStatus::Canceled,
        Some(WorkflowExecutionStatus::Terminated) => WorkflowStatus::Terminated,
        Some(WorkflowExecutionStatus::TimedOut) => WorkflowStatus::TimedOut,
        Some(WorkflowExecutionStatus::ContinuedAsNew) => WorkflowStatus::ContinuedAsNew,
        _ => WorkflowStatus::NotFound,
    }
}

fn describe_response_to_domain(response: DescribeWorkflowExecutionResponse) -> WorkflowDescription {
    let info = response.workflow_execution_info;
    let status = info.as_ref().map(|i| i.status).unwrap_or_default();
    let domain_status = status_to_domain(status);
    let reason = info.and_then(|i| i.close_status_failure_reason());
    WorkflowDescription::new(domain_status, reason)
}

/// A server error carries "not found" only in its message text in this
/// gateway pin (it does not surface gRPC status codes to callers).
fn is_not_found(error: &anyhow::Error) -> bool {
    let text = error.to_string().to_lowercase();
    text.contains("not found") || text.contains("notfound")
}

pub struct TemporalClient {
    gateway: Arc<ServerGateway>,
    namespace: String,
    task_queue_kind: i32,
}

impl TemporalClient {
    pub async fn connect(address: &str, namespace: &str) -> anyhow::Result<Self> {
        let target_url = Url::parse(address)?;
        let options = ServerGatewayOptions {
            target_url,
            namespace: namespace.to_string(),
            identity: "agentctl-worker".to_string(),
            worker_binary_id: env!("CARGO_PKG_VERSION").to_string(),
            long_poll_timeout: std::time::Duration::from_secs(60),
            tls_cfg: None,
        };
        let gateway = options.connect().await?;
        Ok(Self { gateway: Arc::new(gateway), namespace: namespace.to_string(), task_queue_kind: 0 })
    }
}

#[async_trait]
impl WorkflowEngineClient for TemporalClient {
    async fn start_workflow(&self, options: StartWorkflowOptions, arg: serde_json::Value) -> CoreResult<String> {
        let input = json_payload(arg).map_err(CoreError::from)?;
        let request = StartWorkflowExecutionRequest {
            namespace: self.namespace.clone(),
            workflow_id: options.id.clone(),
            workflow_type: Some(WorkflowType { name: options.workflow_name }),
            task_queue: Some(TaskQueue { name: options.task_queue, kind: self.task_queue_kind }),
            input: Some(input),
            workflow_execution_timeout: Some(options.execution_timeout.into()),
            workflow_task_timeout: Some(options.task_timeout.into()),
            workflow_id_reuse_policy: duplicate_policy_code(options.duplicate_policy),
            ..Default::default()
        };
        self.gateway.start_workflow_execution(request).await.map_err(|e| CoreError::service(e.to_string()))?;
        Ok(options.id)
    }

    async fn send_signal(&self, workflow_id: &str, signal_name: &str, payload: serde_json::Value) -> CoreResult<()> {
        let input = json_payload(payload).map_err(CoreError::from)?;
        let request = SignalWorkflowExecutionRequest {
            namespace: self.namespace.clone(),
            workflow_execution: Some(execution(workflow_id)),
            signal_name: signal_name.to_string(),
            input: Some(input),
            ..Default::default()
        };
        self.gateway.signal_workflow_execution(request).await.map_err(|error| {
            if is_not_found(&error) {
                CoreError::not_found(format!("workflow {workflow_id}"))
            } else {
                CoreError::service(error.to_string())
            }
        })?;
        Ok(())
    }

    async fn cancel_workflow(&self, workflow_id: &str) -> CoreResult<()> {
        let request = CancelWorkflowExecutionRequest {
            namespace: self.namespace.clone(),
            workflow_execution: Some(execution(workflow_id)),
            ..Default::default()
        };
        self.gateway.cancel_workflow_execution(request).await.map_err(|error| {
            if is_not_found(&error) {
                CoreError::not_found(format!("workflow {workflow_id}"))
            } else {
                CoreError::service(error.to_string())
            }
        })?;
        Ok(())
    }

    async fn terminate_workflow(&self, workflow_id: &str) -> CoreResult<()> {
        let request = TerminateWorkflowExecutionRequest {
            namespace: self.namespace.clone(),
            workflow_execution: Some(execution(workflow_id)),
            ..Default::default()
        };
        self.gateway.terminate_workflow_execution(request).await.map_err(|error| {
            if is_not_found(&error) {
                CoreError::not_found(format!("workflow {workflow_id}"))
            } else {
                CoreError::service(error.to_string())
            }
        })?;
        Ok(())
    }

    async fn get_workflow_status(&self, workflow_id: &str) -> CoreResult<WorkflowDescription> {
        let request = DescribeWorkflowExecutionRequest {
            namespace: self.namespace.clone(),
            execution: Some(execution(workflow_id)),
        };
        match self.gateway.describe_workflow_execution(request).await {
            Ok(response) => Ok(describe_response_to_domain(response)),
            Err(error) if is_not_found(&error) => Ok(WorkflowDescription::not_found()),
            Err(error) => Err(CoreError::service(error.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_policy_codes_are_distinct() {
        let codes: Vec<i32> = [
            DuplicateWorkflowPolicy::AllowDuplicate,
            DuplicateWorkflowPolicy::AllowDuplicateFailedOnly,
            DuplicateWorkflowPolicy::RejectDuplicate,
            DuplicateWorkflowPolicy::TerminateIfRunning,
        ]
        .into_iter()
        .map(duplicate_policy_code)
        .collect();
        let mut sorted = codes.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn not_found_detection_is_case_insensitive() {
        let error = anyhow::anyhow!("rpc error: Workflow Not Found");
        assert!(is_not_found(&error));
        let error = anyhow::anyhow!("rpc error: internal");
        assert!(!is_not_found(&error));
    }
}
