//! Domain types and port traits for the agent control plane: the Agent and
//! Task entities, the tagged conversation `Message` model, and the five
//! ports (Workflow Engine, Platform, LLM, Conversational State, plus the
//! shared error taxonomy) that the worker, storage, and API crates build on.

pub mod agent;
pub mod engine;
pub mod error;
pub mod llm;
pub mod message;
pub mod platform;
pub mod state_store;
pub mod task;
pub mod workflow;

pub use agent::{sanitize_resource_name, Agent, AgentStatus};
pub use engine::{ActivityError, StartWorkflowOptions, Workflow, WorkflowEngineClient, WorkflowInput};
pub use error::{CoreError, Result};
pub use llm::{
    call_config_for_decision, tools_from_action_schemas, FinishReason, LlmCallConfig, LlmChoice, LlmProvider,
    ToolDefinition,
};
pub use message::{AgentState, Message, ToolCall};
pub use platform::{
    deployment_status_from_available_replicas, job_status_from_counts, BuildJobSpec, Deployment, DeploymentSpec,
    DeploymentStatus, Job, JobStatus, PlatformPort, PodDisruptionBudget, Service, ServiceSpec,
};
pub use state_store::ConversationalStateStore;
pub use task::{HumanInstruction, Task, TaskStatus};
pub use workflow::{
    ActivityOptions, DuplicateWorkflowPolicy, RetryPolicy, WorkflowAction, WorkflowDescription, WorkflowError,
    WorkflowStatus,
};
