//! Activity Layer (C3): idempotent wrappers binding a workflow-callable
//! name to Platform/Conversational-State/LLM/persistence operations.
//!
//! Each activity takes one typed, JSON-serializable argument and returns
//! one typed, JSON-serializable result, so replay sees the same shape on
//! every attempt. `dispatch` is the explicit name→function registry that
//! replaces decorator-based activity registration: a string activity type
//! maps to exactly one of the functions below.

use std::sync::Arc;

use agentctl_core::{
    ActivityError, AgentStatus, BuildJobSpec, ConversationalStateStore, CoreError, Deployment, DeploymentSpec, Job,
    LlmCallConfig, LlmProvider, Message, PlatformPort, PodDisruptionBudget, Service, ServiceSpec, ToolDefinition,
};
use agentctl_storage::{Database, UpdateAgentStatus, UpdateTaskStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Everything an activity needs, built once at boot and shared across every
/// workflow instance this worker process drives.
#[derive(Clone)]
pub struct Dependencies {
    pub database: Arc<Database>,
    pub platform: Arc<dyn PlatformPort>,
    pub state_store: Arc<dyn ConversationalStateStore>,
    pub llm: Arc<dyn LlmProvider>,
}

fn core_to_activity_error(error: CoreError) -> ActivityError {
    let retryable = error.is_retryable();
    ActivityError { message: error.to_string(), retryable }
}

fn decode<T: serde::de::DeserializeOwned>(input: Value) -> Result<T, ActivityError> {
    serde_json::from_value(input).map_err(|e| ActivityError::new(format!("decoding activity input: {e}")))
}

fn encode<T: Serialize>(output: &T) -> Result<Value, ActivityError> {
    serde_json::to_value(output).map_err(|e| ActivityError::new(format!("encoding activity output: {e}")))
}

// ---------------------------------------------------------------------
// Build Workflow activities
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAgentStatusInput {
    pub agent_id: Uuid,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_job_namespace: Option<String>,
}

pub async fn update_agent_status(deps: &Dependencies, input: UpdateAgentStatusInput) -> Result<(), ActivityError> {
    deps.database
        .update_agent_status(
            input.agent_id,
            UpdateAgentStatus {
                status: Some(input.status.to_string()),
                status_reason: input.status_reason,
                docker_image: input.docker_image,
                build_job_name: input.build_job_name,
                build_job_namespace: input.build_job_namespace,
            },
        )
        .await
        .map_err(|e| ActivityError { message: e.to_string(), retryable: true })?;
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBuildJobInput {
    pub namespace: String,
    pub spec: BuildJobSpec,
}

pub async fn submit_build_job(deps: &Dependencies, input: SubmitBuildJobInput) -> Result<Job, ActivityError> {
    deps.platform.create_job(&input.namespace, &input.spec, false).await.map_err(core_to_activity_error)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespacedNameInput {
    pub namespace: String,
    pub name: String,
}

pub async fn poll_build_job(deps: &Dependencies, input: NamespacedNameInput) -> Result<Option<Job>, ActivityError> {
    deps.platform.get_job(&input.namespace, &input.name).await.map_err(core_to_activity_error)
}

pub async fn delete_build_job(deps: &Dependencies, input: NamespacedNameInput) -> Result<(), ActivityError> {
    deps.platform.delete_job(&input.namespace, &input.name).await.map_err(core_to_activity_error)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeploymentInput {
    pub namespace: String,
    pub spec: DeploymentSpec,
}

pub async fn create_deployment(deps: &Dependencies, input: CreateDeploymentInput) -> Result<Deployment, ActivityError> {
    deps.platform.create_deployment(&input.namespace, &input.spec, false).await.map_err(core_to_activity_error)
}

pub async fn get_deployment(deps: &Dependencies, input: NamespacedNameInput) -> Result<Option<Deployment>, ActivityError> {
    deps.platform.get_deployment(&input.namespace, &input.name).await.map_err(core_to_activity_error)
}

pub async fn delete_deployment(deps: &Dependencies, input: NamespacedNameInput) -> Result<(), ActivityError> {
    deps.platform.delete_deployment(&input.namespace, &input.name).await.map_err(core_to_activity_error)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceInput {
    pub namespace: String,
    pub spec: ServiceSpec,
}

pub async fn create_service(deps: &Dependencies, input: CreateServiceInput) -> Result<Service, ActivityError> {
    deps.platform.create_service(&input.namespace, &input.spec, false).await.map_err(core_to_activity_error)
}

pub async fn delete_service(deps: &Dependencies, input: NamespacedNameInput) -> Result<(), ActivityError> {
    deps.platform.delete_service(&input.namespace, &input.name).await.map_err(core_to_activity_error)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePodDisruptionBudgetInput {
    pub namespace: String,
    pub name: String,
    pub min_available: u32,
}

pub async fn create_pod_disruption_budget(
    deps: &Dependencies,
    input: CreatePodDisruptionBudgetInput,
) -> Result<PodDisruptionBudget, ActivityError> {
    deps.platform
        .create_pod_disruption_budget(&input.namespace, &input.name, input.min_available, false)
        .await
        .map_err(core_to_activity_error)
}

// ---------------------------------------------------------------------
// Task Workflow activities
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchAgentSpecInput {
    pub namespace: String,
    pub service_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_port: Option<u16>,
}

/// One entry of an agent's action catalog, as served by `GET /` on its
/// Service (§6 Agent HTTP contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAction {
    pub schema: ToolDefinition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_payload: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub model: String,
    pub instructions: String,
    #[serde(default)]
    pub actions: Vec<AgentAction>,
}

/// Discover the agent's model, system instructions, and tool catalog by
/// calling its own hosted Service, rather than persisting a copy in our
/// Agent row — the agent's container is the source of truth for its spec.
pub async fn fetch_agent_spec(deps: &Dependencies, input: FetchAgentSpecInput) -> Result<AgentSpec, ActivityError> {
    let response = deps
        .platform
        .call_service(&input.namespace, &input.service_name, input.service_port, "/", "GET", None)
        .await
        .map_err(core_to_activity_error)?;
    serde_json::from_value(response).map_err(|e| ActivityError::new(format!("invalid agent spec: {e}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitTaskStateInput {
    pub task_id: Uuid,
    pub system_prompt: String,
    pub user_prompt: String,
}

pub async fn init_task_state(deps: &Dependencies, input: InitTaskStateInput) -> Result<(), ActivityError> {
    deps.state_store
        .batch_append_messages(
            input.task_id,
            vec![Message::system(input.system_prompt), Message::user(input.user_prompt)],
        )
        .await
        .map_err(|e| ActivityError { message: e.to_string(), retryable: true })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecideActionInput {
    pub task_id: Uuid,
    pub model: String,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecideActionOutput {
    pub message: Message,
    pub finish_reason: agentctl_core::FinishReason,
}

pub async fn decide_action(deps: &Dependencies, input: DecideActionInput) -> Result<DecideActionOutput, ActivityError> {
    let state = deps
        .state_store
        .get_state(input.task_id)
        .await
        .map_err(|e| ActivityError { message: e.to_string(), retryable: true })?;
    let config = agentctl_core::call_config_for_decision(&input.model, &state, input.tools);
    let choice = deps.llm.chat_completion(config).await.map_err(core_to_activity_error)?;
    deps.state_store
        .append_message(input.task_id, choice.message.clone())
        .await
        .map_err(|e| ActivityError { message: e.to_string(), retryable: true })?;
    Ok(DecideActionOutput { message: choice.message, finish_reason: choice.finish_reason })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeActionInput {
    pub task_id: Uuid,
    pub namespace: String,
    pub service_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_port: Option<u16>,
    pub tool_call_id: String,
    pub tool_name: String,
    /// Raw JSON-encoded arguments exactly as the LLM emitted them.
    pub arguments: String,
}

pub async fn take_action(deps: &Dependencies, input: TakeActionInput) -> Result<(), ActivityError> {
    let payload: Value = serde_json::from_str(&input.arguments)
        .map_err(|e| ActivityError::new(format!("tool call {} carried invalid arguments: {e}", input.tool_call_id)))?;
    let response = deps
        .platform
        .call_service(
            &input.namespace,
            &input.service_name,
            input.service_port,
            &format!("/{}", input.tool_name),
            "POST",
            Some(payload),
        )
        .await
        .map_err(core_to_activity_error)?;
    let content = serde_json::to_string(&response).map_err(|e| ActivityError::new(e.to_string()))?;
    deps.state_store
        .append_message(input.task_id, Message::tool(input.tool_call_id, input.tool_name, content))
        .await
        .map_err(|e| ActivityError { message: e.to_string(), retryable: true })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendUserMessageInput {
    pub task_id: Uuid,
    pub content: String,
}

pub async fn append_user_message(deps: &Dependencies, input: AppendUserMessageInput) -> Result<(), ActivityError> {
    deps.state_store
        .append_message(input.task_id, Message::user(input.content))
        .await
        .map_err(|e| ActivityError { message: e.to_string(), retryable: true })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTaskStatusInput {
    pub task_id: Uuid,
    pub status: agentctl_core::TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

pub async fn update_task_status(deps: &Dependencies, input: UpdateTaskStatusInput) -> Result<(), ActivityError> {
    deps.database
        .update_task_status(
            input.task_id,
            UpdateTaskStatus { status: Some(input.status.to_string()), status_reason: input.status_reason },
        )
        .await
        .map_err(|e| ActivityError { message: e.to_string(), retryable: true })?;
    Ok(())
}

/// The explicit name→function registry: given an activity type name and its
/// JSON argument, run the matching activity and re-encode its result.
pub async fn dispatch(deps: &Dependencies, activity_type: &str, input: Value) -> Result<Value, ActivityError> {
    match activity_type {
        "update_agent_status" => update_agent_status(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "submit_build_job" => submit_build_job(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "poll_build_job" => poll_build_job(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "delete_build_job" => delete_build_job(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "create_deployment" => create_deployment(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "get_deployment" => get_deployment(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "delete_deployment" => delete_deployment(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "create_service" => create_service(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "delete_service" => delete_service(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "create_pod_disruption_budget" => {
            create_pod_disruption_budget(deps, decode(input)?).await.and_then(|r| encode(&r))
        }
        "fetch_agent_spec" => fetch_agent_spec(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "init_task_state" => init_task_state(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "decide_action" => decide_action(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "take_action" => take_action(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "append_user_message" => append_user_message(deps, decode(input)?).await.and_then(|r| encode(&r)),
        "update_task_status" => update_task_status(deps, decode(input)?).await.and_then(|r| encode(&r)),
        other => Err(ActivityError::new(format!("unknown activity type: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentctl_core::{AgentState, FinishReason, LlmChoice, Result as CoreResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStateStore {
        states: Mutex<HashMap<Uuid, AgentState>>,
    }

    #[async_trait]
    impl ConversationalStateStore for FakeStateStore {
        async fn get_state(&self, task_id: Uuid) -> CoreResult<AgentState> {
            Ok(self.states.lock().unwrap().get(&task_id).cloned().unwrap_or_default())
        }

        async fn set_state(&self, task_id: Uuid, state: AgentState) -> CoreResult<()> {
            self.states.lock().unwrap().insert(task_id, state);
            Ok(())
        }

        async fn delete_state(&self, task_id: Uuid) -> CoreResult<()> {
            self.states.lock().unwrap().remove(&task_id);
            Ok(())
        }
    }

    struct FakeLlm {
        response: LlmChoice,
    }

    #[async_trait]
    impl LlmProvider for FakeLlm {
        async fn chat_completion(&self, _config: LlmCallConfig) -> CoreResult<LlmChoice> {
            Ok(self.response.clone())
        }
    }

    struct UnusedPlatform;

    #[async_trait]
    impl PlatformPort for UnusedPlatform {
        async fn create_job(&self, _: &str, _: &BuildJobSpec, _: bool) -> CoreResult<Job> {
            unimplemented!()
        }
        async fn get_job(&self, _: &str, _: &str) -> CoreResult<Option<Job>> {
            unimplemented!()
        }
        async fn delete_job(&self, _: &str, _: &str) -> CoreResult<()> {
            unimplemented!()
        }
        async fn create_deployment(&self, _: &str, _: &DeploymentSpec, _: bool) -> CoreResult<Deployment> {
            unimplemented!()
        }
        async fn get_deployment(&self, _: &str, _: &str) -> CoreResult<Option<Deployment>> {
            unimplemented!()
        }
        async fn delete_deployment(&self, _: &str, _: &str) -> CoreResult<()> {
            unimplemented!()
        }
        async fn create_service(&self, _: &str, _: &ServiceSpec, _: bool) -> CoreResult<Service> {
            unimplemented!()
        }
        async fn get_service(&self, _: &str, _: &str) -> CoreResult<Option<Service>> {
            unimplemented!()
        }
        async fn delete_service(&self, _: &str, _: &str) -> CoreResult<()> {
            unimplemented!()
        }
        async fn create_pod_disruption_budget(&self, _: &str, _: &str, _: u32, _: bool) -> CoreResult<PodDisruptionBudget> {
            unimplemented!()
        }
        async fn delete_pod_disruption_budget(&self, _: &str, _: &str) -> CoreResult<()> {
            unimplemented!()
        }
        async fn call_service(
            &self,
            _: &str,
            _: &str,
            _: Option<u16>,
            _: &str,
            _: &str,
            _: Option<Value>,
        ) -> CoreResult<Value> {
            unimplemented!()
        }
    }

    struct FakeAgentService {
        spec: Value,
    }

    #[async_trait]
    impl PlatformPort for FakeAgentService {
        async fn create_job(&self, _: &str, _: &BuildJobSpec, _: bool) -> CoreResult<Job> {
            unimplemented!()
        }
        async fn get_job(&self, _: &str, _: &str) -> CoreResult<Option<Job>> {
            unimplemented!()
        }
        async fn delete_job(&self, _: &str, _: &str) -> CoreResult<()> {
            unimplemented!()
        }
        async fn create_deployment(&self, _: &str, _: &DeploymentSpec, _: bool) -> CoreResult<Deployment> {
            unimplemented!()
        }
        async fn get_deployment(&self, _: &str, _: &str) -> CoreResult<Option<Deployment>> {
            unimplemented!()
        }
        async fn delete_deployment(&self, _: &str, _: &str) -> CoreResult<()> {
            unimplemented!()
        }
        async fn create_service(&self, _: &str, _: &ServiceSpec, _: bool) -> CoreResult<Service> {
            unimplemented!()
        }
        async fn get_service(&self, _: &str, _: &str) -> CoreResult<Option<Service>> {
            unimplemented!()
        }
        async fn delete_service(&self, _: &str, _: &str) -> CoreResult<()> {
            unimplemented!()
        }
        async fn create_pod_disruption_budget(&self, _: &str, _: &str, _: u32, _: bool) -> CoreResult<PodDisruptionBudget> {
            unimplemented!()
        }
        async fn delete_pod_disruption_budget(&self, _: &str, _: &str) -> CoreResult<()> {
            unimplemented!()
        }
        async fn call_service(
            &self,
            _: &str,
            _: &str,
            _: Option<u16>,
            path: &str,
            _: &str,
            _: Option<Value>,
        ) -> CoreResult<Value> {
            assert_eq!(path, "/");
            Ok(self.spec.clone())
        }
    }

    fn deps_with_llm(response: LlmChoice) -> Dependencies {
        Dependencies {
            database: Arc::new(Database::new(sqlx::Pool::connect_lazy("postgres://localhost/ignored").unwrap())),
            platform: Arc::new(UnusedPlatform),
            state_store: Arc::new(FakeStateStore::default()),
            llm: Arc::new(FakeLlm { response }),
        }
    }

    #[tokio::test]
    async fn init_task_state_appends_system_then_user() {
        let deps = deps_with_llm(LlmChoice { message: Message::assistant_text("unused"), finish_reason: FinishReason::Stop });
        let task_id = Uuid::now_v7();
        init_task_state(
            &deps,
            InitTaskStateInput {
                task_id,
                system_prompt: "be helpful".to_string(),
                user_prompt: "weather in Tokyo".to_string(),
            },
        )
        .await
        .unwrap();
        let messages = deps.state_store.get_all_messages(task_id).await.unwrap();
        assert_eq!(messages, vec![Message::system("be helpful"), Message::user("weather in Tokyo")]);
    }

    #[tokio::test]
    async fn decide_action_appends_the_assistant_message_it_returns() {
        let assistant = Message::assistant_text("It's 17C in Tokyo.");
        let deps = deps_with_llm(LlmChoice { message: assistant.clone(), finish_reason: FinishReason::Stop });
        let task_id = Uuid::now_v7();
        let output = decide_action(&deps, DecideActionInput { task_id, model: "gpt-x".to_string(), tools: vec![] })
            .await
            .unwrap();
        assert_eq!(output.message, assistant);
        assert_eq!(output.finish_reason, FinishReason::Stop);
        assert_eq!(deps.state_store.get_all_messages(task_id).await.unwrap(), vec![assistant]);
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_activity_type() {
        let deps = deps_with_llm(LlmChoice { message: Message::assistant_text("x"), finish_reason: FinishReason::Stop });
        let error = dispatch(&deps, "not_a_real_activity", serde_json::json!({})).await.unwrap_err();
        assert!(!error.retryable);
    }

    #[tokio::test]
    async fn fetch_agent_spec_parses_the_agent_service_response() {
        let deps = Dependencies {
            database: Arc::new(Database::new(sqlx::Pool::connect_lazy("postgres://localhost/ignored").unwrap())),
            platform: Arc::new(FakeAgentService {
                spec: serde_json::json!({
                    "model": "gpt-x",
                    "instructions": "be helpful",
                    "actions": [{"schema": {"name": "get_weather", "description": "fetch weather", "parameters": {"type": "object"}}}],
                }),
            }),
            state_store: Arc::new(FakeStateStore::default()),
            llm: Arc::new(FakeLlm { response: LlmChoice { message: Message::assistant_text("unused"), finish_reason: FinishReason::Stop } }),
        };
        let spec = fetch_agent_spec(
            &deps,
            FetchAgentSpecInput { namespace: "agents".to_string(), service_name: "hello-world".to_string(), service_port: None },
        )
        .await
        .unwrap();
        assert_eq!(spec.model, "gpt-x");
        assert_eq!(spec.actions.len(), 1);
        assert_eq!(spec.actions[0].schema.name, "get_weather");
    }
}
