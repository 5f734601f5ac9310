//! Task Workflow (C5, §4.5): a ReAct-style tool-use loop over an LLM,
//! fanning parallel tool calls out to the agent's hosted HTTP actions, with
//! an optional human-in-the-loop approval gate.

use std::time::Duration;

use agentctl_core::{
    ActivityError, ActivityOptions, FinishReason, HumanInstruction, RetryPolicy, ToolCall, ToolDefinition, Workflow,
    WorkflowAction, WorkflowError, WorkflowInput,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWorkflowInput {
    pub task_id: Uuid,
    pub agent_id: Uuid,
    pub prompt: String,
    pub namespace: String,
    pub service_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_port: Option<u16>,
    pub require_approval: bool,
}

#[derive(Debug)]
pub struct TaskWorkflow {
    input: TaskWorkflowInput,
    /// Populated from `fetch-agent-spec`'s result; empty until then.
    model: String,
    instructions: String,
    tools: Vec<ToolDefinition>,
    iteration: u32,
    instruction_count: u32,
    pending_tool_calls: usize,
    waiting_for_instruction: bool,
    task_approved: bool,
    in_human_gate: bool,
    completed: bool,
}

impl TaskWorkflow {
    fn decide_action_id(&self) -> String {
        format!("decide-action-{}", self.iteration)
    }

    fn schedule_decide_action(&self) -> WorkflowAction {
        WorkflowAction::schedule_activity(
            self.decide_action_id(),
            "decide_action",
            json!({"task_id": self.input.task_id, "model": self.model, "tools": self.tools}),
            ActivityOptions::default()
                .with_retry(RetryPolicy::bounded(3))
                .with_start_to_close_timeout(Duration::from_secs(60)),
        )
    }

    fn schedule_tool_calls(&mut self, tool_calls: &[ToolCall]) -> Vec<WorkflowAction> {
        self.pending_tool_calls = tool_calls.len();
        tool_calls
            .iter()
            .enumerate()
            .map(|(idx, call)| {
                WorkflowAction::schedule_activity(
                    format!("take-action-{}-{idx}", self.iteration),
                    "take_action",
                    json!({
                        "task_id": self.input.task_id,
                        "namespace": self.input.namespace,
                        "service_name": self.input.service_name,
                        "service_port": self.input.service_port,
                        "tool_call_id": call.id,
                        "tool_name": call.name,
                        "arguments": call.arguments,
                    }),
                    ActivityOptions::default().with_retry(RetryPolicy::bounded(5)),
                )
            })
            .collect()
    }

    fn mark_status(&self, activity_id: &str, status: &str) -> WorkflowAction {
        WorkflowAction::schedule_activity(
            activity_id,
            "update_agent_status",
            json!({"agent_id": self.input.agent_id, "status": status}),
            ActivityOptions::default().with_retry(RetryPolicy::bounded(3)),
        )
    }

    fn finish_task(&self, status: &str) -> WorkflowAction {
        WorkflowAction::schedule_activity(
            "mark-task-status",
            "update_task_status",
            json!({"task_id": self.input.task_id, "status": status}),
            ActivityOptions::default().with_retry(RetryPolicy::bounded(3)),
        )
    }

    fn fail(&mut self, message: impl Into<String>) -> Vec<WorkflowAction> {
        self.completed = true;
        vec![WorkflowAction::fail(WorkflowError::new(message))]
    }

    /// Branch taken once `decide_action` returns a terminal finish reason:
    /// enter the human gate if approval is required, else wind down.
    fn enter_post_loop(&mut self) -> Vec<WorkflowAction> {
        if self.input.require_approval && !self.task_approved {
            self.waiting_for_instruction = true;
            self.in_human_gate = true;
            Vec::new()
        } else {
            vec![self.mark_status("mark-idle", "idle")]
        }
    }
}

impl WorkflowInput for TaskWorkflow {
    const WORKFLOW_TYPE: &'static str = "agent_task_workflow";
    type Input = TaskWorkflowInput;

    fn from_input(input: Self::Input) -> Self {
        Self {
            input,
            model: String::new(),
            instructions: String::new(),
            tools: Vec::new(),
            iteration: 0,
            instruction_count: 0,
            pending_tool_calls: 0,
            waiting_for_instruction: false,
            task_approved: false,
            in_human_gate: false,
            completed: false,
        }
    }
}

impl Workflow for TaskWorkflow {
    fn workflow_type(&self) -> &'static str {
        Self::WORKFLOW_TYPE
    }

    fn on_start(&mut self) -> Vec<WorkflowAction> {
        vec![WorkflowAction::schedule_activity(
            "check-deployment",
            "get_deployment",
            json!({"namespace": self.input.namespace, "name": self.input.service_name}),
            ActivityOptions::default().with_retry(RetryPolicy::bounded(3)),
        )]
    }

    fn on_activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction> {
        if activity_id == "check-deployment" {
            let deployment: Option<agentctl_core::Deployment> = serde_json::from_value(result).unwrap_or(None);
            return match deployment {
                Some(_) => vec![WorkflowAction::schedule_activity(
                    "fetch-agent-spec",
                    "fetch_agent_spec",
                    json!({
                        "namespace": self.input.namespace,
                        "service_name": self.input.service_name,
                        "service_port": self.input.service_port,
                    }),
                    ActivityOptions::default().with_retry(RetryPolicy::bounded(3)),
                )],
                None => self.fail("agent's deployment is not present; retry once the agent is ready"),
            };
        }

        if activity_id == "fetch-agent-spec" {
            let spec: crate::activities::AgentSpec = match serde_json::from_value(result) {
                Ok(spec) => spec,
                Err(error) => return self.fail(format!("decoding agent spec: {error}")),
            };
            self.model = spec.model;
            self.instructions = spec.instructions;
            self.tools = spec.actions.into_iter().map(|action| action.schema).collect();
            return vec![self.mark_status("mark-active", "active")];
        }

        if activity_id == "mark-active" {
            return vec![WorkflowAction::schedule_activity(
                "init-task-state",
                "init_task_state",
                json!({
                    "task_id": self.input.task_id,
                    "system_prompt": self.instructions,
                    "user_prompt": self.input.prompt,
                }),
                ActivityOptions::default().with_retry(RetryPolicy::bounded(3)),
            )];
        }

        if activity_id == "init-task-state" {
            return vec![self.schedule_decide_action()];
        }

        if activity_id == self.decide_action_id() {
            let output: crate::activities::DecideActionOutput = match serde_json::from_value(result) {
                Ok(output) => output,
                Err(error) => return self.fail(format!("decoding decide_action result: {error}")),
            };
            if output.finish_reason.is_terminal() {
                return self.enter_post_loop();
            }
            let tool_calls = output.message.offered_tool_call_ids().to_vec();
            if tool_calls.is_empty() {
                // ToolCalls finish reason with no calls attached: nothing to
                // fan out, treat as a terminal turn.
                return self.enter_post_loop();
            }
            return self.schedule_tool_calls(&tool_calls);
        }

        if activity_id.starts_with(&format!("take-action-{}-", self.iteration)) {
            self.pending_tool_calls = self.pending_tool_calls.saturating_sub(1);
            if self.pending_tool_calls == 0 {
                self.iteration += 1;
                return vec![self.schedule_decide_action()];
            }
            return Vec::new();
        }

        if activity_id.starts_with("append-instruction-") {
            if self.task_approved {
                return vec![self.mark_status("mark-idle", "idle")];
            }
            self.iteration += 1;
            return vec![self.schedule_decide_action()];
        }

        if activity_id == "mark-idle" {
            return vec![self.finish_task("completed")];
        }

        if activity_id == "mark-task-status" {
            self.completed = true;
            return vec![WorkflowAction::complete(json!({"task_id": self.input.task_id}))];
        }

        if activity_id == "mark-idle-on-cancel" {
            // The engine's own cancellation handling owns the terminal
            // status here; this activity is teardown only, not completion.
            return Vec::new();
        }

        Vec::new()
    }

    fn on_activity_failed(&mut self, activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction> {
        if activity_id == "check-deployment" {
            return self.fail(format!("agent's deployment could not be checked: {}", error.message));
        }
        self.fail(error.message.clone())
    }

    fn on_signal(&mut self, signal_name: &str, payload: Value) -> Vec<WorkflowAction> {
        match signal_name {
            "approve" => {
                self.task_approved = true;
                if self.in_human_gate {
                    self.in_human_gate = false;
                    vec![self.mark_status("mark-idle", "idle")]
                } else {
                    Vec::new()
                }
            }
            "instruct" => {
                let instruction: HumanInstruction = match serde_json::from_value(payload) {
                    Ok(instruction) => instruction,
                    Err(_) => return Vec::new(),
                };
                self.waiting_for_instruction = false;
                if !self.in_human_gate || self.task_approved {
                    return Vec::new();
                }
                self.in_human_gate = false;
                self.instruction_count += 1;
                vec![WorkflowAction::schedule_activity(
                    format!("append-instruction-{}", self.instruction_count),
                    "append_user_message",
                    json!({"task_id": self.input.task_id, "content": instruction.prompt}),
                    ActivityOptions::default().with_retry(RetryPolicy::bounded(3)),
                )]
            }
            "__cancel__" => vec![self.mark_status("mark-idle-on-cancel", "idle")],
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
    use crate::activities::DecideActionOutput;
    use agentctl_core::{Deployment, DeploymentStatus, Message};

    fn input(require_approval: bool) -> TaskWorkflowInput {
        TaskWorkflowInput {
            task_id: Uuid::now_v7(),
            agent_id: Uuid::now_v7(),
            prompt: "weather in Tokyo".to_string(),
            namespace: "agents".to_string(),
            service_name: "hello-world".to_string(),
            service_port: None,
            require_approval,
        }
    }

    fn ready_deployment() -> Value {
        serde_json::to_value(Some(Deployment {
            name: "hello-world".into(),
            namespace: "agents".into(),
            status: DeploymentStatus::Ready,
        }))
        .unwrap()
    }

    fn agent_spec() -> Value {
        serde_json::json!({
            "model": "gpt-x",
            "instructions": "be helpful",
            "actions": [{"schema": {"name": "get_weather", "description": "fetch weather", "parameters": {"type": "object"}}}],
        })
    }

    fn advance_to_decide(workflow: &mut TaskWorkflow) {
        workflow.on_start();
        workflow.on_activity_completed("check-deployment", ready_deployment());
        workflow.on_activity_completed("fetch-agent-spec", agent_spec());
        workflow.on_activity_completed("mark-active", Value::Null);
        workflow.on_activity_completed("init-task-state", Value::Null);
    }

    #[test]
    fn two_hop_tool_loop_reaches_mark_idle_without_approval() {
        let mut workflow = TaskWorkflow::from_input(input(false));
        advance_to_decide(&mut workflow);

        let decide_1 = DecideActionOutput {
            message: Message::assistant_tool_calls(vec![ToolCall {
                id: "c1".into(),
                name: "get_weather".into(),
                arguments: "{\"location\":\"Tokyo\"}".into(),
            }]),
            finish_reason: FinishReason::ToolCalls,
        };
        let actions = workflow.on_activity_completed("decide-action-0", serde_json::to_value(decide_1).unwrap());
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "take_action"));

        let actions = workflow.on_activity_completed("take-action-0-0", Value::Null);
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_id, .. } if activity_id == "decide-action-1"));

        let decide_2 = DecideActionOutput {
            message: Message::assistant_text("It's 17C in Tokyo."),
            finish_reason: FinishReason::Stop,
        };
        let actions = workflow.on_activity_completed("decide-action-1", serde_json::to_value(decide_2).unwrap());
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "update_agent_status"));

        let actions = workflow.on_activity_completed("mark-idle", Value::Null);
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "update_task_status"));
        assert!(!workflow.is_completed());

        let actions = workflow.on_activity_completed("mark-task-status", Value::Null);
        assert!(matches!(actions[0], WorkflowAction::CompleteWorkflow { .. }));
        assert!(workflow.is_completed());
    }

    #[test]
    fn human_gate_reenters_loop_on_instruct_then_exits_on_approve() {
        let mut workflow = TaskWorkflow::from_input(input(true));
        advance_to_decide(&mut workflow);

        let decide_1 = DecideActionOutput { message: Message::assistant_text("done for now"), finish_reason: FinishReason::Stop };
        let actions = workflow.on_activity_completed("decide-action-0", serde_json::to_value(decide_1).unwrap());
        assert!(actions.is_empty());
        assert!(workflow.waiting_for_instruction);
        assert!(workflow.in_human_gate);

        let actions = workflow.on_signal(
            "instruct",
            serde_json::to_value(HumanInstruction { task_id: workflow.input.task_id, prompt: "also Osaka".to_string() })
                .unwrap(),
        );
        assert!(!workflow.waiting_for_instruction);
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "append_user_message"));

        let actions = workflow.on_activity_completed("append-instruction-1", Value::Null);
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_id, .. } if activity_id == "decide-action-1"));

        let decide_2 = DecideActionOutput { message: Message::assistant_text("Osaka too."), finish_reason: FinishReason::Stop };
        workflow.on_activity_completed("decide-action-1", serde_json::to_value(decide_2).unwrap());
        assert!(workflow.in_human_gate);

        let actions = workflow.on_signal("approve", Value::Null);
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "update_agent_status"));
        assert!(!workflow.is_completed());
    }

    #[test]
    fn cancel_during_tool_call_tears_down_to_idle_without_completing() {
        let mut workflow = TaskWorkflow::from_input(input(false));
        advance_to_decide(&mut workflow);

        let decide_1 = DecideActionOutput {
            message: Message::assistant_tool_calls(vec![ToolCall {
                id: "c1".into(),
                name: "get_weather".into(),
                arguments: "{\"location\":\"Tokyo\"}".into(),
            }]),
            finish_reason: FinishReason::ToolCalls,
        };
        workflow.on_activity_completed("decide-action-0", serde_json::to_value(decide_1).unwrap());

        // The in-flight tool call still completes and is appended...
        workflow.on_activity_completed("take-action-0-0", Value::Null);

        // ...then cancellation arrives: teardown runs (mark agent idle), but
        // the workflow itself does not send a CompleteWorkflow command — the
        // engine owns the Canceled terminal status.
        let actions = workflow.on_signal("__cancel__", Value::Null);
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "update_agent_status"));

        let actions = workflow.on_activity_completed("mark-idle-on-cancel", Value::Null);
        assert!(actions.is_empty());
        assert!(!workflow.is_completed());
    }

    #[test]
    fn missing_deployment_fails_fast_with_retryable_error() {
        let mut workflow = TaskWorkflow::from_input(input(false));
        workflow.on_start();
        let actions = workflow.on_activity_completed("check-deployment", serde_json::to_value(Option::<Deployment>::None).unwrap());
        assert!(matches!(&actions[0], WorkflowAction::FailWorkflow { .. }));
        assert!(workflow.is_completed());
    }
}
