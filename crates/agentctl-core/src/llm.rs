//! LLM Port: the contract the Task Workflow's `decide_action` activity
//! calls through. Concrete adapters (e.g. an OpenAI-compatible client) live
//! in their own crate and implement `LlmProvider`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{AgentState, Message, ToolCall};

/// A closed set of chat-completion parameters. Callers fill only what they
/// need; the adapter serializes the set to whatever wire format its
/// provider expects. Keeping this closed (rather than passing an open
/// `kwargs` bag through) is a deliberate departure from looser call-site
/// patterns: every option the core can ask for is enumerated here once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmCallConfig {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

impl LlmCallConfig {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self { model: model.into(), messages, ..Default::default() }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// A tool the LLM may call, expressed as an OpenAI-style function schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Why the LLM stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
}

impl FinishReason {
    /// True for the finish reasons that end the tool loop (§4.5 step 4b).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stop | Self::Length | Self::ContentFilter)
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            _ => Self::ToolCalls,
        }
    }
}

/// The LLM's decision for one turn of the tool loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmChoice {
    pub message: Message,
    pub finish_reason: FinishReason,
}

impl LlmChoice {
    /// Tool calls requested by the assistant, if any.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.message.offered_tool_call_ids()
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat_completion(&self, config: LlmCallConfig) -> Result<LlmChoice>;
}

/// Build the tools argument for a completion call from an agent's action
/// catalog (see §6 Agent HTTP contract: `{schema: {name, description,
/// parameters}}`).
pub fn tools_from_action_schemas(
    schemas: impl IntoIterator<Item = (String, String, serde_json::Value)>,
) -> Vec<ToolDefinition> {
    schemas
        .into_iter()
        .map(|(name, description, parameters)| ToolDefinition { name, description, parameters })
        .collect()
}

/// Build the initial `LlmCallConfig` for a `decide_action` call from the
/// current conversational state (§4.5 step 4a).
pub fn call_config_for_decision(
    model: &str,
    state: &AgentState,
    tools: Vec<ToolDefinition>,
) -> LlmCallConfig {
    LlmCallConfig::new(model, state.messages.clone()).with_tools(tools)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_finish_reasons() {
        assert!(FinishReason::Stop.is_terminal());
        assert!(FinishReason::Length.is_terminal());
        assert!(FinishReason::ContentFilter.is_terminal());
        assert!(!FinishReason::ToolCalls.is_terminal());
    }

    #[test]
    fn from_str_loose_defaults_to_tool_calls() {
        assert_eq!(FinishReason::from_str_loose("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from_str_loose("anything else"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from_str_loose("stop"), FinishReason::Stop);
    }

    #[test]
    fn call_config_carries_state_messages_and_tools() {
        let mut state = AgentState::default();
        state.append(Message::system("be helpful"));
        let tools = tools_from_action_schemas([(
            "get_weather".to_string(),
            "fetch weather".to_string(),
            serde_json::json!({"type": "object"}),
        )]);
        let config = call_config_for_decision("gpt-x", &state, tools);
        assert_eq!(config.messages.len(), 1);
        assert_eq!(config.tools.len(), 1);
        assert_eq!(config.tools[0].name, "get_weather");
    }
}
