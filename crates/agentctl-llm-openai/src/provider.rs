//! Maps between `agentctl_core`'s domain types and the OpenAI wire format,
//! and implements `LlmProvider` against it.

use agentctl_core::{
    CoreError, FinishReason, LlmCallConfig, LlmChoice, LlmProvider, Message, Result, ToolCall, ToolDefinition,
};
use async_trait::async_trait;

use crate::driver::{DriverError, OpenAiDriver};
use crate::types::{ChatRequest, OpenAiFunction, OpenAiFunctionCall, OpenAiMessage, OpenAiTool, OpenAiToolCall};

pub struct OpenAiProvider {
    driver: OpenAiDriver,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { driver: OpenAiDriver::new(api_key) }
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: String) -> Self {
        Self { driver: OpenAiDriver::with_base_url(api_key, base_url) }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self { driver: OpenAiDriver::from_env()? })
    }
}

impl From<DriverError> for CoreError {
    fn from(error: DriverError) -> Self {
        match &error {
            DriverError::Api { status, .. } if (400..500).contains(status) => CoreError::client(error.to_string()),
            _ => CoreError::service(error.to_string()),
        }
    }
}

fn tool_call_to_wire(tool_call: &ToolCall) -> OpenAiToolCall {
    OpenAiToolCall {
        id: tool_call.id.clone(),
        r#type: "function".to_string(),
        function: OpenAiFunctionCall { name: tool_call.name.clone(), arguments: tool_call.arguments.clone() },
    }
}

fn tool_call_from_wire(tool_call: OpenAiToolCall) -> ToolCall {
    ToolCall { id: tool_call.id, name: tool_call.function.name, arguments: tool_call.function.arguments }
}

fn message_to_wire(message: &Message) -> OpenAiMessage {
    match message {
        Message::System { content } => {
            OpenAiMessage { role: "system".to_string(), content: Some(content.clone()), tool_calls: None, tool_call_id: None, name: None }
        }
        Message::User { content } => {
            OpenAiMessage { role: "user".to_string(), content: Some(content.clone()), tool_calls: None, tool_call_id: None, name: None }
        }
        Message::Assistant { content, tool_calls } => OpenAiMessage {
            role: "assistant".to_string(),
            content: content.clone(),
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls.iter().map(tool_call_to_wire).collect()) },
            tool_call_id: None,
            name: None,
        },
        Message::Tool { tool_call_id, name, content } => OpenAiMessage {
            role: "tool".to_string(),
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
            name: Some(name.clone()),
        },
    }
}

fn tool_definition_to_wire(tool: &ToolDefinition) -> OpenAiTool {
    OpenAiTool {
        r#type: "function".to_string(),
        function: OpenAiFunction { name: tool.name.clone(), description: tool.description.clone(), parameters: tool.parameters.clone() },
    }
}

fn wire_message_to_domain(message: OpenAiMessage) -> Message {
    let tool_calls = message.tool_calls.map(|calls| calls.into_iter().map(tool_call_from_wire).collect()).unwrap_or_default();
    if !tool_calls.is_empty() || message.role == "assistant" {
        Message::Assistant { content: message.content, tool_calls }
    } else if message.role == "tool" {
        Message::Tool {
            tool_call_id: message.tool_call_id.unwrap_or_default(),
            name: message.name.unwrap_or_default(),
            content: message.content.unwrap_or_default(),
        }
    } else if message.role == "system" {
        Message::System { content: message.content.unwrap_or_default() }
    } else {
        Message::User { content: message.content.unwrap_or_default() }
    }
}

fn call_config_to_request(config: LlmCallConfig) -> ChatRequest {
    ChatRequest {
        model: config.model,
        messages: config.messages.iter().map(message_to_wire).collect(),
        temperature: config.temperature,
        top_p: config.top_p,
        max_tokens: config.max_tokens,
        presence_penalty: config.presence_penalty,
        frequency_penalty: config.frequency_penalty,
        seed: config.seed,
        tools: if config.tools.is_empty() { None } else { Some(config.tools.iter().map(tool_definition_to_wire).collect()) },
        tool_choice: config.tool_choice,
        parallel_tool_calls: config.parallel_tool_calls,
        response_format: config.response_format,
        stream: false,
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat_completion(&self, config: LlmCallConfig) -> Result<LlmChoice> {
        let request = call_config_to_request(config);
        let response = self.driver.chat_completion(request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::service("openai response carried no choices"))?;
        let finish_reason = choice.finish_reason.as_deref().map(FinishReason::from_str_loose).unwrap_or(FinishReason::Stop);
        Ok(LlmChoice { message: wire_message_to_domain(choice.message), finish_reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_tool_calls_round_trip_through_wire_format() {
        let message = Message::assistant_tool_calls(vec![ToolCall {
            id: "call_1".to_string(),
            name: "get_weather".to_string(),
            arguments: "{\"city\":\"nyc\"}".to_string(),
        }]);
        let wire = message_to_wire(&message);
        assert_eq!(wire.role, "assistant");
        let back = wire_message_to_domain(wire);
        assert_eq!(back, message);
    }

    #[test]
    fn tool_result_round_trips() {
        let message = Message::tool("call_1", "get_weather", "{\"temp_f\":70}");
        let wire = message_to_wire(&message);
        assert_eq!(wire.role, "tool");
        assert_eq!(wire.tool_call_id.as_deref(), Some("call_1"));
        let back = wire_message_to_domain(wire);
        assert_eq!(back, message);
    }

    #[test]
    fn client_errors_map_to_4xx_and_service_errors_to_5xx() {
        let client_error: CoreError = DriverError::Api { status: 401, message: "bad key".to_string() }.into();
        assert!(!client_error.is_retryable());
        let service_error: CoreError = DriverError::Api { status: 503, message: "overloaded".to_string() }.into();
        assert!(service_error.is_retryable());
    }
}
