//! Conversational state message model.
//!
//! Messages are append-dominant and tagged by role. A `Tool` message's
//! `tool_call_id` must reference a `ToolCall.id` emitted by a prior
//! `Assistant` message in the same sequence — callers that build
//! `AgentState` by hand are responsible for preserving that linkage;
//! `AgentState::append`/`batch_append` do not themselves validate it,
//! since validating would require scanning the full history on every
//! append.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// A single function call requested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON-encoded arguments, exactly as the LLM emitted them.
    pub arguments: String,
}

/// A message in a task's conversational state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User { content: content.into() }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::Assistant { content: Some(content.into()), tool_calls: Vec::new() }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant { content: None, tool_calls }
    }

    pub fn tool(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool { tool_call_id: tool_call_id.into(), name: name.into(), content: content.into() }
    }

    /// Tool call ids this message (an Assistant message) offers for linkage,
    /// empty for every other variant.
    pub fn offered_tool_call_ids(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// Conversational state for a single task: an ordered message list plus a
/// free-form context map, both keyed by the owning task id at the storage
/// layer. Lazily created — a miss in the backing store yields
/// `AgentState::default()`, never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AgentState {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl AgentState {
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn batch_append(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn get_by_index(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn batch_get_by_indices(&self, indices: &[usize]) -> Vec<Option<&Message>> {
        indices.iter().map(|&i| self.messages.get(i)).collect()
    }

    pub fn insert(&mut self, index: usize, message: Message) {
        let index = index.min(self.messages.len());
        self.messages.insert(index, message);
    }

    pub fn batch_insert(&mut self, items: impl IntoIterator<Item = (usize, Message)>) {
        for (index, message) in items {
            self.insert(index, message);
        }
    }

    pub fn override_at(&mut self, index: usize, message: Message) -> bool {
        match self.messages.get_mut(index) {
            Some(slot) => {
                *slot = message;
                true
            }
            None => false,
        }
    }

    pub fn batch_override(&mut self, items: impl IntoIterator<Item = (usize, Message)>) {
        for (index, message) in items {
            self.override_at(index, message);
        }
    }

    /// True if every `Tool` message's `tool_call_id` references a preceding
    /// `Assistant` message's tool call in this same sequence. Used by tests,
    /// not enforced on every mutation (see module docs).
    pub fn tool_call_linkage_is_valid(&self) -> bool {
        let mut seen_ids: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for message in &self.messages {
            match message {
                Message::Assistant { tool_calls, .. } => {
                    for call in tool_calls {
                        seen_ids.insert(call.id.as_str());
                    }
                }
                Message::Tool { tool_call_id, .. } => {
                    if !seen_ids.contains(tool_call_id.as_str()) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_empty() {
        let state = AgentState::default();
        assert!(state.messages.is_empty());
        assert!(state.context.is_empty());
    }

    #[test]
    fn append_preserves_order() {
        let mut state = AgentState::default();
        state.append(Message::system("you are helpful"));
        state.append(Message::user("weather in Tokyo"));
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0], Message::system("you are helpful"));
    }

    #[test]
    fn linkage_valid_when_tool_message_follows_assistant_call() {
        let mut state = AgentState::default();
        state.append(Message::assistant_tool_calls(vec![ToolCall {
            id: "c1".into(),
            name: "get_weather".into(),
            arguments: "{}".into(),
        }]));
        state.append(Message::tool("c1", "get_weather", "{\"temp\":17}"));
        assert!(state.tool_call_linkage_is_valid());
    }

    #[test]
    fn linkage_invalid_for_orphaned_tool_message() {
        let mut state = AgentState::default();
        state.append(Message::tool("c-missing", "get_weather", "{}"));
        assert!(!state.tool_call_linkage_is_valid());
    }

    #[test]
    fn override_replaces_existing_message_without_changing_length() {
        let mut state = AgentState::default();
        state.append(Message::user("first draft"));
        assert!(state.override_at(0, Message::user("revised")));
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0], Message::user("revised"));
    }

    #[test]
    fn override_out_of_bounds_is_a_no_op() {
        let mut state = AgentState::default();
        assert!(!state.override_at(3, Message::user("ignored")));
        assert!(state.messages.is_empty());
    }
}
