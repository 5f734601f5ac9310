//! Conversational State Service (C6): ordered message and context-map
//! operations over a per-task `AgentState` blob, backed by a KV store.
//!
//! Concurrency contract: reads and writes are per-key through the backing
//! store; this trait's default methods perform read-modify-write without
//! external locking, because by design each task's state is mutated only
//! by the single Task Workflow that owns that task id (§4.6).

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::message::{AgentState, Message};

#[async_trait]
pub trait ConversationalStateStore: Send + Sync {
    /// Raw load; a miss returns a fresh empty state, never an error.
    async fn get_state(&self, task_id: Uuid) -> Result<AgentState>;
    async fn set_state(&self, task_id: Uuid, state: AgentState) -> Result<()>;
    async fn delete_state(&self, task_id: Uuid) -> Result<()>;

    async fn get_all_messages(&self, task_id: Uuid) -> Result<Vec<Message>> {
        Ok(self.get_state(task_id).await?.messages)
    }

    async fn get_message_by_index(&self, task_id: Uuid, index: usize) -> Result<Option<Message>> {
        Ok(self.get_state(task_id).await?.messages.get(index).cloned())
    }

    async fn batch_get_messages_by_indices(
        &self,
        task_id: Uuid,
        indices: &[usize],
    ) -> Result<Vec<Option<Message>>> {
        let state = self.get_state(task_id).await?;
        Ok(indices.iter().map(|&i| state.messages.get(i).cloned()).collect())
    }

    async fn append_message(&self, task_id: Uuid, message: Message) -> Result<()> {
        let mut state = self.get_state(task_id).await?;
        state.append(message);
        self.set_state(task_id, state).await
    }

    async fn batch_append_messages(&self, task_id: Uuid, messages: Vec<Message>) -> Result<()> {
        let mut state = self.get_state(task_id).await?;
        state.batch_append(messages);
        self.set_state(task_id, state).await
    }

    async fn insert_message(&self, task_id: Uuid, index: usize, message: Message) -> Result<()> {
        let mut state = self.get_state(task_id).await?;
        state.insert(index, message);
        self.set_state(task_id, state).await
    }

    async fn batch_insert_messages(&self, task_id: Uuid, items: Vec<(usize, Message)>) -> Result<()> {
        let mut state = self.get_state(task_id).await?;
        state.batch_insert(items);
        self.set_state(task_id, state).await
    }

    async fn override_message(&self, task_id: Uuid, index: usize, message: Message) -> Result<bool> {
        let mut state = self.get_state(task_id).await?;
        let did_override = state.override_at(index, message);
        self.set_state(task_id, state).await?;
        Ok(did_override)
    }

    async fn batch_override_messages(&self, task_id: Uuid, items: Vec<(usize, Message)>) -> Result<()> {
        let mut state = self.get_state(task_id).await?;
        state.batch_override(items);
        self.set_state(task_id, state).await
    }

    async fn delete_all_messages(&self, task_id: Uuid) -> Result<()> {
        let mut state = self.get_state(task_id).await?;
        state.messages.clear();
        self.set_state(task_id, state).await
    }

    async fn get_all_context(&self, task_id: Uuid) -> Result<std::collections::HashMap<String, serde_json::Value>> {
        Ok(self.get_state(task_id).await?.context)
    }

    async fn get_context_value(&self, task_id: Uuid, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.get_state(task_id).await?.context.get(key).cloned())
    }

    async fn batch_get_context_values(
        &self,
        task_id: Uuid,
        keys: &[String],
    ) -> Result<Vec<Option<serde_json::Value>>> {
        let state = self.get_state(task_id).await?;
        Ok(keys.iter().map(|k| state.context.get(k).cloned()).collect())
    }

    async fn set_context_value(&self, task_id: Uuid, key: String, value: serde_json::Value) -> Result<()> {
        let mut state = self.get_state(task_id).await?;
        state.context.insert(key, value);
        self.set_state(task_id, state).await
    }

    async fn batch_set_context_values(
        &self,
        task_id: Uuid,
        items: Vec<(String, serde_json::Value)>,
    ) -> Result<()> {
        let mut state = self.get_state(task_id).await?;
        for (key, value) in items {
            state.context.insert(key, value);
        }
        self.set_state(task_id, state).await
    }

    async fn delete_context_value(&self, task_id: Uuid, key: &str) -> Result<()> {
        let mut state = self.get_state(task_id).await?;
        state.context.remove(key);
        self.set_state(task_id, state).await
    }

    async fn batch_delete_context_values(&self, task_id: Uuid, keys: &[String]) -> Result<()> {
        let mut state = self.get_state(task_id).await?;
        for key in keys {
            state.context.remove(key);
        }
        self.set_state(task_id, state).await
    }

    async fn delete_all_context(&self, task_id: Uuid) -> Result<()> {
        let mut state = self.get_state(task_id).await?;
        state.context.clear();
        self.set_state(task_id, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryStore {
        states: Mutex<HashMap<Uuid, AgentState>>,
    }

    #[async_trait]
    impl ConversationalStateStore for InMemoryStore {
        async fn get_state(&self, task_id: Uuid) -> Result<AgentState> {
            Ok(self.states.lock().unwrap().get(&task_id).cloned().unwrap_or_default())
        }

        async fn set_state(&self, task_id: Uuid, state: AgentState) -> Result<()> {
            self.states.lock().unwrap().insert(task_id, state);
            Ok(())
        }

        async fn delete_state(&self, task_id: Uuid) -> Result<()> {
            self.states.lock().unwrap().remove(&task_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn load_on_unseen_key_returns_empty_state() {
        let store = InMemoryStore::default();
        let state = store.get_state(Uuid::now_v7()).await.unwrap();
        assert!(state.messages.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = InMemoryStore::default();
        let task_id = Uuid::now_v7();
        let mut state = AgentState::default();
        state.append(Message::user("hello"));
        store.set_state(task_id, state.clone()).await.unwrap();
        assert_eq!(store.get_state(task_id).await.unwrap(), state);
    }

    #[tokio::test]
    async fn append_message_is_read_modify_write() {
        let store = InMemoryStore::default();
        let task_id = Uuid::now_v7();
        store.append_message(task_id, Message::system("instructions")).await.unwrap();
        store.append_message(task_id, Message::user("prompt")).await.unwrap();
        let messages = store.get_all_messages(task_id).await.unwrap();
        assert_eq!(messages, vec![Message::system("instructions"), Message::user("prompt")]);
    }

    #[tokio::test]
    async fn context_set_and_get_value() {
        let store = InMemoryStore::default();
        let task_id = Uuid::now_v7();
        store
            .set_context_value(task_id, "attempt".to_string(), serde_json::json!(1))
            .await
            .unwrap();
        assert_eq!(
            store.get_context_value(task_id, "attempt").await.unwrap(),
            Some(serde_json::json!(1))
        );
    }

    #[tokio::test]
    async fn delete_state_clears_round_trip() {
        let store = InMemoryStore::default();
        let task_id = Uuid::now_v7();
        store.append_message(task_id, Message::user("hi")).await.unwrap();
        store.delete_state(task_id).await.unwrap();
        assert!(store.get_state(task_id).await.unwrap().messages.is_empty());
    }
}
