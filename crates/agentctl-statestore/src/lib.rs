//! Redis-backed `ConversationalStateStore`: each task's `AgentState` is
//! stored as one JSON blob keyed by task id, with a TTL so abandoned task
//! state does not accumulate forever.

use agentctl_core::{AgentState, ConversationalStateStore, CoreError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

/// Default TTL applied to every write. Refreshed on each `set_state`, so an
/// actively-running task's state never expires mid-run.
const DEFAULT_STATE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

pub struct RedisStateStore {
    connection: ConnectionManager,
    key_prefix: String,
    ttl_secs: u64,
}

impl RedisStateStore {
    pub async fn connect(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| CoreError::service(e.to_string()))?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| CoreError::service(e.to_string()))?;
        Ok(Self { connection, key_prefix: key_prefix.into(), ttl_secs: DEFAULT_STATE_TTL_SECS })
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    fn key(&self, task_id: Uuid) -> String {
        state_key(&self.key_prefix, task_id)
    }
}

fn state_key(key_prefix: &str, task_id: Uuid) -> String {
    format!("{key_prefix}:task-state:{task_id}")
}

#[async_trait]
impl ConversationalStateStore for RedisStateStore {
    async fn get_state(&self, task_id: Uuid) -> Result<AgentState> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection
            .get(self.key(task_id))
            .await
            .map_err(|e| CoreError::service(e.to_string()))?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| CoreError::service(format!("corrupt task state for {task_id}: {e}"))),
            None => Ok(AgentState::default()),
        }
    }

    async fn set_state(&self, task_id: Uuid, state: AgentState) -> Result<()> {
        let json = serde_json::to_string(&state).map_err(|e| CoreError::service(e.to_string()))?;
        let mut connection = self.connection.clone();
        let _: () = connection
            .set_ex(self.key(task_id), json, self.ttl_secs)
            .await
            .map_err(|e| CoreError::service(e.to_string()))?;
        Ok(())
    }

    async fn delete_state(&self, task_id: Uuid) -> Result<()> {
        let mut connection = self.connection.clone();
        let _: () = connection
            .del(self.key(task_id))
            .await
            .map_err(|e| CoreError::service(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_namespaced_by_prefix_and_task_id() {
        let task_id = Uuid::nil();
        assert_eq!(state_key("agentctl", task_id), format!("agentctl:task-state:{task_id}"));
    }
}
