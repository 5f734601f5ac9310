//! Postgres-backed persistence for Agent and Task rows (C12).

pub mod models;
pub mod repositories;

pub use models::*;
pub use repositories::Database;

#[cfg(test)]
mod tests {
    use super::*;
    use agentctl_core::sanitize_resource_name;

    #[test]
    fn create_agent_input_uses_sanitized_name_convention() {
        let input = CreateAgent {
            id: uuid::Uuid::now_v7(),
            name: sanitize_resource_name("My Agent"),
            description: None,
            workflow_name: "agent_build_workflow".to_string(),
            workflow_queue_name: "agent-build-queue".to_string(),
        };
        assert_eq!(input.name, "my-agent");
    }
}
