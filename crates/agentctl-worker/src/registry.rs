//! Maps a workflow-type string to a constructor for the corresponding
//! `Workflow` impl. Replaces decorator-based workflow registration with an
//! explicit table populated once at boot.

use std::collections::HashMap;

use agentctl_core::{Workflow, WorkflowInput};

type Constructor = Box<dyn Fn(serde_json::Value) -> anyhow::Result<Box<dyn Workflow>> + Send + Sync>;

#[derive(Default)]
pub struct WorkflowRegistry {
    constructors: HashMap<&'static str, Constructor>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<W>(&mut self)
    where
        W: WorkflowInput + 'static,
    {
        self.constructors.insert(
            W::WORKFLOW_TYPE,
            Box::new(|value| {
                let workflow = W::from_json(value)?;
                Ok(Box::new(workflow) as Box<dyn Workflow>)
            }),
        );
    }

    pub fn create(&self, workflow_type: &str, input: serde_json::Value) -> anyhow::Result<Box<dyn Workflow>> {
        let constructor = self
            .constructors
            .get(workflow_type)
            .ok_or_else(|| anyhow::anyhow!("unknown workflow type: {workflow_type}"))?;
        constructor(input)
    }

    pub fn contains(&self, workflow_type: &str) -> bool {
        self.constructors.contains_key(workflow_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentctl_core::{ActivityError, WorkflowAction};

    #[derive(Debug, Default)]
    struct EchoWorkflow {
        completed: bool,
    }

    impl Workflow for EchoWorkflow {
        fn workflow_type(&self) -> &'static str {
            "echo"
        }

        fn on_start(&mut self) -> Vec<WorkflowAction> {
            self.completed = true;
            vec![WorkflowAction::complete(serde_json::json!({}))]
        }

        fn on_activity_completed(&mut self, _activity_id: &str, _result: serde_json::Value) -> Vec<WorkflowAction> {
            Vec::new()
        }

        fn on_activity_failed(&mut self, _activity_id: &str, _error: &ActivityError) -> Vec<WorkflowAction> {
            Vec::new()
        }

        fn is_completed(&self) -> bool {
            self.completed
        }
    }

    impl WorkflowInput for EchoWorkflow {
        const WORKFLOW_TYPE: &'static str = "echo";
        type Input = ();

        fn from_input(_input: ()) -> Self {
            Self::default()
        }
    }

    #[test]
    fn registered_workflow_type_can_be_constructed_by_name() {
        let mut registry = WorkflowRegistry::new();
        registry.register::<EchoWorkflow>();
        assert!(registry.contains("echo"));
        let mut workflow = registry.create("echo", serde_json::json!(null)).unwrap();
        let actions = workflow.on_start();
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn unknown_workflow_type_is_an_error() {
        let registry = WorkflowRegistry::new();
        assert!(registry.create("nonexistent", serde_json::json!(null)).is_err());
    }
}
