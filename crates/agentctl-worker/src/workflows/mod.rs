pub mod build_workflow;
pub mod task_workflow;

pub use build_workflow::{BuildWorkflow, BuildWorkflowInput};
pub use task_workflow::{TaskWorkflow, TaskWorkflowInput};
