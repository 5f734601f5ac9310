//! Domain error taxonomy.
//!
//! Every fallible operation in the control plane ends up in one of these
//! kinds. The kind, not the message, is what activities and the REST layer
//! branch on: retryable vs not, 4xx vs 5xx.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed request or a reference to a row that doesn't exist. Never retried.
    #[error("client error: {0}")]
    Client(String),

    /// Unique-constraint violation (e.g. agent name already taken).
    #[error("duplicate item: {0}")]
    DuplicateItem(String),

    /// Entity absent. Distinct from an error at activity boundaries: callers
    /// that can accept absence should use `Option` instead of this variant.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient or permanent backend failure. Retried by the caller's
    /// RetryPolicy up to `maximum_attempts`.
    #[error("service error: {0}")]
    Service(String),

    /// A workflow-level domain failure (e.g. "build job failed"). No retry
    /// at the workflow level; the workflow body decides to fail or compensate.
    #[error("workflow failure: {0}")]
    WorkflowFailure(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }

    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::DuplicateItem(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    pub fn workflow_failure(msg: impl Into<String>) -> Self {
        Self::WorkflowFailure(msg.into())
    }

    /// Whether an activity wrapping this error should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Service(_) | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_and_internal_are_retryable() {
        assert!(CoreError::service("timeout").is_retryable());
        assert!(CoreError::from(anyhow::anyhow!("boom")).is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!CoreError::client("bad request").is_retryable());
        assert!(!CoreError::not_found("agent a1").is_retryable());
        assert!(!CoreError::duplicate("name taken").is_retryable());
        assert!(!CoreError::workflow_failure("build job failed").is_retryable());
    }

    #[test]
    fn display_messages_carry_the_kind() {
        assert_eq!(CoreError::not_found("task t1").to_string(), "not found: task t1");
    }
}
