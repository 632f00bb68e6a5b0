//! Error Types
//!
//! Errors returned synchronously by the request-path operations of the
//! engine. None of these are transient, so callers should not retry them.

use thiserror::Error;

use crate::workflow::{StepStatus, ValidationError};

/// Errors produced by workflow store and engine operations.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// No workflow is registered under this id.
    #[error("Workflow '{0}' not found")]
    WorkflowNotFound(String),

    /// A workflow with this id is already stored.
    #[error("Workflow '{0}' already exists")]
    DuplicateWorkflow(String),

    /// The workflow exists but has no step with this id.
    #[error("Step '{step_id}' not found in workflow '{workflow_id}'")]
    StepNotFound {
        workflow_id: String,
        step_id: String,
    },

    /// The requested status would move a step backward or out of a terminal state.
    #[error("Step '{step_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        step_id: String,
        from: StepStatus,
        to: StepStatus,
    },

    /// The creation payload was malformed.
    #[error("Invalid workflow: {0}")]
    Validation(#[from] ValidationError),
}

impl OrchestrationError {
    /// Returns true for both unknown-workflow and unknown-step errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::WorkflowNotFound(_) | Self::StepNotFound { .. })
    }
}

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, OrchestrationError>;
