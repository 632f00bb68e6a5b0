//! Workflow Validation
//!
//! Checks a creation payload before it becomes a stored workflow:
//! - Workflow type is present
//! - Step list is not empty
//! - Step names and explicit ids are not blank
//! - Explicit step ids are unique within the workflow
//! - Metadata carries a source document id

use std::collections::HashSet;

use log::{debug, info};
use thiserror::Error;

use super::model::NewWorkflow;

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Workflow type is missing")]
    MissingType,
    #[error("Workflow has no steps")]
    EmptyWorkflow,
    #[error("Step {0} has an empty name")]
    EmptyStepName(usize),
    #[error("Step {0} has an empty or whitespace-only ID")]
    EmptyStepId(usize),
    #[error("Duplicate step ID: '{0}'")]
    DuplicateStepId(String),
    #[error("Workflow metadata has no sourceId")]
    MissingSourceId,
}

/// Validates a creation request.
///
/// Positions in error messages are 1-based. Generated ids (`step-<n>`) take
/// part in the duplicate check so an explicit `step-2` cannot collide with
/// the id generated for the second step.
pub fn validate_new_workflow(request: &NewWorkflow) -> Result<(), ValidationError> {
    info!("Validating workflow with {} steps", request.steps.len());

    if request.workflow_type.is_none() {
        return Err(ValidationError::MissingType);
    }

    if request.steps.is_empty() {
        return Err(ValidationError::EmptyWorkflow);
    }

    let mut seen_ids: HashSet<String> = HashSet::new();
    for (index, step) in request.steps.iter().enumerate() {
        let position = index + 1;

        if step.name.trim().is_empty() {
            return Err(ValidationError::EmptyStepName(position));
        }

        let id = match &step.id {
            Some(id) if id.trim().is_empty() => {
                return Err(ValidationError::EmptyStepId(position));
            }
            Some(id) => id.trim().to_string(),
            None => format!("step-{}", position),
        };

        if !seen_ids.insert(id.clone()) {
            return Err(ValidationError::DuplicateStepId(id));
        }

        debug!("Step {} '{}' owned by {}", position, id, step.module);
    }

    if request.metadata.source_id.trim().is_empty() {
        return Err(ValidationError::MissingSourceId);
    }

    Ok(())
}
