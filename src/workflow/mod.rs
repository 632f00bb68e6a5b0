//! Workflow Definition Module
//!
//! Data structures for cross-module workflows and the rules governing
//! their state.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Step, Workflow, creation payloads)
//! - [`status`]: Step lifecycle rules and the workflow status aggregator
//! - [`validator`]: Creation payload validation
//! - [`parser`]: YAML definition loading

pub mod model;
pub mod parser;
pub mod status;
pub mod validator;

pub use model::{
    Module, NewStep, NewWorkflow, Priority, Step, StepData, StepEvent, Workflow,
    WorkflowMetadata, WorkflowPatch, WorkflowType,
};
pub use parser::{load_definitions, parse_definitions, LoadError, WorkflowDefinition};
pub use status::{aggregate, StepStatus, WorkflowStatus};
pub use validator::{validate_new_workflow, ValidationError};
