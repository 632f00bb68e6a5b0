//! PharmaFlow - Cross-Module Workflow Orchestration
//!
//! Tracks business processes that span several independently-owned
//! domains of a pharmaceutical ERP (procurement, warehouse, quality,
//! manufacturing, sales, distribution). Each process is a workflow with a
//! fixed, ordered list of steps; the workflow status is always derived from
//! the step statuses.
//!
//! # Architecture
//!
//! - [`workflow`]: Data model, status rules, validation and definition loading
//! - [`store`]: Shared workflow storage with per-workflow locking, and queries
//! - [`execution`]: Step execution coordinator and the engine request surface
//! - [`monitoring`]: Step timelines and analytics
//! - [`config`]: Engine tunables
//!
//! # Example
//!
//! ```rust,no_run
//! use pharmaflow::{Engine, EngineConfig};
//! use pharmaflow::workflow::{Module, NewStep, NewWorkflow, StepStatus, WorkflowType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(EngineConfig::default());
//!
//! let order = engine.create_workflow(
//!     NewWorkflow::new(WorkflowType::ProcurementToSupplier)
//!         .with_source("PO-2024-0113")
//!         .with_step(NewStep::new("Approve order", Module::Procurement).with_id("approve"))
//!         .with_step(NewStep::new("Acknowledge", Module::Supplier).with_id("ack")),
//! )?;
//!
//! // Approval runs in the background; the supplier reports back directly.
//! engine.execute_step(&order.id, "approve").await?;
//! engine.update_step(&order.id, "ack", StepStatus::Completed, None)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod store;
pub mod workflow;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{OrchestrationError, Result};
pub use execution::engine::Engine;
pub use workflow::model::{Step, Workflow};
pub use workflow::parser::load_definitions;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "PharmaFlow";
