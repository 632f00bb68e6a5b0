//! Execution Module
//!
//! Components for driving workflows forward:
//!
//! - [`coordinator`]: Step execution with delayed background completion
//! - [`engine`]: Request surface over the store, coordinator and analytics

pub mod coordinator;
pub mod engine;

pub use coordinator::{CompletionOutcome, Coordinator, ScheduledCompletion};
pub use engine::Engine;
