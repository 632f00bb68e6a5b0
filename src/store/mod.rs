//! Workflow Store
//!
//! Shared, keyed storage of workflow instances and the queries over it.
//!
//! # Components
//!
//! - [`WorkflowRepository`]: storage seam with per-workflow atomic updates
//! - [`InMemoryWorkflowStore`]: process-local implementation
//! - [`WorkflowFilter`]: conjunctive listing filter

pub mod memory;
pub mod query;
pub mod repository;

pub use memory::InMemoryWorkflowStore;
pub use query::{Page, Paginated, WorkflowFilter, MAX_PAGE_SIZE};
pub use repository::{Mutation, WorkflowRepository};
