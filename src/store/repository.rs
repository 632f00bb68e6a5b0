//! Workflow Repository
//!
//! The storage seam of the engine. Orchestration code only talks to this
//! trait, so the in-memory store can be swapped for a persistent one.

use crate::error::Result;
use crate::workflow::Workflow;

/// Mutation applied atomically to a single stored workflow.
pub type Mutation<'a> = &'a mut dyn FnMut(&mut Workflow) -> Result<()>;

/// Keyed storage of workflows with per-workflow atomic updates.
///
/// Implementations must serialize updates to the same id and must not
/// block updates to other ids while doing so.
pub trait WorkflowRepository: Send + Sync + 'static {
    /// Stores a new workflow. Fails if the id is taken.
    fn insert(&self, workflow: Workflow) -> Result<()>;

    /// Returns a consistent copy of one workflow.
    fn get(&self, id: &str) -> Option<Workflow>;

    /// Read-modify-write against one workflow.
    ///
    /// The mutation runs on a working copy while the workflow is locked.
    /// The copy is committed only if the mutation returns `Ok`, so a
    /// rejected mutation leaves the stored workflow untouched. Returns the
    /// committed workflow.
    fn update(&self, id: &str, mutation: Mutation<'_>) -> Result<Workflow>;

    /// Removes a workflow, returning it if it existed.
    fn remove(&self, id: &str) -> Option<Workflow>;

    /// Consistent copies of every workflow, in creation order.
    fn snapshot(&self) -> Vec<Workflow>;

    /// Number of stored workflows.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
