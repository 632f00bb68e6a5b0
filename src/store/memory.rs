//! In-Memory Workflow Store
//!
//! Each workflow lives behind its own mutex, so updates to one workflow
//! never wait on another. The index of slots sits behind a read-write lock
//! that is only held long enough to look up, add or drop a slot.
//!
//! Lock order is slot mutex, then index read lock. Nothing acquires a slot
//! mutex while holding the index write lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::info;

use crate::error::{OrchestrationError, Result};
use crate::workflow::Workflow;

use super::repository::{Mutation, WorkflowRepository};

type Slot = Arc<Mutex<Workflow>>;

#[derive(Default)]
struct Index {
    slots: HashMap<String, Slot>,
    /// Ids in creation order
    order: Vec<String>,
}

/// Process-local workflow store.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    index: RwLock<Index>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &str) -> Option<Slot> {
        read(&self.index).slots.get(id).cloned()
    }

    /// True while `slot` is still the registered slot for `id`.
    fn is_registered(&self, id: &str, slot: &Slot) -> bool {
        read(&self.index)
            .slots
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }
}

// Every committed value is a complete workflow, so a poisoned lock still
// guards consistent data.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkflowRepository for InMemoryWorkflowStore {
    fn insert(&self, workflow: Workflow) -> Result<()> {
        let mut index = write(&self.index);
        if index.slots.contains_key(&workflow.id) {
            return Err(OrchestrationError::DuplicateWorkflow(workflow.id));
        }

        let id = workflow.id.clone();
        index.slots.insert(id.clone(), Arc::new(Mutex::new(workflow)));
        index.order.push(id);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<Workflow> {
        let slot = self.slot(id)?;
        let workflow = lock(&slot).clone();
        Some(workflow)
    }

    fn update(&self, id: &str, mutation: Mutation<'_>) -> Result<Workflow> {
        let not_found = || OrchestrationError::WorkflowNotFound(id.to_string());
        let slot = self.slot(id).ok_or_else(not_found)?;

        let mut current = lock(&slot);
        // A concurrent remove may have dropped the slot between lookup and lock.
        if !self.is_registered(id, &slot) {
            return Err(not_found());
        }

        let mut working = current.clone();
        mutation(&mut working)?;
        *current = working.clone();
        Ok(working)
    }

    fn remove(&self, id: &str) -> Option<Workflow> {
        let slot = {
            let mut index = write(&self.index);
            let slot = index.slots.remove(id)?;
            index.order.retain(|existing| existing != id);
            slot
        };

        info!("Removed workflow '{}'", id);
        let workflow = lock(&slot).clone();
        Some(workflow)
    }

    fn snapshot(&self) -> Vec<Workflow> {
        let slots: Vec<Slot> = {
            let index = read(&self.index);
            index
                .order
                .iter()
                .filter_map(|id| index.slots.get(id).cloned())
                .collect()
        };

        slots.iter().map(|slot| lock(slot).clone()).collect()
    }

    fn len(&self) -> usize {
        read(&self.index).slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Module, NewStep, NewWorkflow, StepStatus, WorkflowStatus, WorkflowType};
    use chrono::Utc;
    use std::thread;

    fn workflow_with_steps(count: usize) -> Workflow {
        let mut request = NewWorkflow::new(WorkflowType::ManufacturingToFinished).with_source("BATCH-1");
        for i in 0..count {
            request = request.with_step(NewStep::new(format!("Stage {}", i), Module::Manufacturing));
        }
        Workflow::create(request, Utc::now()).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let store = InMemoryWorkflowStore::new();
        let workflow = workflow_with_steps(2);
        let id = workflow.id.clone();

        store.insert(workflow.clone()).unwrap();

        assert_eq!(store.get(&id), Some(workflow));
        assert_eq!(store.len(), 1);
        assert!(store.get("unknown").is_none());
    }

    #[test]
    fn test_insert_duplicate_id() {
        let store = InMemoryWorkflowStore::new();
        let workflow = workflow_with_steps(1);

        store.insert(workflow.clone()).unwrap();
        let err = store.insert(workflow).unwrap_err();
        assert!(matches!(err, OrchestrationError::DuplicateWorkflow(_)));
    }

    #[test]
    fn test_update_commits_on_success() {
        let store = InMemoryWorkflowStore::new();
        let workflow = workflow_with_steps(2);
        let id = workflow.id.clone();
        store.insert(workflow).unwrap();

        let updated = store
            .update(&id, &mut |wf| {
                wf.transition_step("step-1", StepStatus::InProgress, None, Utc::now())
            })
            .unwrap();

        assert_eq!(updated.status(), WorkflowStatus::InProgress);
        assert_eq!(store.get(&id).unwrap(), updated);
    }

    #[test]
    fn test_update_discards_on_error() {
        let store = InMemoryWorkflowStore::new();
        let workflow = workflow_with_steps(2);
        let id = workflow.id.clone();
        store.insert(workflow.clone()).unwrap();

        let result = store.update(&id, &mut |wf| {
            wf.metadata.remarks = Some("partial".into());
            Err(OrchestrationError::WorkflowNotFound("forced".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.get(&id).unwrap(), workflow);
    }

    #[test]
    fn test_update_unknown_workflow() {
        let store = InMemoryWorkflowStore::new();
        let err = store.update("missing", &mut |_| Ok(())).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_remove() {
        let store = InMemoryWorkflowStore::new();
        let workflow = workflow_with_steps(1);
        let id = workflow.id.clone();
        store.insert(workflow).unwrap();

        assert!(store.remove(&id).is_some());
        assert!(store.remove(&id).is_none());
        assert!(store.is_empty());
        assert!(store.update(&id, &mut |_| Ok(())).is_err());
    }

    #[test]
    fn test_snapshot_creation_order() {
        let store = InMemoryWorkflowStore::new();
        let ids: Vec<String> = (0..5)
            .map(|_| {
                let workflow = workflow_with_steps(1);
                let id = workflow.id.clone();
                store.insert(workflow).unwrap();
                id
            })
            .collect();

        store.remove(&ids[2]);

        let snapshot_ids: Vec<String> = store.snapshot().into_iter().map(|w| w.id).collect();
        assert_eq!(snapshot_ids, vec![ids[0].clone(), ids[1].clone(), ids[3].clone(), ids[4].clone()]);
    }

    #[test]
    fn test_concurrent_updates_same_workflow() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let workflow = workflow_with_steps(32);
        let id = workflow.id.clone();
        store.insert(workflow).unwrap();

        let handles: Vec<_> = (1..=32)
            .map(|n| {
                let store = Arc::clone(&store);
                let id = id.clone();
                thread::spawn(move || {
                    store
                        .update(&id, &mut |wf| {
                            wf.transition_step(&format!("step-{}", n), StepStatus::Completed, None, Utc::now())
                        })
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let workflow = store.get(&id).unwrap();
        assert!(workflow.steps().iter().all(|s| s.status == StepStatus::Completed));
        assert_eq!(workflow.history().len(), 32);
        assert_eq!(workflow.status(), WorkflowStatus::Completed);
    }
}
