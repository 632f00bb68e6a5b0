//! Execution Coordinator
//!
//! Runs a step on behalf of its owning module:
//! - The `pending -> in_progress` move happens before `execute` returns
//! - The `in_progress -> completed` move happens later on a background task
//!
//! The background completion goes through the same atomic update path as
//! every other mutation and only applies if the step is still in the status
//! it was left in. Anything that moved the step in the meantime (a module
//! reporting a failure, say) wins, and the completion is dropped.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use tokio::task::JoinHandle;

use crate::error::{OrchestrationError, Result};
use crate::store::WorkflowRepository;
use crate::workflow::{StepStatus, Workflow};

/// A deferred step completion, keyed by the state it expects to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledCompletion {
    pub workflow_id: String,
    pub step_id: String,
    /// Status the step must still have for the completion to apply
    pub expected: StepStatus,
}

/// What happened when a scheduled completion fired.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// The step was completed; carries the committed workflow
    Applied(Workflow),
    /// The step had moved on; carries the status found
    Stale(StepStatus),
    /// The workflow or step no longer exists
    Vanished,
}

impl ScheduledCompletion {
    pub fn new(workflow_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            step_id: step_id.into(),
            expected: StepStatus::InProgress,
        }
    }

    /// Completes the step if it still has the expected status.
    ///
    /// The completion is stamped while the workflow is locked, so it never
    /// predates an update committed ahead of it.
    pub fn apply<R>(&self, store: &R) -> CompletionOutcome
    where
        R: WorkflowRepository + ?Sized,
    {
        let mut found = None;

        let result = store.update(&self.workflow_id, &mut |workflow| {
            let step = workflow
                .get_step(&self.step_id)
                .ok_or_else(|| OrchestrationError::StepNotFound {
                    workflow_id: self.workflow_id.clone(),
                    step_id: self.step_id.clone(),
                })?;

            if step.status != self.expected {
                found = Some(step.status);
                return Err(OrchestrationError::InvalidTransition {
                    step_id: self.step_id.clone(),
                    from: step.status,
                    to: StepStatus::Completed,
                });
            }

            workflow.transition_step(&self.step_id, StepStatus::Completed, None, Utc::now())
        });

        match (result, found) {
            (Ok(workflow), _) => CompletionOutcome::Applied(workflow),
            (Err(_), Some(status)) => CompletionOutcome::Stale(status),
            (Err(_), None) => CompletionOutcome::Vanished,
        }
    }
}

/// Starts steps and completes them after a processing delay.
pub struct Coordinator<R: WorkflowRepository> {
    store: Arc<R>,
    completion_delay: Duration,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: WorkflowRepository> Coordinator<R> {
    /// Creates a coordinator over a shared store.
    pub fn new(store: Arc<R>, completion_delay: Duration) -> Self {
        Self {
            store,
            completion_delay,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub fn completion_delay(&self) -> Duration {
        self.completion_delay
    }

    /// Executes a step.
    ///
    /// Returns the workflow as committed by the synchronous part. A step
    /// that is not `pending` is left alone and the current workflow is
    /// returned unchanged.
    pub async fn execute(&self, workflow_id: &str, step_id: &str) -> Result<Workflow> {
        let mut started = false;

        let workflow = self.store.update(workflow_id, &mut |workflow| {
            let status = workflow
                .get_step(step_id)
                .map(|step| step.status)
                .ok_or_else(|| OrchestrationError::StepNotFound {
                    workflow_id: workflow_id.to_string(),
                    step_id: step_id.to_string(),
                })?;

            if status != StepStatus::Pending {
                return Ok(());
            }

            workflow.transition_step(step_id, StepStatus::InProgress, None, Utc::now())?;
            started = true;
            Ok(())
        })?;

        if started {
            self.schedule(ScheduledCompletion::new(workflow_id, step_id));
        } else {
            debug!(
                "Step '{}' of workflow '{}' already started, nothing to execute",
                step_id, workflow_id
            );
        }

        Ok(workflow)
    }

    fn schedule(&self, completion: ScheduledCompletion) {
        let store = Arc::clone(&self.store);
        let delay = self.completion_delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            match completion.apply(store.as_ref()) {
                CompletionOutcome::Applied(workflow) => debug!(
                    "Completed step '{}' of workflow '{}' (workflow {})",
                    completion.step_id, completion.workflow_id, workflow.status()
                ),
                CompletionOutcome::Stale(status) => debug!(
                    "Dropped completion of step '{}' in workflow '{}': step is {}",
                    completion.step_id, completion.workflow_id, status
                ),
                CompletionOutcome::Vanished => debug!(
                    "Dropped completion of step '{}': workflow '{}' is gone",
                    completion.step_id, completion.workflow_id
                ),
            }
        });

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.push(handle);
    }

    /// Number of scheduled completions that have not fired yet.
    pub fn pending_completions(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Waits until every scheduled completion has fired.
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(
                &mut *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if handles.is_empty() {
                break;
            }

            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("Background completion task failed: {}", e);
                }
            }
        }
    }
}
