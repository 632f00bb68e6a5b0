//! Workflow Engine
//!
//! The request surface of the orchestration engine. A transport layer maps
//! its routes one-to-one onto these methods:
//!
//! | Route                                  | Method                 |
//! |----------------------------------------|------------------------|
//! | `POST /workflows`                      | [`Engine::create_workflow`] |
//! | `GET /workflows`                       | [`Engine::list_workflows`]  |
//! | `GET /workflows/{id}`                  | [`Engine::get_workflow`]    |
//! | `PUT /workflows/{id}`                  | [`Engine::update_workflow`] |
//! | `PUT /workflows/{id}/steps/{stepId}`   | [`Engine::update_step`]     |
//! | `POST /workflows/{id}/steps/{stepId}`  | [`Engine::execute_step`]    |
//! | `GET /analytics/workflows`             | [`Engine::analytics`]       |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::config::EngineConfig;
use crate::error::{OrchestrationError, Result};
use crate::monitoring::{AnalyticsPeriod, WorkflowAnalytics};
use crate::store::{InMemoryWorkflowStore, WorkflowFilter, WorkflowRepository};
use crate::workflow::{NewWorkflow, StepData, StepStatus, Workflow, WorkflowPatch};

use super::coordinator::Coordinator;

/// Workflow orchestration engine.
///
/// # Example
///
/// ```rust,no_run
/// use pharmaflow::config::EngineConfig;
/// use pharmaflow::execution::Engine;
/// use pharmaflow::workflow::{Module, NewStep, NewWorkflow, WorkflowType};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = Engine::new(EngineConfig::default());
///
/// let workflow = engine.create_workflow(
///     NewWorkflow::new(WorkflowType::SupplierToWarehouse)
///         .with_source("GRN-1001")
///         .with_step(NewStep::new("Receive goods", Module::Warehouse))
///         .with_step(NewStep::new("Sample lot", Module::QualityControl)),
/// )?;
///
/// engine.execute_step(&workflow.id, "step-1").await?;
/// engine.settle().await;
/// # Ok(())
/// # }
/// ```
pub struct Engine<R: WorkflowRepository = InMemoryWorkflowStore> {
    store: Arc<R>,
    coordinator: Coordinator<R>,
    config: EngineConfig,
}

impl Engine<InMemoryWorkflowStore> {
    /// Creates an engine backed by an in-memory store.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_store(Arc::new(InMemoryWorkflowStore::new()), config)
    }
}

impl<R: WorkflowRepository> Engine<R> {
    /// Creates an engine over an existing store.
    pub fn with_store(store: Arc<R>, config: EngineConfig) -> Self {
        let coordinator = Coordinator::new(Arc::clone(&store), config.completion_delay());
        Self {
            store,
            coordinator,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates and stores a new workflow. All steps start `pending`.
    pub fn create_workflow(&self, request: NewWorkflow) -> Result<Workflow> {
        let workflow = Workflow::create(request, Utc::now())?;
        self.store.insert(workflow.clone())?;

        info!(
            "Created workflow '{}' ({}, {} steps)",
            workflow.id,
            workflow.workflow_type,
            workflow.len()
        );
        Ok(workflow)
    }

    /// Fetches one workflow.
    pub fn get_workflow(&self, id: &str) -> Result<Workflow> {
        self.store
            .get(id)
            .ok_or_else(|| OrchestrationError::WorkflowNotFound(id.to_string()))
    }

    /// Lists workflows matching `filter`, in creation order.
    pub fn list_workflows(&self, filter: &WorkflowFilter) -> Vec<Workflow> {
        filter.apply(self.store.snapshot())
    }

    /// Updates workflow metadata. Status stays derived from the steps.
    pub fn update_workflow(&self, id: &str, patch: WorkflowPatch) -> Result<Workflow> {
        self.store.update(id, &mut |workflow| {
            workflow.apply_patch(patch.clone(), Utc::now());
            Ok(())
        })
    }

    /// Records a step outcome reported by its owning module.
    ///
    /// `data` replaces the step payload when given. Rejected updates leave
    /// the workflow unchanged.
    pub fn update_step(
        &self,
        id: &str,
        step_id: &str,
        status: StepStatus,
        data: Option<StepData>,
    ) -> Result<Workflow> {
        self.store
            .update(id, &mut |workflow| {
                workflow.transition_step(step_id, status, data.clone(), Utc::now())
            })
            .map_err(|e| {
                if matches!(e, OrchestrationError::InvalidTransition { .. }) {
                    warn!("Rejected update of workflow '{}': {}", id, e);
                }
                e
            })
    }

    /// Starts a pending step and schedules its completion.
    ///
    /// Returns the workflow state right after the step was started.
    pub async fn execute_step(&self, id: &str, step_id: &str) -> Result<Workflow> {
        self.coordinator.execute(id, step_id).await
    }

    /// Removes a workflow from the store.
    pub fn remove_workflow(&self, id: &str) -> Result<Workflow> {
        self.store
            .remove(id)
            .ok_or_else(|| OrchestrationError::WorkflowNotFound(id.to_string()))
    }

    /// Analytics for a period ending now.
    pub fn analytics(&self, period: AnalyticsPeriod) -> WorkflowAnalytics {
        self.analytics_at(period, Utc::now())
    }

    /// Analytics for a period resolved against `now`.
    pub fn analytics_at(&self, period: AnalyticsPeriod, now: DateTime<Utc>) -> WorkflowAnalytics {
        WorkflowAnalytics::compute(
            &self.store.snapshot(),
            period.window(now),
            &self.config.analytics,
        )
    }

    /// Number of background completions still waiting to fire.
    pub fn pending_completions(&self) -> usize {
        self.coordinator.pending_completions()
    }

    /// Waits for every scheduled completion to fire.
    pub async fn settle(&self) {
        self.coordinator.settle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{
        aggregate, Module, NewStep, Priority, ValidationError, WorkflowStatus, WorkflowType,
    };
    use serde_json::Value;
    use std::time::Duration;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default().with_completion_delay(Duration::from_millis(500)))
    }

    fn three_step_request() -> NewWorkflow {
        NewWorkflow::new(WorkflowType::ManufacturingToFinished)
            .with_source("BATCH-42")
            .with_step(NewStep::new("Dispense", Module::Warehouse).with_id("dispense"))
            .with_step(NewStep::new("Compress", Module::Manufacturing).with_id("compress"))
            .with_step(NewStep::new("Release", Module::QualityAssurance).with_id("release"))
    }

    #[test]
    fn test_engine_creation() {
        let engine = engine();
        assert_eq!(engine.config().completion_delay_ms, 500);
        assert!(engine.list_workflows(&WorkflowFilter::new()).is_empty());
    }

    #[test]
    fn test_create_and_get() {
        let engine = engine();
        let created = engine.create_workflow(three_step_request()).unwrap();

        assert_eq!(created.status(), WorkflowStatus::Pending);
        assert_eq!(engine.get_workflow(&created.id).unwrap(), created);
    }

    #[test]
    fn test_create_invalid_payload() {
        let engine = engine();
        let err = engine
            .create_workflow(NewWorkflow::new(WorkflowType::SalesToDistribution).with_source("SO-1"))
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestrationError::Validation(ValidationError::EmptyWorkflow)
        ));
        assert!(engine.list_workflows(&WorkflowFilter::new()).is_empty());
    }

    #[test]
    fn test_get_unknown() {
        assert!(engine().get_workflow("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_step_success() {
        let engine = engine();
        let id = engine.create_workflow(three_step_request()).unwrap().id;

        let mut data = StepData::new();
        data.insert("yield".into(), Value::from(98.5));
        let workflow = engine
            .update_step(&id, "dispense", StepStatus::InProgress, Some(data))
            .unwrap();

        assert_eq!(workflow.status(), WorkflowStatus::InProgress);
        assert_eq!(workflow.get_step("dispense").unwrap().data["yield"], 98.5);
    }

    #[test]
    fn test_update_step_not_found() {
        let engine = engine();
        let id = engine.create_workflow(three_step_request()).unwrap().id;

        assert!(engine
            .update_step("nope", "dispense", StepStatus::Completed, None)
            .unwrap_err()
            .is_not_found());
        assert!(engine
            .update_step(&id, "nope", StepStatus::Completed, None)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_update_step_rejects_backward_move() {
        let engine = engine();
        let id = engine.create_workflow(three_step_request()).unwrap().id;
        engine
            .update_step(&id, "dispense", StepStatus::Completed, None)
            .unwrap();
        let before = engine.get_workflow(&id).unwrap();

        let err = engine
            .update_step(&id, "dispense", StepStatus::Pending, None)
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::InvalidTransition { .. }));
        assert_eq!(engine.get_workflow(&id).unwrap(), before);
    }

    #[test]
    fn test_update_workflow_metadata() {
        let engine = engine();
        let id = engine.create_workflow(three_step_request()).unwrap().id;

        let workflow = engine
            .update_workflow(
                &id,
                WorkflowPatch {
                    priority: Some(Priority::High),
                    target_id: Some("FG-42".into()),
                    remarks: None,
                },
            )
            .unwrap();

        assert_eq!(workflow.metadata.priority, Priority::High);
        assert_eq!(workflow.metadata.target_id.as_deref(), Some("FG-42"));
        assert_eq!(workflow.status(), WorkflowStatus::Pending);
        assert!(engine.update_workflow("nope", WorkflowPatch::default()).is_err());
    }

    #[test]
    fn test_list_with_filter() {
        let engine = engine();
        engine.create_workflow(three_step_request()).unwrap();
        engine
            .create_workflow(
                NewWorkflow::new(WorkflowType::SalesToDistribution)
                    .with_source("SO-5")
                    .with_step(NewStep::new("Ship", Module::Distribution)),
            )
            .unwrap();

        assert_eq!(engine.list_workflows(&WorkflowFilter::new()).len(), 2);
        let filtered = engine.list_workflows(&WorkflowFilter::new().with_module(Module::Manufacturing));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].workflow_type, WorkflowType::ManufacturingToFinished);
    }

    #[test]
    fn test_shared_store_mutations_keep_status_derived() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let engine = Engine::with_store(Arc::clone(&store), EngineConfig::default());
        let id = engine.create_workflow(three_step_request()).unwrap().id;

        // A holder of the store can only move steps through the model.
        let committed = store
            .update(&id, &mut |workflow| {
                workflow.transition_step("dispense", StepStatus::Completed, None, Utc::now())?;
                workflow.refresh_status(Utc::now());
                Ok(())
            })
            .unwrap();

        let stored = engine.get_workflow(&id).unwrap();
        assert_eq!(stored, committed);
        assert_eq!(stored.steps().len(), 3);
        assert_eq!(stored.status(), WorkflowStatus::Pending);
        assert_eq!(
            stored.status(),
            aggregate(stored.steps().iter().map(|step| step.status))
        );
    }

    #[test]
    fn test_remove_workflow() {
        let engine = engine();
        let id = engine.create_workflow(three_step_request()).unwrap().id;

        assert!(engine.remove_workflow(&id).is_ok());
        assert!(engine.remove_workflow(&id).unwrap_err().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_all_steps_completes_workflow() {
        let engine = engine();
        let id = engine.create_workflow(three_step_request()).unwrap().id;

        for step in ["dispense", "compress", "release"] {
            let workflow = engine.execute_step(&id, step).await.unwrap();
            assert_eq!(workflow.status(), WorkflowStatus::InProgress);
        }
        assert_eq!(engine.pending_completions(), 3);

        engine.settle().await;

        let workflow = engine.get_workflow(&id).unwrap();
        assert_eq!(workflow.status(), WorkflowStatus::Completed);
        assert!(workflow.completed_at().is_some());

        let report = engine.analytics(AnalyticsPeriod::Last7Days);
        assert_eq!(report.total, 1);
        assert_eq!(report.completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_step_cannot_go_back_to_pending() {
        let engine = engine();
        let id = engine.create_workflow(three_step_request()).unwrap().id;

        for step in ["dispense", "compress", "release"] {
            engine.execute_step(&id, step).await.unwrap();
        }
        // A module fails one step mid-flight; its completion is discarded.
        engine
            .update_step(&id, "compress", StepStatus::Failed, None)
            .unwrap();
        engine.settle().await;

        let workflow = engine.get_workflow(&id).unwrap();
        assert_eq!(workflow.status(), WorkflowStatus::Failed);
        assert_eq!(workflow.get_step("dispense").unwrap().status, StepStatus::Completed);
        assert_eq!(workflow.get_step("compress").unwrap().status, StepStatus::Failed);

        let err = engine
            .update_step(&id, "dispense", StepStatus::Pending, None)
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidTransition { .. }));
        assert_eq!(engine.get_workflow(&id).unwrap(), workflow);
    }
}
