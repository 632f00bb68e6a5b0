//! Workflow Data Model
//!
//! Core data structures representing cross-module workflows and their steps.
//!
//! # Example YAML Format
//!
//! ```yaml
//! type: procurement_to_supplier
//! metadata:
//!   sourceId: PO-2024-0113
//!   priority: high
//!   targetId: SUP-0042
//! steps:
//!   - name: Approve purchase order
//!     module: procurement
//!   - name: Notify supplier
//!     module: procurement
//!     data:
//!       channel: email
//!   - name: Supplier acknowledgement
//!     module: supplier
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{OrchestrationError, Result};

use super::status::{aggregate, StepStatus, WorkflowStatus};
use super::validator::{validate_new_workflow, ValidationError};

/// Opaque key/value payload exchanged with the owning module.
pub type StepData = Map<String, Value>;

/// Business domain that owns a step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Procurement,
    Supplier,
    Warehouse,
    QualityControl,
    QualityAssurance,
    Manufacturing,
    Sales,
    Distribution,
}

impl Module {
    pub const ALL: [Module; 8] = [
        Module::Procurement,
        Module::Supplier,
        Module::Warehouse,
        Module::QualityControl,
        Module::QualityAssurance,
        Module::Manufacturing,
        Module::Sales,
        Module::Distribution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Procurement => "procurement",
            Self::Supplier => "supplier",
            Self::Warehouse => "warehouse",
            Self::QualityControl => "quality_control",
            Self::QualityAssurance => "quality_assurance",
            Self::Manufacturing => "manufacturing",
            Self::Sales => "sales",
            Self::Distribution => "distribution",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|module| module.as_str() == s)
            .ok_or_else(|| format!("Unknown module: {}", s))
    }
}

/// Business process template a workflow instance follows.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    ProcurementToSupplier,
    SupplierToWarehouse,
    WarehouseToQuality,
    ManufacturingToFinished,
    SalesToDistribution,
}

impl WorkflowType {
    pub const ALL: [WorkflowType; 5] = [
        WorkflowType::ProcurementToSupplier,
        WorkflowType::SupplierToWarehouse,
        WorkflowType::WarehouseToQuality,
        WorkflowType::ManufacturingToFinished,
        WorkflowType::SalesToDistribution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProcurementToSupplier => "procurement_to_supplier",
            Self::SupplierToWarehouse => "supplier_to_warehouse",
            Self::WarehouseToQuality => "warehouse_to_quality",
            Self::ManufacturingToFinished => "manufacturing_to_finished",
            Self::SalesToDistribution => "sales_to_distribution",
        }
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown workflow type: {}", s))
    }
}

/// Scheduling priority carried in workflow metadata.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Free-form workflow metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    /// Id of the business document that started the process (PO, GRN, batch...)
    #[serde(default)]
    pub source_id: String,

    #[serde(default)]
    pub priority: Priority,

    /// Id of the document or party the process ends at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

/// A single unit of work owned by one module.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Identifier, unique within the parent workflow only
    pub id: String,

    /// Display label
    pub name: String,

    /// Owning module
    pub module: Module,

    pub status: StepStatus,

    /// Payload reported by the owning module, never interpreted here
    #[serde(default)]
    pub data: StepData,

    /// Time of the most recent update
    pub timestamp: DateTime<Utc>,
}

/// An applied step status change.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    pub step_id: String,
    pub module: Module,
    pub status: StepStatus,
    pub at: DateTime<Utc>,
}

/// One instance of a cross-module business process.
///
/// The step list is fixed at creation. `status` is always the result of
/// [`aggregate`] over the step statuses. Both are read-only outside this
/// module; [`Workflow::transition_step`] is the only way to move a step.
///
/// ```compile_fail
/// use pharmaflow::workflow::{Module, NewStep, NewWorkflow, WorkflowStatus, WorkflowType};
/// use pharmaflow::Workflow;
///
/// let mut workflow = Workflow::create(
///     NewWorkflow::new(WorkflowType::SalesToDistribution)
///         .with_source("SO-1")
///         .with_step(NewStep::new("Dispatch", Module::Distribution)),
///     chrono::Utc::now(),
/// )
/// .unwrap();
///
/// workflow.status = WorkflowStatus::Completed;
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,

    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,

    status: WorkflowStatus,

    steps: Vec<Step>,

    pub metadata: WorkflowMetadata,

    /// Step status changes in the order they were applied
    #[serde(default)]
    history: Vec<StepEvent>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Set when the derived status first becomes terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Builds a workflow from a validated creation request.
    ///
    /// Every step starts `pending`. Steps without an explicit id are named
    /// `step-<n>` by position (1-based).
    pub fn create(
        request: NewWorkflow,
        created_at: DateTime<Utc>,
    ) -> std::result::Result<Self, ValidationError> {
        validate_new_workflow(&request)?;

        let workflow_type = request
            .workflow_type
            .ok_or(ValidationError::MissingType)?;

        let steps = request
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| Step {
                id: step
                    .id
                    .map(|id| id.trim().to_string())
                    .unwrap_or_else(|| format!("step-{}", index + 1)),
                name: step.name.trim().to_string(),
                module: step.module,
                status: StepStatus::Pending,
                data: step.data,
                timestamp: created_at,
            })
            .collect();

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            workflow_type,
            status: WorkflowStatus::Pending,
            steps,
            metadata: request.metadata,
            history: Vec::new(),
            created_at,
            updated_at: created_at,
            completed_at: None,
        })
    }

    /// Derived workflow status.
    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Steps in their creation order. The list never changes after creation.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Applied step status changes, oldest first.
    pub fn history(&self) -> &[StepEvent] {
        &self.history
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Gets a step by ID.
    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    fn get_step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Returns true if any step is owned by `module`.
    pub fn involves(&self, module: Module) -> bool {
        self.steps.iter().any(|s| s.module == module)
    }

    /// Moves a step to `to`, then re-derives the workflow status.
    ///
    /// `data` replaces the step payload when given. Fails without touching
    /// the workflow if the step is unknown or the move is not allowed.
    pub fn transition_step(
        &mut self,
        step_id: &str,
        to: StepStatus,
        data: Option<StepData>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let workflow_id = self.id.clone();
        let step = self
            .get_step_mut(step_id)
            .ok_or_else(|| OrchestrationError::StepNotFound {
                workflow_id,
                step_id: step_id.to_string(),
            })?;

        let from = step.status;
        if !from.can_transition_to(to) {
            return Err(OrchestrationError::InvalidTransition {
                step_id: step_id.to_string(),
                from,
                to,
            });
        }

        step.status = to;
        step.timestamp = at;
        if let Some(data) = data {
            step.data = data;
        }
        let module = step.module;

        if from != to {
            debug!(
                "Workflow '{}': step '{}' {} -> {}",
                self.id, step_id, from, to
            );
            self.history.push(StepEvent {
                step_id: step_id.to_string(),
                module,
                status: to,
                at,
            });
        }

        self.refresh_status(at);
        Ok(())
    }

    /// Recomputes `status` from the steps and bumps `updated_at`.
    pub fn refresh_status(&mut self, at: DateTime<Utc>) {
        let status = aggregate(self.steps.iter().map(|s| s.status));

        if status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(at);
            info!("Workflow '{}' ({}) is {}", self.id, self.workflow_type, status);
        }

        self.status = status;
        self.updated_at = at;
    }

    /// Applies a metadata patch. Status is re-derived, never written.
    pub fn apply_patch(&mut self, patch: WorkflowPatch, at: DateTime<Utc>) {
        if let Some(priority) = patch.priority {
            self.metadata.priority = priority;
        }
        if let Some(target_id) = patch.target_id {
            self.metadata.target_id = Some(target_id);
        }
        if let Some(remarks) = patch.remarks {
            self.metadata.remarks = Some(remarks);
        }
        self.refresh_status(at);
    }

    /// Returns the number of steps in the workflow.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the workflow has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Step as supplied in a creation request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewStep {
    /// Optional explicit id; generated from the position when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    pub module: Module,

    #[serde(default)]
    pub data: StepData,
}

impl NewStep {
    /// Creates a step request with a generated id.
    ///
    /// # Example
    ///
    /// ```
    /// use pharmaflow::workflow::{Module, NewStep};
    ///
    /// let step = NewStep::new("Sample incoming lot", Module::QualityControl)
    ///     .with_id("sample")
    ///     .with_data("lot", "LOT-7781");
    /// ```
    pub fn new(name: impl Into<String>, module: Module) -> Self {
        Self {
            id: None,
            name: name.into(),
            module,
            data: StepData::new(),
        }
    }

    /// Sets an explicit step id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds a payload entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Creation payload for a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkflow {
    #[serde(rename = "type", default)]
    pub workflow_type: Option<WorkflowType>,

    #[serde(default)]
    pub steps: Vec<NewStep>,

    #[serde(default)]
    pub metadata: WorkflowMetadata,
}

impl NewWorkflow {
    pub fn new(workflow_type: WorkflowType) -> Self {
        Self {
            workflow_type: Some(workflow_type),
            ..Self::default()
        }
    }

    /// Sets the source document id.
    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.metadata.source_id = source_id.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.metadata.priority = priority;
        self
    }

    /// Appends a step.
    pub fn with_step(mut self, step: NewStep) -> Self {
        self.steps.push(step);
        self
    }
}

/// Bulk metadata update. Absent fields are left unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPatch {
    #[serde(default)]
    pub priority: Option<Priority>,

    #[serde(default)]
    pub target_id: Option<String>,

    #[serde(default)]
    pub remarks: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn receiving_request() -> NewWorkflow {
        NewWorkflow::new(WorkflowType::SupplierToWarehouse)
            .with_source("GRN-1001")
            .with_step(NewStep::new("Receive goods", Module::Warehouse).with_id("receive"))
            .with_step(NewStep::new("Sample lot", Module::QualityControl).with_id("sample"))
            .with_step(NewStep::new("Put away", Module::Warehouse).with_id("putaway"))
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_create_starts_pending() {
        let workflow = Workflow::create(receiving_request(), t0()).unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Pending);
        assert_eq!(workflow.len(), 3);
        assert!(workflow.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert!(workflow.steps.iter().all(|s| s.timestamp == t0()));
        assert_eq!(workflow.created_at, workflow.updated_at);
        assert!(workflow.history.is_empty());
        assert!(!workflow.id.is_empty());
    }

    #[test]
    fn test_create_preserves_step_order() {
        let workflow = Workflow::create(receiving_request(), t0()).unwrap();
        let ids: Vec<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["receive", "sample", "putaway"]);
    }

    #[test]
    fn test_create_generates_step_ids() {
        let request = NewWorkflow::new(WorkflowType::SalesToDistribution)
            .with_source("SO-9")
            .with_step(NewStep::new("Pick", Module::Warehouse))
            .with_step(NewStep::new("Ship", Module::Distribution));

        let workflow = Workflow::create(request, t0()).unwrap();
        assert_eq!(workflow.steps[0].id, "step-1");
        assert_eq!(workflow.steps[1].id, "step-2");
    }

    #[test]
    fn test_create_ids_are_unique() {
        let a = Workflow::create(receiving_request(), t0()).unwrap();
        let b = Workflow::create(receiving_request(), t0()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_create_rejects_missing_type() {
        let mut request = receiving_request();
        request.workflow_type = None;
        assert_eq!(
            Workflow::create(request, t0()).unwrap_err(),
            ValidationError::MissingType
        );
    }

    #[test]
    fn test_transition_updates_step_and_status() {
        let mut workflow = Workflow::create(receiving_request(), t0()).unwrap();
        let at = t0() + Duration::minutes(5);

        workflow
            .transition_step("receive", StepStatus::InProgress, None, at)
            .unwrap();

        let step = workflow.get_step("receive").unwrap();
        assert_eq!(step.status, StepStatus::InProgress);
        assert_eq!(step.timestamp, at);
        assert_eq!(workflow.status, WorkflowStatus::InProgress);
        assert_eq!(workflow.updated_at, at);
        assert_eq!(workflow.history.len(), 1);
        assert_eq!(workflow.history[0].module, Module::Warehouse);
    }

    #[test]
    fn test_transition_replaces_data() {
        let mut workflow = Workflow::create(receiving_request(), t0()).unwrap();
        let mut data = StepData::new();
        data.insert("quantity".into(), Value::from(480));

        workflow
            .transition_step("receive", StepStatus::Completed, Some(data.clone()), t0())
            .unwrap();

        assert_eq!(workflow.get_step("receive").unwrap().data, data);
    }

    #[test]
    fn test_transition_unknown_step() {
        let mut workflow = Workflow::create(receiving_request(), t0()).unwrap();
        let err = workflow
            .transition_step("missing", StepStatus::Completed, None, t0())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_transition_backward_is_rejected() {
        let mut workflow = Workflow::create(receiving_request(), t0()).unwrap();
        workflow
            .transition_step("receive", StepStatus::Completed, None, t0())
            .unwrap();
        let before = workflow.clone();

        let err = workflow
            .transition_step("receive", StepStatus::Pending, None, t0() + Duration::hours(1))
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::InvalidTransition { .. }));
        assert_eq!(workflow, before);
    }

    #[test]
    fn test_same_status_refresh_keeps_history() {
        let mut workflow = Workflow::create(receiving_request(), t0()).unwrap();
        workflow
            .transition_step("receive", StepStatus::InProgress, None, t0())
            .unwrap();
        workflow
            .transition_step("receive", StepStatus::InProgress, None, t0() + Duration::minutes(1))
            .unwrap();

        assert_eq!(workflow.history.len(), 1);
        assert_eq!(
            workflow.get_step("receive").unwrap().timestamp,
            t0() + Duration::minutes(1)
        );
    }

    #[test]
    fn test_completed_at_set_once() {
        let mut workflow = Workflow::create(receiving_request(), t0()).unwrap();
        for (i, id) in ["receive", "sample", "putaway"].iter().enumerate() {
            workflow
                .transition_step(id, StepStatus::Completed, None, t0() + Duration::hours(i as i64 + 1))
                .unwrap();
        }

        assert_eq!(workflow.status, WorkflowStatus::Completed);
        assert_eq!(workflow.completed_at, Some(t0() + Duration::hours(3)));

        workflow.apply_patch(WorkflowPatch::default(), t0() + Duration::hours(9));
        assert_eq!(workflow.completed_at, Some(t0() + Duration::hours(3)));
    }

    #[test]
    fn test_failed_step_fails_workflow() {
        let mut workflow = Workflow::create(receiving_request(), t0()).unwrap();
        workflow
            .transition_step("sample", StepStatus::Failed, None, t0())
            .unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Failed);
        assert_eq!(workflow.completed_at, Some(t0()));
    }

    #[test]
    fn test_apply_patch_updates_metadata_only() {
        let mut workflow = Workflow::create(receiving_request(), t0()).unwrap();
        let later = t0() + Duration::minutes(30);

        workflow.apply_patch(
            WorkflowPatch {
                priority: Some(Priority::Urgent),
                target_id: None,
                remarks: Some("Cold chain".into()),
            },
            later,
        );

        assert_eq!(workflow.metadata.priority, Priority::Urgent);
        assert_eq!(workflow.metadata.remarks.as_deref(), Some("Cold chain"));
        assert_eq!(workflow.metadata.source_id, "GRN-1001");
        assert_eq!(workflow.status, WorkflowStatus::Pending);
        assert_eq!(workflow.updated_at, later);
    }

    #[test]
    fn test_involves_module() {
        let workflow = Workflow::create(receiving_request(), t0()).unwrap();
        assert!(workflow.involves(Module::Warehouse));
        assert!(workflow.involves(Module::QualityControl));
        assert!(!workflow.involves(Module::Sales));
    }

    #[test]
    fn test_workflow_json_shape() {
        let workflow = Workflow::create(receiving_request(), t0()).unwrap();
        let json = serde_json::to_value(&workflow).unwrap();

        assert_eq!(json["type"], "supplier_to_warehouse");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["metadata"]["sourceId"], "GRN-1001");
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["steps"][1]["module"], "quality_control");
    }

    #[test]
    fn test_new_workflow_from_json() {
        let request: NewWorkflow = serde_json::from_str(
            r#"{
                "type": "warehouse_to_quality",
                "metadata": {"sourceId": "LOT-1", "priority": "high"},
                "steps": [{"name": "Sample", "module": "quality_control", "data": {"size": 3}}]
            }"#,
        )
        .unwrap();

        assert_eq!(request.workflow_type, Some(WorkflowType::WarehouseToQuality));
        assert_eq!(request.metadata.priority, Priority::High);
        assert_eq!(request.steps[0].data["size"], 3);
    }

    #[test]
    fn test_module_parsing() {
        assert_eq!("quality_assurance".parse::<Module>().unwrap(), Module::QualityAssurance);
        assert!("finance".parse::<Module>().is_err());
        assert_eq!(
            "sales_to_distribution".parse::<WorkflowType>().unwrap(),
            WorkflowType::SalesToDistribution
        );
    }
}
