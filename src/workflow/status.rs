//! Step and Workflow Status
//!
//! Step statuses only move forward along
//! `pending -> in_progress -> {completed | failed}`. A workflow's status is
//! never stored independently of its steps: it is recomputed with
//! [`aggregate`] after every step mutation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not started yet
    Pending,
    /// Handed to the owning module
    InProgress,
    /// Finished successfully
    Completed,
    /// Reported as failed by the owning module
    Failed,
}

impl StepStatus {
    pub const ALL: [StepStatus; 4] = [
        StepStatus::Pending,
        StepStatus::InProgress,
        StepStatus::Completed,
        StepStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Position along the lifecycle. Both terminal states share the last rank.
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Returns true for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Checks whether a step may move from `self` to `next`.
    ///
    /// Forward moves (including skipping `in_progress`) are allowed. Staying
    /// in the same non-terminal status is allowed so a module can refresh the
    /// step payload. Nothing leaves a terminal status.
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown step status: {}", s))
    }
}

/// Derived status of a whole workflow.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 4] = [
        WorkflowStatus::Pending,
        WorkflowStatus::InProgress,
        WorkflowStatus::Completed,
        WorkflowStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown workflow status: {}", s))
    }
}

/// Derives a workflow status from its step statuses.
///
/// Precedence:
/// 1. any step failed -> `failed`
/// 2. every step completed -> `completed`
/// 3. any step in progress -> `in_progress`
/// 4. otherwise -> `pending`
///
/// A mix of completed and pending steps with nothing in progress is
/// `pending`. An empty step list is `pending`.
pub fn aggregate<I>(statuses: I) -> WorkflowStatus
where
    I: IntoIterator<Item = StepStatus>,
{
    let mut total = 0usize;
    let mut completed = 0usize;
    let mut in_progress = false;

    for status in statuses {
        total += 1;
        match status {
            StepStatus::Failed => return WorkflowStatus::Failed,
            StepStatus::Completed => completed += 1,
            StepStatus::InProgress => in_progress = true,
            StepStatus::Pending => {}
        }
    }

    if total > 0 && completed == total {
        WorkflowStatus::Completed
    } else if in_progress {
        WorkflowStatus::InProgress
    } else {
        WorkflowStatus::Pending
    }
}
