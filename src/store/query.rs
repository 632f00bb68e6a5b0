//! Workflow Queries
//!
//! Filtering for workflow listings. All supplied filters must match; absent
//! filters match everything. Listings keep the store's creation order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::{Module, Workflow, WorkflowStatus, WorkflowType};

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: usize = 100;

/// Conjunctive workflow filter.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowFilter {
    #[serde(rename = "type", default)]
    pub workflow_type: Option<WorkflowType>,

    #[serde(default)]
    pub status: Option<WorkflowStatus>,

    /// Matches if any step belongs to this module
    #[serde(default)]
    pub module: Option<Module>,

    /// Inclusive lower bound on `createdAt`
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,

    /// Inclusive upper bound on `createdAt`
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
}

impl WorkflowFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, workflow_type: WorkflowType) -> Self {
        self.workflow_type = Some(workflow_type);
        self
    }

    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_module(mut self, module: Module) -> Self {
        self.module = Some(module);
        self
    }

    /// Restricts `createdAt` to `[from, to]`. Either bound may be open.
    pub fn created_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    /// Checks one workflow against every supplied filter.
    pub fn matches(&self, workflow: &Workflow) -> bool {
        self.workflow_type.map_or(true, |t| workflow.workflow_type == t)
            && self.status.map_or(true, |s| workflow.status() == s)
            && self.module.map_or(true, |m| workflow.involves(m))
            && self.date_from.map_or(true, |from| workflow.created_at >= from)
            && self.date_to.map_or(true, |to| workflow.created_at <= to)
    }

    /// Keeps the matching workflows, preserving order.
    pub fn apply(&self, workflows: Vec<Workflow>) -> Vec<Workflow> {
        workflows.into_iter().filter(|w| self.matches(w)).collect()
    }
}

/// Page request for caller-facing listings.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub page: usize,
    pub limit: usize,
}

impl Page {
    /// Creates a page request. Page 0 becomes 1; limit is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Slices `items` to this page.
    pub fn apply<T>(&self, items: Vec<T>) -> Paginated<T> {
        let total = items.len();
        let offset = (self.page - 1).saturating_mul(self.limit);

        Paginated {
            items: items.into_iter().skip(offset).take(self.limit).collect(),
            total,
            page: self.page,
            limit: self.limit,
            total_pages: total.div_ceil(self.limit),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

/// One page of results plus totals.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}
