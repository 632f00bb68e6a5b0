//! Monitoring Module
//!
//! Derived views over workflow history.
//!
//! # Components
//!
//! - [`StepTimeline`]: per-step in-progress spans and Gantt charts
//! - [`WorkflowAnalytics`]: throughput, efficiency and bottleneck report

pub mod analytics;
pub mod timeline;

pub use analytics::{AnalyticsPeriod, Bottleneck, Impact, ModuleStats, WorkflowAnalytics};
pub use timeline::{format_duration, StepTimeline};
