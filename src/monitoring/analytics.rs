//! Workflow Analytics
//!
//! Read-only aggregation over stored workflows: throughput, completion
//! times, per-module efficiency and bottleneck detection.
//!
//! A workflow belongs to a period when its lifetime overlaps it: it was
//! created no later than the period end and did not reach a terminal status
//! before the period start.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AnalyticsConfig;
use crate::workflow::{Module, StepStatus, Workflow, WorkflowStatus};

use super::timeline::{format_duration, StepTimeline};

/// Reporting window.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum AnalyticsPeriod {
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    #[default]
    Last30Days,
    #[serde(rename = "90d")]
    Last90Days,
    Range {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

impl AnalyticsPeriod {
    /// Resolves the period to an inclusive `(from, to)` window.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match *self {
            Self::Last7Days => (now - Duration::days(7), now),
            Self::Last30Days => (now - Duration::days(30), now),
            Self::Last90Days => (now - Duration::days(90), now),
            Self::Range { from, to } => (from, to),
        }
    }
}

impl fmt::Display for AnalyticsPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Last7Days => f.write_str("7d"),
            Self::Last30Days => f.write_str("30d"),
            Self::Last90Days => f.write_str("90d"),
            Self::Range { from, to } => write!(f, "{}..{}", from.to_rfc3339(), to.to_rfc3339()),
        }
    }
}

impl FromStr for AnalyticsPeriod {
    type Err = String;

    /// Accepts `7d`, `30d`, `90d` or `<from>..<to>`, where each bound is an
    /// RFC 3339 timestamp or a `YYYY-MM-DD` date (whole day, UTC).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "7d" => Ok(Self::Last7Days),
            "30d" => Ok(Self::Last30Days),
            "90d" => Ok(Self::Last90Days),
            other => {
                let (from, to) = other
                    .split_once("..")
                    .ok_or_else(|| format!("Invalid period: {}", other))?;
                let from = parse_bound(from, false)?;
                let to = parse_bound(to, true)?;
                if from > to {
                    return Err(format!("Period starts after it ends: {}", other));
                }
                Ok(Self::Range { from, to })
            }
        }
    }
}

fn parse_bound(value: &str, end_of_day: bool) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date: {}", value))?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| format!("Invalid date: {}", value))
}

/// Severity of a bottleneck relative to the configured delay threshold.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Per-module step statistics.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStats {
    pub module: Module,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    /// Percentage of the module's steps that completed
    pub efficiency: f64,
    /// Mean time from `in_progress` to a terminal status, in seconds
    pub average_delay_secs: f64,
    /// Number of finished in-progress spans behind `average_delay_secs`
    pub delay_samples: usize,
    /// Completed workflows whose final step belonged to this module
    pub last_to_complete: usize,
}

/// A module flagged as slowing workflows down.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bottleneck {
    pub module: Module,
    pub average_delay_secs: f64,
    pub occurrences: usize,
    pub impact: Impact,
}

/// Aggregated report for one period.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowAnalytics {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub pending: usize,
    /// Percentage of workflows in the period that completed
    pub completion_rate: f64,
    /// Mean creation-to-completion time of completed workflows, in seconds
    pub average_completion_secs: f64,
    /// Modules that own at least one step, in [`Module::ALL`] order
    pub modules: Vec<ModuleStats>,
    /// Slowest first
    pub bottlenecks: Vec<Bottleneck>,
}

#[derive(Default)]
struct ModuleAccumulator {
    total: usize,
    completed: usize,
    failed: usize,
    delay_total_secs: f64,
    delay_samples: usize,
    last_to_complete: usize,
}

impl WorkflowAnalytics {
    /// Computes the report for workflows overlapping `[from, to]`.
    ///
    /// An empty selection yields a zero-valued report.
    pub fn compute(
        workflows: &[Workflow],
        (from, to): (DateTime<Utc>, DateTime<Utc>),
        config: &AnalyticsConfig,
    ) -> Self {
        let selected: Vec<&Workflow> = workflows
            .iter()
            .filter(|w| w.created_at <= to && w.completed_at().map_or(true, |done| done >= from))
            .collect();

        let count = |status: WorkflowStatus| selected.iter().filter(|w| w.status() == status).count();
        let total = selected.len();
        let completed = count(WorkflowStatus::Completed);

        let completion_times: Vec<f64> = selected
            .iter()
            .filter(|w| w.status() == WorkflowStatus::Completed)
            .filter_map(|w| w.completed_at().map(|at| seconds(at - w.created_at)))
            .collect();

        let mut per_module: BTreeMap<Module, ModuleAccumulator> = BTreeMap::new();

        for workflow in &selected {
            let timeline = StepTimeline::from_workflow(workflow);
            let durations = timeline.in_progress_durations();

            for step in workflow.steps() {
                let acc = per_module.entry(step.module).or_default();
                acc.total += 1;
                match step.status {
                    StepStatus::Completed => acc.completed += 1,
                    StepStatus::Failed => acc.failed += 1,
                    _ => {}
                }
                if let Some(duration) = durations.get(&step.id) {
                    acc.delay_total_secs += seconds(*duration);
                    acc.delay_samples += 1;
                }
            }

            if workflow.status() == WorkflowStatus::Completed {
                if let Some(last) = timeline.last_completed() {
                    per_module.entry(last.module).or_default().last_to_complete += 1;
                }
            }
        }

        let modules: Vec<ModuleStats> = per_module
            .into_iter()
            .map(|(module, acc)| ModuleStats {
                module,
                total_steps: acc.total,
                completed_steps: acc.completed,
                failed_steps: acc.failed,
                efficiency: percentage(acc.completed, acc.total),
                average_delay_secs: mean(acc.delay_total_secs, acc.delay_samples),
                delay_samples: acc.delay_samples,
                last_to_complete: acc.last_to_complete,
            })
            .collect();

        let mut bottlenecks: Vec<Bottleneck> = modules
            .iter()
            .filter(|m| {
                m.average_delay_secs > config.bottleneck_delay_secs
                    && m.last_to_complete > config.bottleneck_min_occurrences
            })
            .map(|m| Bottleneck {
                module: m.module,
                average_delay_secs: m.average_delay_secs,
                occurrences: m.last_to_complete,
                impact: classify_impact(m.average_delay_secs, config),
            })
            .collect();
        bottlenecks.sort_by(|a, b| b.average_delay_secs.total_cmp(&a.average_delay_secs));

        Self {
            period_start: from,
            period_end: to,
            total,
            completed,
            failed: count(WorkflowStatus::Failed),
            in_progress: count(WorkflowStatus::InProgress),
            pending: count(WorkflowStatus::Pending),
            completion_rate: percentage(completed, total),
            average_completion_secs: mean(completion_times.iter().sum(), completion_times.len()),
            modules,
            bottlenecks,
        }
    }

    /// Returns the statistics of one module, if it owns any step in the period.
    pub fn module(&self, module: Module) -> Option<&ModuleStats> {
        self.modules.iter().find(|m| m.module == module)
    }

    /// Returns a human-readable summary.
    pub fn get_summary(&self) -> String {
        let mut output = format!(
            "Workflow Analytics ({} - {})\n",
            self.period_start.format("%Y-%m-%d %H:%M UTC"),
            self.period_end.format("%Y-%m-%d %H:%M UTC")
        );

        output.push_str(&format!(
            "  Workflows:        {} total, {} completed, {} failed, {} in progress, {} pending\n",
            self.total, self.completed, self.failed, self.in_progress, self.pending
        ));
        output.push_str(&format!("  Completion rate:  {:.1}%\n", self.completion_rate));
        output.push_str(&format!(
            "  Avg completion:   {}\n",
            format_secs(self.average_completion_secs)
        ));

        if !self.modules.is_empty() {
            output.push_str("\nModule efficiency:\n");
            for m in &self.modules {
                output.push_str(&format!(
                    "  {:18} {:5.1}%  avg delay {:>8}  last {}\n",
                    m.module.as_str(),
                    m.efficiency,
                    format_secs(m.average_delay_secs),
                    m.last_to_complete
                ));
            }
        }

        if !self.bottlenecks.is_empty() {
            output.push_str("\nBottlenecks:\n");
            for b in &self.bottlenecks {
                output.push_str(&format!(
                    "  {:18} {:>8}  x{}  ({})\n",
                    b.module.as_str(),
                    format_secs(b.average_delay_secs),
                    b.occurrences,
                    b.impact
                ));
            }
        }

        output
    }
}

fn classify_impact(average_delay_secs: f64, config: &AnalyticsConfig) -> Impact {
    if config.bottleneck_delay_secs <= 0.0 {
        return Impact::High;
    }

    let ratio = average_delay_secs / config.bottleneck_delay_secs;
    if ratio >= config.high_impact_ratio {
        Impact::High
    } else if ratio >= config.medium_impact_ratio {
        Impact::Medium
    } else {
        Impact::Low
    }
}

fn seconds(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}

fn mean(total: f64, samples: usize) -> f64 {
    if samples == 0 {
        0.0
    } else {
        total / samples as f64
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn format_secs(secs: f64) -> String {
    format_duration(Duration::milliseconds((secs * 1000.0).round() as i64))
}
