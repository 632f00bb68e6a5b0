//! Step Timeline
//!
//! Reads a workflow's step history to measure how long each step spent in
//! progress and to render Gantt charts of a workflow's execution.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::workflow::{StepEvent, StepStatus, Workflow};

/// Chart width in characters.
const CHART_WIDTH: f64 = 50.0;

/// Ordered step events of one workflow, relative to its creation time.
#[derive(Debug, Clone)]
pub struct StepTimeline {
    events: Vec<StepEvent>,
    origin: DateTime<Utc>,
}

impl StepTimeline {
    /// Builds the timeline of a workflow from its history.
    pub fn from_workflow(workflow: &Workflow) -> Self {
        Self {
            events: workflow.history().to_vec(),
            origin: workflow.created_at,
        }
    }

    /// Time from creation to the latest event.
    pub fn elapsed(&self) -> Duration {
        self.events
            .iter()
            .map(|e| e.at - self.origin)
            .max()
            .unwrap_or_else(Duration::zero)
    }

    /// Time each step spent between entering `in_progress` and reaching a
    /// terminal status. Steps that skipped `in_progress` or have not
    /// finished are absent.
    pub fn in_progress_durations(&self) -> HashMap<String, Duration> {
        let mut starts: HashMap<&str, DateTime<Utc>> = HashMap::new();
        let mut durations = HashMap::new();

        for event in &self.events {
            match event.status {
                StepStatus::InProgress => {
                    starts.insert(event.step_id.as_str(), event.at);
                }
                StepStatus::Completed | StepStatus::Failed => {
                    if let Some(start) = starts.get(event.step_id.as_str()) {
                        durations.insert(event.step_id.clone(), event.at - *start);
                    }
                }
                StepStatus::Pending => {}
            }
        }

        durations
    }

    /// The most recent completion event, if any step completed.
    pub fn last_completed(&self) -> Option<&StepEvent> {
        self.events
            .iter()
            .filter(|e| e.status == StepStatus::Completed)
            .max_by_key(|e| e.at)
    }

    /// Generates an ASCII Gantt chart of in-progress spans.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total = self.elapsed();
        if total <= Duration::zero() {
            return output;
        }

        let scale = CHART_WIDTH / total.num_milliseconds() as f64;

        // step -> (start offset, end offset) in ms
        let mut spans: Vec<(String, i64, i64)> = Vec::new();
        let mut open: HashMap<String, usize> = HashMap::new();

        for event in &self.events {
            let offset = (event.at - self.origin).num_milliseconds();
            match event.status {
                StepStatus::InProgress => {
                    open.insert(event.step_id.clone(), spans.len());
                    spans.push((event.step_id.clone(), offset, offset));
                }
                StepStatus::Completed | StepStatus::Failed => {
                    if let Some(&index) = open.get(&event.step_id) {
                        spans[index].2 = offset;
                    }
                }
                StepStatus::Pending => {}
            }
        }

        spans.sort_by_key(|(_, start, _)| *start);

        for (step_id, start, end) in spans {
            if end > start {
                let start_pos = (start as f64 * scale) as usize;
                let width = ((end - start) as f64 * scale).max(1.0) as usize;

                let mut bar = " ".repeat(start_pos);
                bar.push_str(&"#".repeat(width));

                output.push_str(&format!(
                    "{:12} |{:width$}| ({})\n",
                    truncate(&step_id, 12),
                    bar,
                    format_duration(Duration::milliseconds(end - start)),
                    width = CHART_WIDTH as usize
                ));
            }
        }

        output.push_str(&format!("\nTotal: {}\n", format_duration(total)));
        output
    }
}

/// Formats a duration for reports: `850 ms`, `12.5s`, `4m 05s`, `3h 20m`.
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.num_milliseconds();
    if ms < 1000 {
        format!("{} ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else if ms < 3_600_000 {
        let secs = ms / 1000;
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        let mins = ms / 60_000;
        format!("{}h {:02}m", mins / 60, mins % 60)
    }
}

/// Pads or truncates a label to exactly `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
