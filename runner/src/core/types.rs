//! Shared deterministic types for the spec runner core.
//!
//! These types define stable contracts between the parser, the reporter and
//! the orchestration loop. They carry no I/O handles.

use serde::{Deserialize, Serialize};

/// Hard cap on work/verify cycles per task.
pub const MAX_ATTEMPTS: u32 = 3;

/// One checkbox line of the task document plus its continuation lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Numeric prefix without the period, or the first word of the title.
    pub id: String,
    /// Full heading text, numeric prefix included.
    pub title: String,
    /// Free-text continuation lines, newline-joined.
    pub description: String,
    pub completed: bool,
    /// Identifiers from a `_Requirements: a, b_` line.
    pub requirements: Vec<String>,
    /// Indented bullet lines (requirements line excluded).
    pub subtasks: Vec<String>,
}

/// A `## Title` grouping of tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub tasks: Vec<Task>,
}

/// Completion ratio over all tasks in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    /// `round(100 * completed / total)`, 0 when there are no tasks.
    pub percentage: u32,
}

impl Progress {
    pub fn new(completed: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            (100.0 * completed as f64 / total as f64).round() as u32
        };
        Self {
            completed,
            total,
            percentage,
        }
    }
}

/// Per-task status as mirrored in the progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Working,
    Testing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Working => "working",
            TaskStatus::Testing => "testing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// Run-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Running,
    Completed,
    Failed,
}

impl OverallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OverallStatus::Running => "running",
            OverallStatus::Completed => "completed",
            OverallStatus::Failed => "failed",
        }
    }
}

/// Flatten sections into document order.
pub fn flatten(sections: &[Section]) -> Vec<Task> {
    sections
        .iter()
        .flat_map(|section| section.tasks.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_rounds_to_nearest_percent() {
        assert_eq!(Progress::new(1, 3).percentage, 33);
        assert_eq!(Progress::new(2, 3).percentage, 67);
        assert_eq!(Progress::new(3, 3).percentage, 100);
    }

    #[test]
    fn progress_of_empty_document_is_zero() {
        let progress = Progress::new(0, 0);
        assert_eq!(progress.percentage, 0);
        assert_eq!(progress.completed, 0);
    }
}
