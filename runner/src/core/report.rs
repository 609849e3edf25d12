//! In-memory progress report and its markdown rendering.
//!
//! The reporter owns one [`CommentState`] per run. All transitions take the
//! current time as an argument so rendering is reproducible in tests.

use chrono::{DateTime, TimeDelta, Utc};

use crate::core::types::{MAX_ATTEMPTS, OverallStatus, Progress, Task, TaskStatus};

/// Per-task mirror of run progress, keyed by task id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProgress {
    pub task_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// 1-based attempt counter.
    pub attempt: u32,
    pub completed_on_attempt: Option<u32>,
}

/// Aggregate report state for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentState {
    pub spec_name: String,
    pub tasks: Vec<TaskProgress>,
    pub overall_status: OverallStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl CommentState {
    /// Seed one entry per task; tasks already checked in the document start completed.
    pub fn new(spec_name: &str, tasks: &[Task], now: DateTime<Utc>) -> Self {
        Self {
            spec_name: spec_name.to_string(),
            tasks: tasks
                .iter()
                .map(|task| TaskProgress {
                    task_id: task.id.clone(),
                    title: task.title.clone(),
                    status: if task.completed {
                        TaskStatus::Completed
                    } else {
                        TaskStatus::Pending
                    },
                    start_time: None,
                    end_time: None,
                    attempt: 1,
                    completed_on_attempt: None,
                })
                .collect(),
            overall_status: OverallStatus::Running,
            start_time: now,
            end_time: None,
        }
    }

    /// Apply a task transition. Returns `false` when the id is unknown.
    ///
    /// Unnumbered tasks can share an id, so an entry that is not yet
    /// completed is preferred over an earlier completed one.
    pub fn set_task_status(
        &mut self,
        task_id: &str,
        status: TaskStatus,
        attempt: Option<u32>,
        now: DateTime<Utc>,
    ) -> bool {
        let position = self
            .tasks
            .iter()
            .position(|t| t.task_id == task_id && t.status != TaskStatus::Completed)
            .or_else(|| self.tasks.iter().position(|t| t.task_id == task_id));
        let Some(task) = position.map(|idx| &mut self.tasks[idx]) else {
            return false;
        };
        if let Some(attempt) = attempt {
            task.attempt = attempt;
        }
        task.status = status;
        match status {
            TaskStatus::Working => {
                task.start_time.get_or_insert(now);
            }
            TaskStatus::Completed => {
                task.end_time.get_or_insert(now);
                task.completed_on_attempt = Some(task.attempt);
            }
            TaskStatus::Failed => {
                task.end_time.get_or_insert(now);
            }
            TaskStatus::Pending | TaskStatus::Testing => {}
        }
        true
    }

    pub fn set_overall_status(&mut self, status: OverallStatus, now: DateTime<Utc>) {
        self.overall_status = status;
        if status != OverallStatus::Running {
            self.end_time.get_or_insert(now);
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskProgress> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn completed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    /// `(first-attempt successes, tasks completed during this run)`.
    pub fn first_attempt_stats(&self) -> (usize, usize) {
        let finished: Vec<u32> = self
            .tasks
            .iter()
            .filter_map(|t| t.completed_on_attempt)
            .collect();
        let first = finished.iter().filter(|&&a| a == 1).count();
        (first, finished.len())
    }
}

/// Render the full report body.
pub fn render_report(state: &CommentState, now: DateTime<Utc>) -> String {
    let mut buf = String::new();
    let (glyph, label) = overall_glyph(state.overall_status);

    buf.push_str(&format!("## {glyph} Spec run: `{}`\n\n", state.spec_name));
    buf.push_str(&format!("**Status:** {glyph} {label}\n\n"));

    buf.push_str("### Tasks\n\n");
    if state.tasks.is_empty() {
        buf.push_str("_No tasks found in the task list._\n");
    }
    for task in &state.tasks {
        buf.push_str(&render_task_line(task, now));
        buf.push('\n');
    }

    let total = state.tasks.len();
    let completed = state.completed_count();
    buf.push_str("\n### Summary\n\n");
    buf.push_str(&format!(
        "- **Completed:** {completed}/{total} ({}%)\n",
        percent(completed, total)
    ));
    let (first, finished) = state.first_attempt_stats();
    if finished > 0 {
        buf.push_str(&format!(
            "- **First-attempt success:** {first}/{finished} ({}%)\n",
            percent(first, finished)
        ));
    }
    let run_end = state.end_time.unwrap_or(now);
    buf.push_str(&format!(
        "- **Elapsed:** {}\n",
        format_duration(run_end - state.start_time)
    ));

    buf.push_str("\n---\n");
    buf.push_str(closing_note(state.overall_status));
    buf.push('\n');
    buf
}

fn render_task_line(task: &TaskProgress, now: DateTime<Utc>) -> String {
    let mut notes: Vec<String> = Vec::new();
    match task.status {
        TaskStatus::Pending => {}
        TaskStatus::Working | TaskStatus::Testing => {
            notes.push(format!(
                "{}, attempt {}/{MAX_ATTEMPTS}",
                task.status.as_str(),
                task.attempt
            ));
        }
        TaskStatus::Completed => match task.completed_on_attempt {
            Some(1) => {}
            Some(n) => notes.push(format!("completed on attempt {n}")),
            None => notes.push("already complete".to_string()),
        },
        TaskStatus::Failed => notes.push(format!("failed after {} attempts", task.attempt)),
    }
    if let Some(start) = task.start_time {
        let end = task.end_time.unwrap_or(now);
        notes.push(format_duration(end - start));
    }

    let glyph = task_glyph(task.status);
    if notes.is_empty() {
        format!("- {glyph} {}", task.title)
    } else {
        format!("- {glyph} {} _({})_", task.title, notes.join(", "))
    }
}

fn overall_glyph(status: OverallStatus) -> (&'static str, &'static str) {
    match status {
        OverallStatus::Running => ("🔄", "Running"),
        OverallStatus::Completed => ("✅", "Completed"),
        OverallStatus::Failed => ("❌", "Failed"),
    }
}

fn task_glyph(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "⏳",
        TaskStatus::Working => "🔨",
        TaskStatus::Testing => "🧪",
        TaskStatus::Completed => "✅",
        TaskStatus::Failed => "❌",
    }
}

fn closing_note(status: OverallStatus) -> &'static str {
    match status {
        OverallStatus::Running => "_This comment is updated automatically while tasks run._",
        OverallStatus::Completed => "_All tasks completed._",
        OverallStatus::Failed => {
            "_Run stopped on a failed task. Completed tasks stay checked in the task list; re-run to resume._"
        }
    }
}

fn percent(part: usize, whole: usize) -> u32 {
    Progress::new(part, whole).percentage
}

/// `1h 2m 3s`, `4m 5s`, `6s`.
pub fn format_duration(delta: TimeDelta) -> String {
    let secs = delta.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).expect("valid timestamp")
    }

    fn task(id: &str, completed: bool) -> Task {
        Task {
            id: id.to_string(),
            title: format!("{id}. Task {id}"),
            description: String::new(),
            completed,
            requirements: Vec::new(),
            subtasks: Vec::new(),
        }
    }

    #[test]
    fn seeds_status_from_document_checkboxes() {
        let state = CommentState::new("demo", &[task("1", true), task("2", false)], at(0));
        assert_eq!(state.tasks[0].status, TaskStatus::Completed);
        assert_eq!(state.tasks[1].status, TaskStatus::Pending);
        assert!(state.tasks.iter().all(|t| t.attempt == 1));
        assert_eq!(state.overall_status, OverallStatus::Running);
    }

    #[test]
    fn working_stamps_start_only_once() {
        let mut state = CommentState::new("demo", &[task("1", false)], at(0));
        state.set_task_status("1", TaskStatus::Working, Some(1), at(10));
        state.set_task_status("1", TaskStatus::Testing, None, at(20));
        state.set_task_status("1", TaskStatus::Working, Some(2), at(30));

        let progress = state.task("1").expect("task");
        assert_eq!(progress.start_time, Some(at(10)));
        assert_eq!(progress.attempt, 2);
    }

    #[test]
    fn completion_snapshots_attempt_and_end_time() {
        let mut state = CommentState::new("demo", &[task("1", false)], at(0));
        state.set_task_status("1", TaskStatus::Working, Some(3), at(5));
        state.set_task_status("1", TaskStatus::Completed, None, at(65));

        let progress = state.task("1").expect("task");
        assert_eq!(progress.completed_on_attempt, Some(3));
        assert_eq!(progress.end_time, Some(at(65)));
    }

    #[test]
    fn unknown_task_id_is_ignored() {
        let mut state = CommentState::new("demo", &[task("1", false)], at(0));
        let before = state.clone();
        assert!(!state.set_task_status("nope", TaskStatus::Failed, None, at(1)));
        assert_eq!(state, before);
    }

    #[test]
    fn overall_end_time_is_stamped_once() {
        let mut state = CommentState::new("demo", &[], at(0));
        state.set_overall_status(OverallStatus::Failed, at(10));
        state.set_overall_status(OverallStatus::Failed, at(20));
        assert_eq!(state.end_time, Some(at(10)));
    }

    #[test]
    fn renders_statuses_counters_and_closing_note() {
        let mut state = CommentState::new(
            "auth-flow",
            &[task("1", true), task("2", false), task("3", false), task("4", false)],
            at(0),
        );
        state.set_task_status("2", TaskStatus::Working, Some(1), at(0));
        state.set_task_status("2", TaskStatus::Completed, None, at(90));
        state.set_task_status("3", TaskStatus::Working, Some(1), at(90));
        state.set_task_status("3", TaskStatus::Working, Some(2), at(100));
        state.set_task_status("3", TaskStatus::Completed, None, at(200));
        state.set_task_status("4", TaskStatus::Working, Some(3), at(200));
        state.set_task_status("4", TaskStatus::Failed, None, at(3_861));
        state.set_overall_status(OverallStatus::Failed, at(3_861));

        let body = render_report(&state, at(9_999));

        assert!(body.starts_with("## ❌ Spec run: `auth-flow`\n"));
        assert!(body.contains("**Status:** ❌ Failed"));
        assert!(body.contains("- ✅ 1. Task 1 _(already complete)_\n"));
        assert!(body.contains("- ✅ 2. Task 2 _(1m 30s)_\n"));
        assert!(body.contains("- ✅ 3. Task 3 _(completed on attempt 2, 1m 50s)_\n"));
        assert!(body.contains("- ❌ 4. Task 4 _(failed after 3 attempts, 1h 1m 1s)_\n"));
        assert!(body.contains("- **Completed:** 3/4 (75%)\n"));
        assert!(body.contains("- **First-attempt success:** 1/2 (50%)\n"));
        assert!(body.contains("- **Elapsed:** 1h 4m 21s\n"));
        assert!(body.trim_end().ends_with("re-run to resume._"));
    }

    #[test]
    fn running_report_shows_live_attempt() {
        let mut state = CommentState::new("demo", &[task("1", false)], at(0));
        state.set_task_status("1", TaskStatus::Testing, Some(2), at(0));
        let body = render_report(&state, at(42));
        assert!(body.contains("- 🧪 1. Task 1 _(testing, attempt 2/3)_"));
        assert!(!body.contains("First-attempt success"));
        assert!(body.contains("- **Elapsed:** 42s\n"));
    }

    #[test]
    fn repeated_id_updates_the_unfinished_entry() {
        let mut first = task("Add", true);
        first.title = "Add parser".to_string();
        let mut second = task("Add", false);
        second.title = "Add CLI".to_string();
        let mut state = CommentState::new("demo", &[first, second], at(0));

        state.set_task_status("Add", TaskStatus::Working, Some(1), at(5));
        state.set_task_status("Add", TaskStatus::Completed, None, at(9));

        assert_eq!(state.tasks[0].completed_on_attempt, None);
        assert_eq!(state.tasks[0].start_time, None);
        assert_eq!(state.tasks[1].status, TaskStatus::Completed);
        assert_eq!(state.tasks[1].completed_on_attempt, Some(1));
        assert_eq!(state.completed_count(), 2);
    }
}
