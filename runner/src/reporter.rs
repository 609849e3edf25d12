//! Progress reporter: owns the run's [`CommentState`] and mirrors it to the
//! PR comment.
//!
//! The attempt loop is the only writer, through the transition methods. The
//! optional periodic publisher only renders and sends; it never mutates state.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::core::report::{CommentState, render_report};
use crate::core::types::{OverallStatus, Task, TaskStatus};
use crate::io::comment::CommentTarget;
use crate::io::pr_context::PrContext;

struct Shared<C> {
    state: Mutex<CommentState>,
    /// Serializes publishes so a periodic refresh cannot interleave with the
    /// final report.
    publish_lock: Mutex<()>,
    target: C,
    context: PrContext,
}

/// Handle to the run's progress report.
pub struct ProgressReporter<C> {
    shared: Arc<Shared<C>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: CommentTarget> ProgressReporter<C> {
    /// Seed progress from `tasks` and publish the initial report when enabled.
    pub fn create(context: PrContext, spec_name: &str, tasks: &[Task], target: C) -> Self {
        let reporter = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CommentState::new(spec_name, tasks, Utc::now())),
                publish_lock: Mutex::new(()),
                target,
                context,
            }),
        };
        if reporter.shared.context.is_enabled() {
            reporter.publish();
        }
        reporter
    }

    /// Unknown ids are ignored with a debug log.
    pub fn set_task_status(&self, task_id: &str, status: TaskStatus, attempt: Option<u32>) {
        let known = lock(&self.shared.state).set_task_status(task_id, status, attempt, Utc::now());
        if !known {
            debug!(task_id, "status update for unknown task ignored");
        }
    }

    pub fn set_overall_status(&self, status: OverallStatus) {
        lock(&self.shared.state).set_overall_status(status, Utc::now());
    }

    pub fn snapshot(&self) -> CommentState {
        lock(&self.shared.state).clone()
    }

    /// Send the rendered report. Never fails: errors are logged and dropped.
    pub fn publish(&self) {
        publish_shared(&self.shared, false);
    }
}

impl<C: CommentTarget + Send + Sync + 'static> ProgressReporter<C> {
    /// Republish every `interval` while the run is still `running`.
    pub fn start_periodic(&self, interval: Duration) -> PeriodicPublisher {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let handle = thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !publish_shared(&shared, true) {
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("periodic publisher stopped");
        });
        debug!(interval_secs = interval.as_secs(), "periodic publisher started");
        PeriodicPublisher {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

/// Render and send under the publish lock. With `only_while_running`, skips
/// the send once the run has concluded and returns `false`.
fn publish_shared<C: CommentTarget>(shared: &Shared<C>, only_while_running: bool) -> bool {
    let Some(comment_id) = shared.context.comment_id() else {
        debug!("reporting disabled, skipping publish");
        return !only_while_running;
    };
    let _publishing = lock(&shared.publish_lock);
    let (body, running) = {
        let state = lock(&shared.state);
        (
            render_report(&state, Utc::now()),
            state.overall_status == OverallStatus::Running,
        )
    };
    if only_while_running && !running {
        return false;
    }
    match shared.target.update_comment(comment_id, &body) {
        Ok(()) => debug!(comment_id, "progress comment published"),
        Err(err) => warn!(
            comment_id,
            err = %format!("{err:#}"),
            "failed to publish progress comment"
        ),
    }
    true
}

/// Background republisher. Stopped explicitly or on drop.
pub struct PeriodicPublisher {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicPublisher {
    /// Signal the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("periodic publisher panicked");
        }
    }
}

impl Drop for PeriodicPublisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pr_context::PrInputs;
    use crate::test_support::RecordingComments;

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

    fn enabled(comment_id: Option<&str>) -> PrContext {
        PrContext::resolve(&PrInputs {
            pr_mode: true,
            number: Some(5),
            branch: Some("work".to_string()),
            comment_id: comment_id.map(str::to_string),
        })
    }

    #[test]
    fn create_publishes_initial_report_when_enabled() {
        let comments = Arc::new(RecordingComments::default());
        let reporter = ProgressReporter::create(
            enabled(Some("77")),
            "feature",
            &[task("1", true), task("2", false)],
            Arc::clone(&comments),
        );

        let updates = comments.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "77");
        assert!(updates[0].1.contains("`feature`"));
        let state = reporter.snapshot();
        assert_eq!(state.tasks[0].status, TaskStatus::Completed);
        assert_eq!(state.tasks[1].status, TaskStatus::Pending);
    }

    #[test]
    fn disabled_or_untargeted_context_never_publishes() {
        for context in [PrContext::disabled(), enabled(None)] {
            let comments = Arc::new(RecordingComments::default());
            let reporter = ProgressReporter::create(
                context,
                "feature",
                &[task("1", false)],
                Arc::clone(&comments),
            );
            reporter.set_task_status("1", TaskStatus::Working, Some(1));
            reporter.publish();
            assert!(comments.updates().is_empty());
        }
    }

    #[test]
    fn publish_failure_is_swallowed() {
        let comments = Arc::new(RecordingComments::failing());
        let reporter = ProgressReporter::create(
            enabled(Some("1")),
            "feature",
            &[task("1", false)],
            Arc::clone(&comments),
        );
        reporter.publish();
        assert_eq!(comments.attempts(), 2);
    }

    #[test]
    fn unknown_task_is_ignored() {
        let reporter = ProgressReporter::create(
            PrContext::disabled(),
            "feature",
            &[task("1", false)],
            RecordingComments::default(),
        );
        reporter.set_task_status("nope", TaskStatus::Failed, Some(3));
        assert_eq!(reporter.snapshot().tasks[0].status, TaskStatus::Pending);
    }

    #[test]
    fn periodic_publisher_stops_after_run_concludes() {
        let comments = Arc::new(RecordingComments::default());
        let reporter = ProgressReporter::create(
            enabled(Some("9")),
            "feature",
            &[task("1", false)],
            Arc::clone(&comments),
        );
        let periodic = reporter.start_periodic(Duration::from_millis(10));
        thread::sleep(Duration::from_millis(80));
        reporter.set_overall_status(OverallStatus::Completed);
        periodic.stop();
        let before_final = comments.updates().len();
        assert!(before_final >= 2, "expected periodic refreshes, got {before_final}");

        reporter.publish();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(comments.updates().len(), before_final + 1);
        let last = comments.updates().pop().expect("final update");
        assert!(last.1.contains("**Status:** ✅ Completed"));
    }
}
