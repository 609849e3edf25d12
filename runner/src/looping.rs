//! Whole-run loop for `spec-runner run`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, instrument, warn};

use crate::core::report::CommentState;
use crate::core::types::{OverallStatus, TaskStatus};
use crate::core::verdict::ExactMarker;
use crate::cycle::{TaskCycle, TaskResult};
use crate::exit_codes;
use crate::io::agent::AgentRunner;
use crate::io::comment::CommentTarget;
use crate::io::config::RunnerConfig;
use crate::io::git::RevisionControl;
use crate::io::pr_context::PrContext;
use crate::io::prompt::PromptBuilder;
use crate::io::spec_store::SpecDocument;
use crate::reporter::ProgressReporter;

/// Per-run knobs shared by every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Agent working directory (the repository root).
    pub workdir: PathBuf,
    /// Prompt and raw-log staging area, kept outside the working tree.
    pub staging_dir: PathBuf,
    pub agent_timeout: Option<Duration>,
    pub output_limit_bytes: usize,
    pub raw_log: bool,
    pub publish_interval: Option<Duration>,
}

impl RunSettings {
    pub fn new(workdir: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        let defaults = RunnerConfig::default();
        Self {
            workdir: workdir.into(),
            staging_dir: staging_dir.into(),
            agent_timeout: defaults.agent_timeout(),
            output_limit_bytes: defaults.agent_output_limit_bytes,
            raw_log: false,
            publish_interval: defaults.publish_interval(),
        }
    }

    /// Stages under a per-run directory so concurrent runs never share
    /// prompt or log files.
    pub fn from_config(cfg: &RunnerConfig, workdir: &Path, spec_name: &str, raw_log: bool) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            staging_dir: cfg.run_staging_dir(spec_name, std::process::id()),
            agent_timeout: cfg.agent_timeout(),
            output_limit_bytes: cfg.agent_output_limit_bytes,
            raw_log,
            publish_interval: cfg.publish_interval(),
        }
    }
}

/// Reason why `run_spec` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStop {
    /// No incomplete task remains.
    Complete,
    /// A task exhausted its attempts; later tasks were not started.
    TaskFailed {
        id: String,
        title: String,
        attempts: u32,
    },
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub spec_name: String,
    /// Ids completed during this run, in order.
    pub completed: Vec<String>,
    pub stop: RunStop,
    /// Final report state as last published.
    pub report: CommentState,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self.stop {
            RunStop::Complete => exit_codes::OK,
            RunStop::TaskFailed { .. } => exit_codes::TASK_FAILED,
        }
    }
}

/// Run every incomplete task of `spec` in document order.
///
/// Stops at the first task that fails all attempts. Errors only for fatal
/// conditions (unreadable task list, failed rollback); the report is marked
/// failed and published before the error is returned.
#[instrument(skip_all, fields(spec = %spec.name(), pr = context.is_enabled()))]
pub fn run_spec<A, R, C>(
    spec: &SpecDocument,
    context: &PrContext,
    agent: &A,
    vcs: &R,
    comments: C,
    settings: &RunSettings,
) -> Result<RunOutcome>
where
    A: AgentRunner,
    R: RevisionControl,
    C: CommentTarget + Send + Sync + 'static,
{
    let spec_name = spec.name();
    let tasks = spec.list_all()?;
    let progress = spec.progress()?;
    info!(
        completed = progress.completed,
        total = progress.total,
        "Starting run for {spec_name}"
    );

    let reporter = ProgressReporter::create(context.clone(), &spec_name, &tasks, comments);
    let periodic = settings
        .publish_interval
        .filter(|_| context.comment_id().is_some())
        .map(|interval| reporter.start_periodic(interval));

    let mut completed = Vec::new();
    let result = PromptBuilder::new().and_then(|prompts| {
        let cycle = TaskCycle {
            settings,
            agent,
            vcs,
            reporter: &reporter,
            prompts: &prompts,
            branch: context.branch(),
            signal: ExactMarker::default(),
        };
        drive(spec, &cycle, &mut completed)
    });

    if let Some(periodic) = periodic {
        periodic.stop();
    }

    match result {
        Ok(RunStop::Complete) => {
            reporter.set_overall_status(OverallStatus::Completed);
            let message = format!("Mark tasks complete: {spec_name}");
            if let Err(err) = vcs.commit_and_push(&message, context.branch()) {
                warn!(err = %format!("{err:#}"), "could not commit final task list");
            }
            reporter.publish();
            info!(completed = completed.len(), "All tasks complete");
            Ok(RunOutcome {
                spec_name,
                completed,
                stop: RunStop::Complete,
                report: reporter.snapshot(),
            })
        }
        Ok(stop @ RunStop::TaskFailed { .. }) => {
            reporter.set_overall_status(OverallStatus::Failed);
            reporter.publish();
            Ok(RunOutcome {
                spec_name,
                completed,
                stop,
                report: reporter.snapshot(),
            })
        }
        Err(err) => {
            error!(err = %format!("{err:#}"), "run aborted");
            reporter.set_overall_status(OverallStatus::Failed);
            reporter.publish();
            Err(err)
        }
    }
}

fn drive<A, R, C>(
    spec: &SpecDocument,
    cycle: &TaskCycle<'_, A, R, C>,
    completed: &mut Vec<String>,
) -> Result<RunStop>
where
    A: AgentRunner,
    R: RevisionControl,
    C: CommentTarget,
{
    while let Some(task) = spec.next_incomplete()? {
        match cycle.run_task(spec, &task) {
            Ok(TaskResult::Completed { .. }) => {
                spec.mark_complete(&task.id)?;
                completed.push(task.id);
            }
            Ok(TaskResult::Failed { attempts }) => {
                cycle
                    .reporter
                    .set_task_status(&task.id, TaskStatus::Failed, None);
                error!(task_id = %task.id, attempts, "Task failed, stopping run");
                return Ok(RunStop::TaskFailed {
                    id: task.id,
                    title: task.title,
                    attempts,
                });
            }
            Err(err) => {
                cycle
                    .reporter
                    .set_task_status(&task.id, TaskStatus::Failed, None);
                return Err(err);
            }
        }
    }
    Ok(RunStop::Complete)
}
