//! One task's bounded work/verify/retry cycle.
//!
//! Every attempt ends in exactly one revision-control call: a commit when the
//! verification marker was seen, a hard rollback otherwise. Collaborator
//! errors inside an attempt are converted into a rollback-and-retry.

use anyhow::{Context, Result};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::types::{MAX_ATTEMPTS, Task, TaskStatus};
use crate::core::verdict::{ExactMarker, SuccessSignal};
use crate::io::agent::{AgentRequest, AgentRunner, AgentTranscript};
use crate::io::comment::CommentTarget;
use crate::io::git::RevisionControl;
use crate::io::prompt::{PromptBuilder, PromptKind, raw_log_path, stage_prompt};
use crate::io::spec_store::SpecDocument;
use crate::looping::RunSettings;
use crate::reporter::ProgressReporter;

/// How a task's attempt loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResult {
    Completed { attempt: u32 },
    Failed { attempts: u32 },
}

/// The working tree could not be restored after a failed attempt.
///
/// Fatal: the next attempt would not start from a clean baseline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rollback failed after attempt {attempt} of task {task_id}")]
pub struct RollbackFailedError {
    pub task_id: String,
    pub attempt: u32,
}

/// Collaborators shared by every task of a run.
pub struct TaskCycle<'a, A, R, C> {
    pub settings: &'a RunSettings,
    pub agent: &'a A,
    pub vcs: &'a R,
    pub reporter: &'a ProgressReporter<C>,
    pub prompts: &'a PromptBuilder,
    /// Push target; `None` commits locally only.
    pub branch: Option<&'a str>,
    pub signal: ExactMarker,
}

enum Verdict {
    Verified,
    Rejected,
}

impl<A: AgentRunner, R: RevisionControl, C: CommentTarget> TaskCycle<'_, A, R, C> {
    /// Drive `task` through up to [`MAX_ATTEMPTS`] attempts.
    ///
    /// Returns `Failed` when the cap is exhausted; the caller decides what
    /// that means for the run. Errors only when a rollback fails.
    #[instrument(skip_all, fields(task_id = %task.id))]
    pub fn run_task(&self, spec: &SpecDocument, task: &Task) -> Result<TaskResult> {
        info!(title = %task.title, "Working on task {}", task.id);

        let baseline = format!("Before starting task: {}", task.title);
        if let Err(err) = self.vcs.commit_and_push(&baseline, self.branch) {
            warn!(err = %format!("{err:#}"), "could not commit pre-existing changes");
        }

        for attempt in 1..=MAX_ATTEMPTS {
            self.reporter
                .set_task_status(&task.id, TaskStatus::Working, Some(attempt));
            self.reporter.publish();
            info!(attempt, max_attempts = MAX_ATTEMPTS, "attempt started");

            match self.attempt(spec, task, attempt) {
                Ok(Verdict::Verified) => {
                    let message = format!("Complete task: {}", task.title);
                    match self.vcs.commit_and_push(&message, self.branch) {
                        Ok(_) => {
                            self.reporter.set_task_status(
                                &task.id,
                                TaskStatus::Completed,
                                Some(attempt),
                            );
                            self.reporter.publish();
                            info!(attempt, "Task {} verified and committed", task.id);
                            return Ok(TaskResult::Completed { attempt });
                        }
                        Err(err) => warn!(
                            attempt,
                            err = %format!("{err:#}"),
                            "commit after verification failed, rolling back"
                        ),
                    }
                }
                Ok(Verdict::Rejected) => {
                    info!(attempt, "Verification failed, rolling back");
                }
                Err(err) => warn!(
                    attempt,
                    err = %format!("{err:#}"),
                    "attempt errored, rolling back"
                ),
            }

            self.vcs.rollback().with_context(|| RollbackFailedError {
                task_id: task.id.clone(),
                attempt,
            })?;
        }

        warn!(attempts = MAX_ATTEMPTS, "Task {} failed after all attempts", task.id);
        Ok(TaskResult::Failed {
            attempts: MAX_ATTEMPTS,
        })
    }

    fn attempt(&self, spec: &SpecDocument, task: &Task, attempt: u32) -> Result<Verdict> {
        let work = self.prompts.render_work_prompt(spec, task, Utc::now())?;
        self.run_agent(PromptKind::Work, &task.id, &work)
            .context("work phase")?;

        self.reporter
            .set_task_status(&task.id, TaskStatus::Testing, Some(attempt));
        self.reporter.publish();

        let verify = self.prompts.render_verification_prompt(spec, task)?;
        let transcript = self
            .run_agent(PromptKind::Verify, &task.id, &verify)
            .context("verification phase")?;

        if transcript.watch_seen || self.signal.is_success(&transcript.output) {
            Ok(Verdict::Verified)
        } else {
            Ok(Verdict::Rejected)
        }
    }

    fn run_agent(&self, kind: PromptKind, task_id: &str, prompt: &str) -> Result<AgentTranscript> {
        let staging = &self.settings.staging_dir;
        let prompt_path = stage_prompt(staging, kind, task_id, prompt)?;
        let request = AgentRequest {
            kind,
            task_id: task_id.to_string(),
            workdir: self.settings.workdir.clone(),
            prompt_path,
            log_path: self
                .settings
                .raw_log
                .then(|| raw_log_path(staging, kind, task_id)),
            timeout: self.settings.agent_timeout,
            output_limit_bytes: self.settings.output_limit_bytes,
            watch: (kind == PromptKind::Verify).then(|| self.signal.marker().to_string()),
        };
        self.agent.run(&request)
    }
}
