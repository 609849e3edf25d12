//! Test-only collaborators: a scripted agent, recording git and comment
//! targets, and a spec fixture on disk.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::verdict::SUCCESS_MARKER;
use crate::io::agent::{AgentRequest, AgentRunner, AgentTranscript};
use crate::io::comment::CommentTarget;
use crate::io::git::RevisionControl;
use crate::io::prompt::PromptKind;
use crate::io::spec_store::{DEFAULT_SPECS_ROOT, DEFAULT_TASKS_FILE, SpecDocument};

/// One scripted agent invocation.
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    /// Return this stdout.
    Output(String),
    /// Fail the invocation with this message.
    Fail(String),
}

impl ScriptedRun {
    pub fn verified() -> Self {
        Self::Output(format!("All acceptance checks pass.\n{SUCCESS_MARKER}\n"))
    }

    pub fn rejected() -> Self {
        Self::Output("The task looks complete to me, but the tests fail.\n".to_string())
    }

    pub fn worked() -> Self {
        Self::Output("Implemented the task.\n".to_string())
    }
}

/// Agent runner that replays a queue of scripted runs and records requests.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    runs: Mutex<VecDeque<ScriptedRun>>,
    requests: Mutex<Vec<AgentRequest>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: Mutex::new(runs.into()),
            requests: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// One work run plus one verification run per entry; `true` verifies.
    pub fn attempts(verdicts: &[bool]) -> Self {
        let runs = verdicts
            .iter()
            .flat_map(|&ok| {
                let verify = if ok {
                    ScriptedRun::verified()
                } else {
                    ScriptedRun::rejected()
                };
                [ScriptedRun::worked(), verify]
            })
            .collect();
        Self::new(runs)
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Prompt file contents as read at each call. Staged prompt files are
    /// overwritten by later tasks sharing an id.
    pub fn prompt_texts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    pub fn calls(&self, kind: PromptKind) -> usize {
        self.requests().iter().filter(|r| r.kind == kind).count()
    }

    pub fn remaining(&self) -> usize {
        self.runs.lock().expect("runs lock").len()
    }
}

impl AgentRunner for ScriptedAgent {
    fn run(&self, request: &AgentRequest) -> Result<AgentTranscript> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let prompt = fs::read_to_string(&request.prompt_path).unwrap_or_default();
        self.prompts.lock().expect("prompts lock").push(prompt);
        let next = self.runs.lock().expect("runs lock").pop_front();
        match next {
            Some(ScriptedRun::Output(output)) => {
                let watch_seen = request
                    .watch
                    .as_deref()
                    .is_some_and(|watch| output.contains(watch));
                Ok(AgentTranscript { output, watch_seen })
            }
            Some(ScriptedRun::Fail(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("scripted agent has no runs left")),
        }
    }
}

/// Revision control double that records every call.
#[derive(Debug, Default)]
pub struct RecordingRevisionControl {
    commits: Mutex<Vec<(String, Option<String>)>>,
    rollbacks: Mutex<u32>,
    /// Commit messages starting with this prefix fail.
    fail_commits_with: Option<String>,
    fail_rollback: bool,
}

impl RecordingRevisionControl {
    pub fn failing_commits(prefix: &str) -> Self {
        Self {
            fail_commits_with: Some(prefix.to_string()),
            ..Self::default()
        }
    }

    pub fn failing_rollback() -> Self {
        Self {
            fail_rollback: true,
            ..Self::default()
        }
    }

    pub fn commit_messages(&self) -> Vec<String> {
        self.commits
            .lock()
            .expect("commits lock")
            .iter()
            .map(|(msg, _)| msg.clone())
            .collect()
    }

    pub fn pushed_branches(&self) -> Vec<Option<String>> {
        self.commits
            .lock()
            .expect("commits lock")
            .iter()
            .map(|(_, branch)| branch.clone())
            .collect()
    }

    pub fn rollbacks(&self) -> u32 {
        *self.rollbacks.lock().expect("rollbacks lock")
    }
}

impl RevisionControl for RecordingRevisionControl {
    fn commit_and_push(&self, message: &str, branch: Option<&str>) -> Result<bool> {
        if let Some(prefix) = &self.fail_commits_with
            && message.starts_with(prefix.as_str())
        {
            return Err(anyhow!("commit rejected: {message}"));
        }
        self.commits
            .lock()
            .expect("commits lock")
            .push((message.to_string(), branch.map(str::to_string)));
        Ok(true)
    }

    fn rollback(&self) -> Result<()> {
        *self.rollbacks.lock().expect("rollbacks lock") += 1;
        if self.fail_rollback {
            return Err(anyhow!("git reset --hard failed"));
        }
        Ok(())
    }
}

/// Comment target that records every update.
#[derive(Debug, Default)]
pub struct RecordingComments {
    updates: Mutex<Vec<(String, String)>>,
    attempts: Mutex<usize>,
    fail: bool,
}

impl RecordingComments {
    /// Every update fails (and is not recorded as delivered).
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Delivered `(comment_id, body)` pairs in order.
    pub fn updates(&self) -> Vec<(String, String)> {
        self.updates.lock().expect("updates lock").clone()
    }

    pub fn last_body(&self) -> Option<String> {
        self.updates().pop().map(|(_, body)| body)
    }

    /// Update calls, failed ones included.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().expect("attempts lock")
    }
}

impl CommentTarget for RecordingComments {
    fn update_comment(&self, comment_id: &str, body: &str) -> Result<()> {
        *self.attempts.lock().expect("attempts lock") += 1;
        if self.fail {
            return Err(anyhow!("502 Bad Gateway"));
        }
        self.updates
            .lock()
            .expect("updates lock")
            .push((comment_id.to_string(), body.to_string()));
        Ok(())
    }
}

/// A working directory with `.kiro/specs/<name>/tasks.md`.
pub struct TestSpec {
    temp: TempDir,
    dir: PathBuf,
}

impl TestSpec {
    pub fn new(name: &str, tasks: &str) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let dir = temp.path().join(DEFAULT_SPECS_ROOT).join(name);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(DEFAULT_TASKS_FILE), tasks)?;
        fs::write(dir.join("requirements.md"), "# Requirements\n")?;
        fs::write(dir.join("design.md"), "# Design\n")?;
        Ok(Self { temp, dir })
    }

    /// Working directory root.
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn document(&self) -> SpecDocument {
        SpecDocument::new(&self.dir, DEFAULT_TASKS_FILE)
    }

    pub fn read_tasks(&self) -> Result<String> {
        Ok(fs::read_to_string(self.dir.join(DEFAULT_TASKS_FILE))?)
    }

    /// Staging directory inside the temp root, outside the spec.
    pub fn staging(&self) -> PathBuf {
        self.temp.path().join("staging")
    }
}
