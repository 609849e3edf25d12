//! Git adapter for the revision control gateway.
//!
//! Each attempt is bracketed by exactly one of `commit_and_push` or
//! `rollback`, so we keep a small, explicit wrapper around `git` subprocess
//! calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

/// Commit/push and hard rollback of the working tree.
pub trait RevisionControl {
    /// Stage everything and commit it. Pushes to `branch` when one is given
    /// and a commit was made. Returns whether a commit was created; a failed
    /// push after a successful commit is logged, not returned.
    fn commit_and_push(&self, message: &str, branch: Option<&str>) -> Result<bool>;

    /// Discard every uncommitted change, untracked files included.
    fn rollback(&self) -> Result<()>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Push HEAD to `origin/<branch>`.
    #[instrument(skip_all, fields(branch))]
    pub fn push(&self, branch: &str) -> Result<()> {
        let refspec = format!("HEAD:{branch}");
        self.run_checked(&["push", "origin", &refspec])?;
        Ok(())
    }

    /// Reset tracked files to HEAD and delete untracked files.
    #[instrument(skip_all)]
    pub fn reset_hard(&self) -> Result<()> {
        self.run_checked(&["reset", "--hard", "HEAD"])?;
        self.run_checked(&["clean", "-fd"])?;
        Ok(())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl RevisionControl for Git {
    #[instrument(skip_all, fields(push = branch.is_some()))]
    fn commit_and_push(&self, message: &str, branch: Option<&str>) -> Result<bool> {
        self.add_all()?;
        let committed = self.commit_staged(message)?;
        if !committed {
            return Ok(false);
        }
        info!(commit_message = message, "committed");
        // The commit already exists locally; a later push of HEAD carries it.
        if let Some(branch) = branch {
            match self.push(branch) {
                Ok(()) => info!(branch, "pushed"),
                Err(err) => warn!(
                    branch,
                    err = %format!("{err:#}"),
                    "push failed, keeping local commit"
                ),
            }
        }
        Ok(true)
    }

    fn rollback(&self) -> Result<()> {
        self.reset_hard()?;
        info!("working tree rolled back to last commit");
        Ok(())
    }
}
