//! Work and verification prompts for a single task.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::types::Task;
use crate::core::verdict::SUCCESS_MARKER;
use crate::error::SpecError;
use crate::io::spec_store::SpecDocument;

const WORK_TEMPLATE: &str = include_str!("prompts/work.md");
const VERIFY_TEMPLATE: &str = include_str!("prompts/verify.md");

/// Which half of an attempt a prompt drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Work,
    Verify,
}

impl PromptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptKind::Work => "work",
            PromptKind::Verify => "verify",
        }
    }
}

/// Renders task prompts from the bundled templates.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("work", WORK_TEMPLATE)
            .context("load work template")?;
        env.add_template("verify", VERIFY_TEMPLATE)
            .context("load verify template")?;
        Ok(Self { env })
    }

    /// Directive to carry out exactly one task and stop.
    ///
    /// Fails with `TaskNotFound` when `task_id` is not in the document.
    pub fn build_work_prompt(
        &self,
        spec: &SpecDocument,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let task = find_task(spec, task_id)?;
        self.render_work_prompt(spec, &task, now)
    }

    /// Work prompt for a task already in hand. Ids are not unique when tasks
    /// are unnumbered, so the run loop renders from the parsed task itself.
    pub fn render_work_prompt(
        &self,
        spec: &SpecDocument,
        task: &Task,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let rendered = self
            .env
            .get_template("work")?
            .render(context! {
                spec_name => spec.name(),
                spec_dir => spec.dir().display().to_string(),
                documents => spec_documents(spec.dir())?,
                task => task,
                timestamp => now.to_rfc3339_opts(SecondsFormat::Secs, true),
            })
            .context("render work prompt")?;
        debug!(task_id = %task.id, bytes = rendered.len(), "built work prompt");
        Ok(rendered)
    }

    /// Directive to judge the finished task and emit the success marker only
    /// if it is genuinely done.
    pub fn build_verification_prompt(&self, spec: &SpecDocument, task_id: &str) -> Result<String> {
        let task = find_task(spec, task_id)?;
        self.render_verification_prompt(spec, &task)
    }

    pub fn render_verification_prompt(&self, spec: &SpecDocument, task: &Task) -> Result<String> {
        let rendered = self
            .env
            .get_template("verify")?
            .render(context! {
                spec_name => spec.name(),
                spec_dir => spec.dir().display().to_string(),
                documents => spec_documents(spec.dir())?,
                task => task,
                marker => SUCCESS_MARKER,
            })
            .context("render verification prompt")?;
        debug!(task_id = %task.id, bytes = rendered.len(), "built verification prompt");
        Ok(rendered)
    }
}

fn find_task(spec: &SpecDocument, task_id: &str) -> Result<Task> {
    spec.lookup(task_id)?
        .ok_or_else(|| anyhow::Error::new(SpecError::TaskNotFound(task_id.to_string())))
}

/// Markdown files in the spec directory, sorted by name.
fn spec_documents(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read dir entry in {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Write `text` to `<staging>/prompts/<kind>-task-<id>.md` and return the path.
pub fn stage_prompt(staging: &Path, kind: PromptKind, task_id: &str, text: &str) -> Result<PathBuf> {
    let dir = staging.join("prompts");
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(format!("{}-task-{}.md", kind.as_str(), file_safe(task_id)));
    fs::write(&path, text).with_context(|| format!("write prompt {}", path.display()))?;
    debug!(path = %path.display(), "staged prompt");
    Ok(path)
}

/// Raw agent log location for one prompt.
pub fn raw_log_path(staging: &Path, kind: PromptKind, task_id: &str) -> PathBuf {
    staging
        .join("logs")
        .join(format!("{}-task-{}.log", kind.as_str(), file_safe(task_id)))
}

fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
