//! File-backed access to a specification directory and its task list.
//!
//! The task list's checkboxes are the only durable progress record: every
//! query reparses the file, and `mark_complete` rewrites it in place.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::checklist::{MatchKind, ParseMode, mark_complete, parse_checklist};
use crate::core::types::{Progress, Section, Task, flatten};
use crate::error::SpecError;

pub const DEFAULT_SPECS_ROOT: &str = ".kiro/specs";
pub const DEFAULT_TASKS_FILE: &str = "tasks.md";

/// Resolve a specification name to its directory.
///
/// Tried in order: an absolute path, a path relative to `cwd` (a file resolves
/// to its parent directory), then the extension-stripped basename matched
/// against the subdirectories of `specs_root` (exact, case-insensitive,
/// substring).
#[instrument(skip_all, fields(name = ?name))]
pub fn resolve_spec_location(name: Option<&str>, cwd: &Path, specs_root: &Path) -> Result<PathBuf> {
    let name = name.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
        SpecError::InvalidInput("a specification name or path is required".to_string())
    })?;

    let as_path = Path::new(name);
    if as_path.is_absolute() {
        if let Some(dir) = existing_dir_for(as_path) {
            debug!(dir = %dir.display(), "resolved absolute path");
            return Ok(dir);
        }
    } else if let Some(dir) = existing_dir_for(&cwd.join(as_path)) {
        debug!(dir = %dir.display(), "resolved relative path");
        return Ok(dir);
    }

    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    let root = if specs_root.is_absolute() {
        specs_root.to_path_buf()
    } else {
        cwd.join(specs_root)
    };
    let candidates = list_spec_dirs(&root)?;
    let picked = fuzzy_match(name, &stem, &candidates)?;
    let dir = root.join(picked);
    debug!(dir = %dir.display(), "resolved by name");
    Ok(dir)
}

fn existing_dir_for(path: &Path) -> Option<PathBuf> {
    if path.is_dir() {
        return Some(path.to_path_buf());
    }
    if path.is_file() {
        return path.parent().map(Path::to_path_buf);
    }
    None
}

fn list_spec_dirs(root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        debug!(root = %root.display(), "specs root missing");
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("list {}", root.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", root.display()))?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn fuzzy_match<'a>(name: &str, stem: &str, candidates: &'a [String]) -> Result<&'a str> {
    if let Some(exact) = candidates.iter().find(|c| c.as_str() == stem) {
        return Ok(exact);
    }

    let lowered = stem.to_lowercase();
    let pick = |matches: Vec<&'a String>| -> Result<Option<&'a str>> {
        match matches.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(only.as_str())),
            many => Err(SpecError::AmbiguousMatch {
                name: name.to_string(),
                candidates: many.iter().map(|c| c.to_string()).collect(),
            }
            .into()),
        }
    };

    let insensitive = candidates
        .iter()
        .filter(|c| c.to_lowercase() == lowered)
        .collect();
    if let Some(found) = pick(insensitive)? {
        return Ok(found);
    }

    let containing = candidates
        .iter()
        .filter(|c| c.to_lowercase().contains(&lowered))
        .collect();
    if let Some(found) = pick(containing)? {
        return Ok(found);
    }

    Err(SpecError::NotFound(name.to_string()).into())
}

/// A resolved specification directory and its task list document.
#[derive(Debug, Clone)]
pub struct SpecDocument {
    dir: PathBuf,
    tasks_path: PathBuf,
    mode: ParseMode,
    title_fallback: bool,
}

impl SpecDocument {
    pub fn new(dir: impl Into<PathBuf>, tasks_file: &str) -> Self {
        let dir = dir.into();
        Self {
            tasks_path: dir.join(tasks_file),
            dir,
            mode: ParseMode::Lenient,
            title_fallback: true,
        }
    }

    pub fn with_parse_mode(mut self, mode: ParseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_title_fallback(mut self, enabled: bool) -> Self {
        self.title_fallback = enabled;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tasks_path(&self) -> &Path {
        &self.tasks_path
    }

    /// Directory name, used as the human-facing spec name.
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.dir.display().to_string())
    }

    pub fn sections(&self) -> Result<Vec<Section>> {
        let contents = self.read()?;
        let sections = parse_checklist(&contents, self.mode)
            .with_context(|| format!("parse {}", self.tasks_path.display()))?;
        debug!(sections = sections.len(), "parsed task list");
        Ok(sections)
    }

    pub fn list_all(&self) -> Result<Vec<Task>> {
        Ok(flatten(&self.sections()?))
    }

    pub fn next_incomplete(&self) -> Result<Option<Task>> {
        Ok(self.list_all()?.into_iter().find(|t| !t.completed))
    }

    /// First task (document order) whose id equals `id`.
    pub fn lookup(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.list_all()?.into_iter().find(|t| t.id == id))
    }

    pub fn incomplete(&self) -> Result<Vec<Task>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|t| !t.completed)
            .collect())
    }

    pub fn progress(&self) -> Result<Progress> {
        let tasks = self.list_all()?;
        let completed = tasks.iter().filter(|t| t.completed).count();
        Ok(Progress::new(completed, tasks.len()))
    }

    /// Check the box of the first unchecked task matching `id` and rewrite the file.
    #[instrument(skip_all, fields(task_id = id))]
    pub fn mark_complete(&self, id: &str) -> Result<()> {
        let contents = self.read()?;
        let edit = mark_complete(&contents, id, self.title_fallback)?;
        if edit.matched_by == MatchKind::TitleContains {
            warn!(
                line = edit.line,
                "no task has this exact id; matched by title substring"
            );
        }
        write_atomic(&self.tasks_path, &edit.contents)?;
        info!(line = edit.line, "task marked complete");
        Ok(())
    }

    fn read(&self) -> Result<String> {
        fs::read_to_string(&self.tasks_path)
            .with_context(|| format!("read {}", self.tasks_path.display()))
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("md.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp task list {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
