//! Checklist document parsing and checkbox rewriting.
//!
//! Document shape:
//!
//! ```text
//! ## Section title
//!
//! - [ ] 1. Task title
//!   Free text becomes the description.
//!   - bullet lines become subtasks
//!   - _Requirements: 1.1, 1.2_
//! - [x] 2. Finished task
//! ```
//!
//! Task lines are recognised only at column 0. Everything here is pure: the
//! caller owns reading and writing the file.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{Section, Task};
use crate::error::SpecError;

static TASK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^- \[([ \t]*|x)\]\s+(\S.*?)\s*$").expect("task regex is valid")
});
static NUMBERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\. ").expect("numbered regex is valid"));
static REQUIREMENTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:-\s+)?_Requirements:\s*(.*?)\s*_?$").expect("requirements regex is valid")
});

/// How to treat lines the parser does not recognise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// Skip unknown lines without a diagnostic.
    #[default]
    Lenient,
    /// Fail on the first unknown line.
    Strict,
}

/// How `mark_complete` found the line it flipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The derived id equals the requested id.
    ExactId,
    /// The title contains the requested id (compatibility fallback).
    TitleContains,
}

/// Result of a successful checkbox flip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckboxEdit {
    /// Full rewritten document.
    pub contents: String,
    /// 1-based line number of the flipped checkbox.
    pub line: usize,
    pub matched_by: MatchKind,
}

/// Parse a checklist document into sections in document order.
pub fn parse_checklist(contents: &str, mode: ParseMode) -> Result<Vec<Section>, SpecError> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<Task> = None;

    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(title) = line.strip_prefix("## ") {
            close_task(&mut sections, &mut current);
            sections.push(Section {
                title: title.trim().to_string(),
                tasks: Vec::new(),
            });
            continue;
        }

        if line.starts_with('#') {
            close_task(&mut sections, &mut current);
            continue;
        }

        if let Some(caps) = TASK_RE.captures(line) {
            close_task(&mut sections, &mut current);
            let (id, title) = split_heading(&caps[2]);
            current = Some(Task {
                id,
                title,
                description: String::new(),
                completed: &caps[1] == "x",
                requirements: Vec::new(),
                subtasks: Vec::new(),
            });
            continue;
        }

        let indented = line.starts_with("  ") || line.starts_with('\t');
        match current.as_mut() {
            Some(task) if indented => fold_continuation(task, line.trim()),
            _ => {
                if mode == ParseMode::Strict {
                    return Err(SpecError::Malformed {
                        line: idx + 1,
                        text: line.to_string(),
                    });
                }
            }
        }
    }

    close_task(&mut sections, &mut current);
    Ok(sections)
}

/// Flip the checkbox of the first unchecked task matching `id`.
///
/// An exact derived-id match anywhere in the document wins. When none exists
/// and `title_fallback` is set, the first unchecked task whose title contains
/// `id` is used instead. Every other byte of the document is preserved.
pub fn mark_complete(
    contents: &str,
    id: &str,
    title_fallback: bool,
) -> Result<CheckboxEdit, SpecError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(SpecError::InvalidInput("task id is required".to_string()));
    }

    let lines: Vec<&str> = contents.split_inclusive('\n').collect();
    let unchecked: Vec<(usize, String, String)> = lines
        .iter()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let line = raw.trim_end_matches(['\n', '\r']);
            let caps = TASK_RE.captures(line)?;
            if &caps[1] == "x" {
                return None;
            }
            let (task_id, title) = split_heading(&caps[2]);
            Some((idx, task_id, title))
        })
        .collect();

    let exact = unchecked
        .iter()
        .find(|(_, task_id, _)| task_id == id)
        .map(|(idx, _, _)| (*idx, MatchKind::ExactId));
    let found = exact.or_else(|| {
        if !title_fallback {
            return None;
        }
        unchecked
            .iter()
            .find(|(_, _, title)| title.contains(id))
            .map(|(idx, _, _)| (*idx, MatchKind::TitleContains))
    });
    let Some((target, matched_by)) = found else {
        return Err(SpecError::NotFoundOrAlreadyComplete(id.to_string()));
    };

    let mut out = String::with_capacity(contents.len());
    for (idx, raw) in lines.iter().enumerate() {
        if idx == target {
            out.push_str(&check_box(raw));
        } else {
            out.push_str(raw);
        }
    }

    Ok(CheckboxEdit {
        contents: out,
        line: target + 1,
        matched_by,
    })
}

/// Derive `(id, title)` from the text after the checkbox.
fn split_heading(text: &str) -> (String, String) {
    let title = text.trim().to_string();
    if let Some(caps) = NUMBERED_RE.captures(&title) {
        return (caps[1].to_string(), title);
    }
    let id = title.split_whitespace().next().unwrap_or_default().to_string();
    (id, title)
}

fn fold_continuation(task: &mut Task, trimmed: &str) {
    if let Some(caps) = REQUIREMENTS_RE.captures(trimmed) {
        task.requirements.extend(
            caps[1]
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        return;
    }
    if let Some(rest) = trimmed.strip_prefix("- ")
        && !rest.trim_start().starts_with('_')
    {
        task.subtasks.push(rest.trim().to_string());
        return;
    }
    if !task.description.is_empty() {
        task.description.push('\n');
    }
    task.description.push_str(trimmed);
}

fn close_task(sections: &mut Vec<Section>, current: &mut Option<Task>) {
    let Some(task) = current.take() else {
        return;
    };
    if sections.is_empty() {
        sections.push(Section {
            title: String::new(),
            tasks: Vec::new(),
        });
    }
    if let Some(section) = sections.last_mut() {
        section.tasks.push(task);
    }
}

/// Replace the bracket of a `- [ ]` line with `[x]`, keeping the line ending.
fn check_box(raw: &str) -> String {
    let open = raw.find('[').unwrap_or(0);
    let close = raw[open..].find(']').map(|i| open + i).unwrap_or(open);
    format!("{}[x]{}", &raw[..open], &raw[close + 1..])
}
