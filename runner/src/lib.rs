//! Checklist-driven agent task runner.
//!
//! Reads a spec's `tasks.md`, drives a coding agent through a bounded
//! work/verify/retry cycle per task, commits or rolls back each attempt, and
//! mirrors progress to a pull-request comment.
//!
//! - **[`core`]**: Pure, deterministic logic (checklist parsing, report
//!   model and rendering, success marker). No I/O.
//! - **[`io`]**: Side-effecting collaborators (spec files, agent process,
//!   git, comment API, config).
//!
//! Orchestration modules ([`cycle`], [`looping`], [`reporter`]) tie the two
//! together for the CLI.

pub mod core;
pub mod cycle;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod reporter;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
