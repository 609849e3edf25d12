//! Stable exit codes for `spec-runner` commands.

/// Command succeeded, or every task completed.
pub const OK: i32 = 0;
/// Invalid config, unresolvable spec, or any other error.
pub const INVALID: i32 = 1;
/// `spec-runner next` found no incomplete task.
pub const COMPLETE: i32 = 2;
/// `spec-runner run` stopped on a task that failed all attempts.
pub const TASK_FAILED: i32 = 3;
