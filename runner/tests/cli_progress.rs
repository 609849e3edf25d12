//! CLI tests for the task-list query commands.
//!
//! Spawns the binary and checks stdout and exit codes.

use std::path::Path;
use std::process::{Command, Output};

use spec_runner::exit_codes;
use spec_runner::test_support::TestSpec;

const TASKS: &str = "## Build\n\n- [x] 1. Scaffold\n- [ ] 2. Parser\n- [  ] 3. CLI\n";

fn spec_runner(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_spec-runner"))
        .current_dir(root)
        .env_remove("SPEC_NAME")
        .args(args)
        .output()
        .expect("spawn spec-runner")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn progress_prints_counts_and_percentage() {
    let spec = TestSpec::new("parser-feature", TASKS).expect("spec");

    let out = spec_runner(spec.root(), &["progress", "parser"]);

    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&out), "1/3 (33%)\n");
}

#[test]
fn next_prints_first_incomplete_id() {
    let spec = TestSpec::new("parser-feature", TASKS).expect("spec");

    let out = spec_runner(spec.root(), &["next", "parser-feature"]);

    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&out), "2\n");
}

#[test]
fn next_exits_complete_when_nothing_remains() {
    let spec = TestSpec::new("done", "## A\n\n- [x] 1. Only\n").expect("spec");

    let out = spec_runner(spec.root(), &["next", "done"]);

    assert_eq!(out.status.code(), Some(exit_codes::COMPLETE));
    assert!(stdout(&out).is_empty());
}

#[test]
fn complete_then_list_shows_checked_task() {
    let spec = TestSpec::new("parser-feature", TASKS).expect("spec");

    let out = spec_runner(spec.root(), &["complete", "parser-feature", "3"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));

    let out = spec_runner(spec.root(), &["list", "parser-feature"]);
    assert_eq!(
        stdout(&out),
        "[x] 1 1. Scaffold\n[ ] 2 2. Parser\n[x] 3 3. CLI\n"
    );
    assert_eq!(
        spec.read_tasks().expect("read"),
        "## Build\n\n- [x] 1. Scaffold\n- [ ] 2. Parser\n- [x] 3. CLI\n"
    );
}

#[test]
fn completing_a_checked_task_fails_without_rewriting() {
    let spec = TestSpec::new("parser-feature", TASKS).expect("spec");

    let out = spec_runner(spec.root(), &["complete", "parser-feature", "1"]);

    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
    assert_eq!(spec.read_tasks().expect("read"), TASKS);
}

#[test]
fn ambiguous_name_lists_candidates() {
    let spec = TestSpec::new("auth-login", TASKS).expect("spec");
    std::fs::create_dir_all(spec.root().join(".kiro/specs/auth-logout")).expect("mkdir");

    let out = spec_runner(spec.root(), &["resolve", "auth"]);

    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("auth-login"), "{stderr}");
    assert!(stderr.contains("auth-logout"), "{stderr}");
}

#[test]
fn missing_spec_name_is_an_error() {
    let spec = TestSpec::new("parser-feature", TASKS).expect("spec");

    let out = spec_runner(spec.root(), &["progress"]);

    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn invalid_config_is_rejected_before_reading_specs() {
    let spec = TestSpec::new("parser-feature", TASKS).expect("spec");
    std::fs::write(
        spec.root().join(".spec-runner.toml"),
        "agent_output_limit_bytes = 0\n",
    )
    .expect("write config");

    let out = spec_runner(spec.root(), &["progress", "parser-feature"]);

    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&out.stderr).contains("agent_output_limit_bytes"));
}
