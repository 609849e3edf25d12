//! Agent runner abstraction.
//!
//! The [`AgentRunner`] trait decouples the attempt loop from the coding agent
//! backend (currently the `claude` CLI). Tests use scripted runners that
//! return predetermined transcripts without spawning processes.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command;
use crate::io::prompt::PromptKind;

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub kind: PromptKind,
    pub task_id: String,
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Staged prompt file fed to the agent.
    pub prompt_path: PathBuf,
    /// When set, raw stdout is tee'd here as it arrives.
    pub log_path: Option<PathBuf>,
    /// `None` waits for the agent indefinitely.
    pub timeout: Option<Duration>,
    pub output_limit_bytes: usize,
    /// String to look for in the full stdout stream, past the output limit too.
    pub watch: Option<String>,
}

/// What the agent printed to stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentTranscript {
    /// Stdout, bounded by the request limit.
    pub output: String,
    /// The request's `watch` string appeared somewhere in stdout.
    pub watch_seen: bool,
}

/// Abstraction over agent execution backends.
pub trait AgentRunner {
    /// Run the agent on the staged prompt and return its captured output.
    fn run(&self, request: &AgentRequest) -> Result<AgentTranscript>;
}

/// Pass-through agent options. Not interpreted by the runner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOptions {
    pub allowed_tools: Option<String>,
    pub disallowed_tools: Option<String>,
    pub max_turns: Option<u32>,
    pub system_prompt: Option<String>,
    pub append_system_prompt: Option<String>,
    pub fallback_model: Option<String>,
    /// Tee raw agent output to `<staging>/logs/`.
    pub raw_log: bool,
}

impl AgentOptions {
    /// CLI flags for the `claude` binary, skipping unset or blank options.
    pub fn cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let mut push = |flag: &str, value: Option<&str>| {
            if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
                args.push(flag.to_string());
                args.push(value.to_string());
            }
        };
        push("--allowedTools", self.allowed_tools.as_deref());
        push("--disallowedTools", self.disallowed_tools.as_deref());
        let max_turns = self.max_turns.map(|n| n.to_string());
        push("--max-turns", max_turns.as_deref());
        push("--system-prompt", self.system_prompt.as_deref());
        push("--append-system-prompt", self.append_system_prompt.as_deref());
        push("--fallback-model", self.fallback_model.as_deref());
        args
    }
}

/// Agent runner that spawns `<command> -p` with the prompt on stdin.
#[derive(Debug, Clone)]
pub struct ClaudeAgent {
    command: String,
    options: AgentOptions,
}

impl ClaudeAgent {
    pub fn new(command: impl Into<String>, options: AgentOptions) -> Self {
        Self {
            command: command.into(),
            options,
        }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }
}

impl AgentRunner for ClaudeAgent {
    #[instrument(skip_all, fields(kind = request.kind.as_str(), task_id = %request.task_id))]
    fn run(&self, request: &AgentRequest) -> Result<AgentTranscript> {
        info!(workdir = %request.workdir.display(), "starting agent");

        let prompt = fs::read(&request.prompt_path)
            .with_context(|| format!("read prompt {}", request.prompt_path.display()))?;

        let mut cmd = Command::new(&self.command);
        cmd.arg("-p")
            .args(self.options.cli_args())
            .current_dir(&request.workdir);

        let output = run_command(
            cmd,
            Some(&prompt),
            request.timeout,
            request.output_limit_bytes,
            request.log_path.as_deref(),
            request.watch.as_deref(),
        )
        .with_context(|| format!("run {}", self.command))?;

        if output.timed_out {
            warn!("agent timed out");
            return Err(anyhow!(
                "{} timed out after {:?}",
                self.command,
                request.timeout.unwrap_or_default()
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            return Err(anyhow!(
                "{} failed with status {:?}: {}",
                self.command,
                output.status.code(),
                output.stderr_tail(2000)
            ));
        }

        debug!(bytes = output.stdout.len(), watch_seen = output.watch_seen, "agent completed");
        Ok(AgentTranscript {
            output: output.stdout_lossy(),
            watch_seen: output.watch_seen,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_args_skip_unset_and_blank_options() {
        let options = AgentOptions {
            allowed_tools: Some("Bash,Edit".to_string()),
            disallowed_tools: Some("  ".to_string()),
            max_turns: Some(40),
            fallback_model: Some("sonnet".to_string()),
            ..AgentOptions::default()
        };
        assert_eq!(
            options.cli_args(),
            vec![
                "--allowedTools",
                "Bash,Edit",
                "--max-turns",
                "40",
                "--fallback-model",
                "sonnet"
            ]
        );
        assert!(AgentOptions::default().cli_args().is_empty());
    }

    #[cfg(unix)]
    fn fake_agent(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-agent.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod");
        path
    }

    #[cfg(unix)]
    fn request(dir: &std::path::Path) -> AgentRequest {
        let prompt_path = dir.join("prompt.md");
        fs::write(&prompt_path, "do the thing\n").expect("write prompt");
        AgentRequest {
            kind: PromptKind::Verify,
            task_id: "1".to_string(),
            workdir: dir.to_path_buf(),
            prompt_path,
            log_path: Some(dir.join("logs/verify-task-1.log")),
            timeout: None,
            output_limit_bytes: 4096,
            watch: None,
        }
    }

    #[cfg(unix)]
    #[test]
    fn claude_agent_feeds_prompt_and_forwards_flags() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = fake_agent(temp.path(), "echo \"args: $*\"\ncat");
        let options = AgentOptions {
            max_turns: Some(5),
            ..AgentOptions::default()
        };
        let agent = ClaudeAgent::new(script.to_string_lossy(), options);
        let req = request(temp.path());

        let transcript = agent.run(&req).expect("run");

        assert_eq!(transcript.output, "args: -p --max-turns 5\ndo the thing\n");
        let log = fs::read_to_string(temp.path().join("logs/verify-task-1.log")).expect("log");
        assert_eq!(log, transcript.output);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = fake_agent(temp.path(), "cat >/dev/null\necho boom >&2\nexit 7");
        let agent = ClaudeAgent::new(script.to_string_lossy(), AgentOptions::default());

        let err = agent.run(&request(temp.path())).expect_err("fails");
        let msg = format!("{err:#}");
        assert!(msg.contains("Some(7)"), "{msg}");
        assert!(msg.contains("boom"), "{msg}");
    }

    #[cfg(unix)]
    #[test]
    fn watch_string_after_the_output_limit_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = fake_agent(
            temp.path(),
            "cat >/dev/null\nhead -c 5000 /dev/zero | tr '\\0' x\necho\necho 'VERIFIED-7F3A'",
        );
        let agent = ClaudeAgent::new(script.to_string_lossy(), AgentOptions::default());
        let req = AgentRequest {
            watch: Some("VERIFIED-7F3A".to_string()),
            ..request(temp.path())
        };

        let transcript = agent.run(&req).expect("run");

        assert_eq!(transcript.output.len(), 4096);
        assert!(!transcript.output.contains("VERIFIED-7F3A"));
        assert!(transcript.watch_seen);
    }
}
