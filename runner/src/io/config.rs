//! Runner tunables stored in `.spec-runner.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::checklist::ParseMode;
use crate::io::spec_store::{DEFAULT_SPECS_ROOT, DEFAULT_TASKS_FILE};

pub const CONFIG_FILE: &str = ".spec-runner.toml";

/// Runner configuration (TOML).
///
/// Missing fields default to values that work for a stock `.kiro/specs`
/// layout driven by the `claude` CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Directory holding one subdirectory per specification.
    pub specs_root: PathBuf,

    /// Checklist file name inside a specification directory.
    pub tasks_file: String,

    /// Reject unrecognised checklist lines instead of skipping them.
    pub strict_parse: bool,

    /// Allow `complete` to match a task by title substring when no id matches.
    pub title_fallback: bool,

    /// Agent executable, invoked as `<agent_command> -p`.
    pub agent_command: String,

    /// Per-invocation agent timeout. Absent means wait indefinitely.
    pub agent_timeout_secs: Option<u64>,

    /// Agent stdout kept in memory for marker detection.
    pub agent_output_limit_bytes: usize,

    /// Republish the progress comment on this interval while running.
    pub publish_interval_secs: Option<u64>,

    /// Base directory for prompts and raw agent logs. Defaults to
    /// `<tmp>/spec-runner`, outside the working tree. Each run stages under
    /// its own `<spec>-<pid>` subdirectory.
    pub staging_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            specs_root: PathBuf::from(DEFAULT_SPECS_ROOT),
            tasks_file: DEFAULT_TASKS_FILE.to_string(),
            strict_parse: false,
            title_fallback: true,
            agent_command: "claude".to_string(),
            agent_timeout_secs: None,
            agent_output_limit_bytes: 4 * 1024 * 1024,
            publish_interval_secs: None,
            staging_dir: None,
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tasks_file.trim().is_empty() {
            return Err(anyhow!("tasks_file must be non-empty"));
        }
        if self.agent_command.trim().is_empty() {
            return Err(anyhow!("agent_command must be non-empty"));
        }
        if self.agent_timeout_secs == Some(0) {
            return Err(anyhow!("agent_timeout_secs must be > 0 when set"));
        }
        if self.agent_output_limit_bytes == 0 {
            return Err(anyhow!("agent_output_limit_bytes must be > 0"));
        }
        if self.publish_interval_secs == Some(0) {
            return Err(anyhow!("publish_interval_secs must be > 0 when set"));
        }
        Ok(())
    }

    pub fn parse_mode(&self) -> ParseMode {
        if self.strict_parse {
            ParseMode::Strict
        } else {
            ParseMode::Lenient
        }
    }

    pub fn agent_timeout(&self) -> Option<Duration> {
        self.agent_timeout_secs.map(Duration::from_secs)
    }

    pub fn publish_interval(&self) -> Option<Duration> {
        self.publish_interval_secs.map(Duration::from_secs)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("spec-runner"))
    }

    /// Staging directory for one run of `spec_name` by process `pid`.
    pub fn run_staging_dir(&self, spec_name: &str, pid: u32) -> PathBuf {
        self.staging_dir().join(format!("{spec_name}-{pid}"))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RunnerConfig::default());
        assert_eq!(cfg.parse_mode(), ParseMode::Lenient);
        assert!(cfg.agent_timeout().is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "strict_parse = true\nagent_timeout_secs = 600\nspecs_root = \"specs\"\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.parse_mode(), ParseMode::Strict);
        assert_eq!(cfg.agent_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(cfg.specs_root, PathBuf::from("specs"));
        assert_eq!(cfg.tasks_file, DEFAULT_TASKS_FILE);
        assert_eq!(cfg.agent_command, "claude");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "publish_interval_secs = 0\n").expect("write");

        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("publish_interval_secs"));
    }

    #[test]
    fn concurrent_runs_stage_in_separate_directories() {
        let cfg = RunnerConfig::default();
        let auth = cfg.run_staging_dir("auth", 4242);
        let billing = cfg.run_staging_dir("billing", 4243);
        let auth_again = cfg.run_staging_dir("auth", 4300);

        assert_eq!(auth, std::env::temp_dir().join("spec-runner").join("auth-4242"));
        assert_ne!(auth, billing);
        assert_ne!(auth, auth_again);

        let pinned = RunnerConfig {
            staging_dir: Some(PathBuf::from("/srv/stage")),
            ..RunnerConfig::default()
        };
        assert_eq!(
            pinned.run_staging_dir("auth", 7),
            PathBuf::from("/srv/stage").join("auth-7")
        );
    }

    #[test]
    fn unknown_command_is_rejected() {
        let cfg = RunnerConfig {
            agent_command: "  ".to_string(),
            ..RunnerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
