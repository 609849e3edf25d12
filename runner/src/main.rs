//! `spec-runner`: drive a spec's task checklist through a coding agent.
//!
//! Run inputs come from flags or the CI environment (`PR_MODE`, `PR_NUMBER`,
//! `SPEC_NAME`, `AGENT_*`, ...) and are read once here, then passed down.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use spec_runner::exit_codes;
use spec_runner::io::agent::{AgentOptions, ClaudeAgent};
use spec_runner::io::comment::{DEFAULT_API_URL, GithubComments, NoopComments};
use spec_runner::io::config::{CONFIG_FILE, RunnerConfig, load_config};
use spec_runner::io::git::Git;
use spec_runner::io::pr_context::{PrContext, PrInputs};
use spec_runner::io::spec_store::{SpecDocument, resolve_spec_location};
use spec_runner::logging;
use spec_runner::looping::{RunOutcome, RunSettings, RunStop, run_spec};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "spec-runner",
    version,
    about = "Run a spec's task checklist through a coding agent, one verified task at a time"
)]
struct Cli {
    /// Config file (defaults to `.spec-runner.toml` in the working directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct SpecArg {
    /// Spec directory, its tasks file, or a name under the specs root.
    #[arg(env = "SPEC_NAME")]
    spec: Option<String>,
}

#[derive(Args, Debug)]
struct PrArgs {
    /// Attach the run to a pull request (push commits, update the comment).
    #[arg(long, env = "PR_MODE", value_parser = BoolishValueParser::new())]
    pr_mode: bool,

    #[arg(long, env = "PR_NUMBER")]
    pr_number: Option<String>,

    #[arg(long, env = "PR_BRANCH")]
    pr_branch: Option<String>,

    /// Id of the progress comment to keep updated.
    #[arg(long, env = "PR_COMMENT_ID")]
    comment_id: Option<String>,

    /// `owner/repo` for the comment API.
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repository: Option<String>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    github_api_url: String,
}

impl PrArgs {
    fn inputs(&self) -> PrInputs {
        PrInputs {
            pr_mode: self.pr_mode,
            number: self
                .pr_number
                .as_deref()
                .and_then(|n| n.trim().parse().ok()),
            branch: self.pr_branch.clone(),
            comment_id: self.comment_id.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct AgentArgs {
    #[arg(long, env = "AGENT_ALLOWED_TOOLS")]
    allowed_tools: Option<String>,

    #[arg(long, env = "AGENT_DISALLOWED_TOOLS")]
    disallowed_tools: Option<String>,

    #[arg(long, env = "AGENT_MAX_TURNS")]
    max_turns: Option<u32>,

    #[arg(long, env = "AGENT_SYSTEM_PROMPT")]
    system_prompt: Option<String>,

    #[arg(long, env = "AGENT_APPEND_SYSTEM_PROMPT")]
    append_system_prompt: Option<String>,

    #[arg(long, env = "AGENT_FALLBACK_MODEL")]
    fallback_model: Option<String>,

    /// Tee raw agent output to the staging directory's `logs/`.
    #[arg(long, env = "AGENT_RAW_LOG", value_parser = BoolishValueParser::new())]
    raw_log: bool,
}

impl AgentArgs {
    fn options(&self) -> AgentOptions {
        AgentOptions {
            allowed_tools: self.allowed_tools.clone(),
            disallowed_tools: self.disallowed_tools.clone(),
            max_turns: self.max_turns,
            system_prompt: self.system_prompt.clone(),
            append_system_prompt: self.append_system_prompt.clone(),
            fallback_model: self.fallback_model.clone(),
            raw_log: self.raw_log,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Work through every incomplete task until done or a task fails.
    Run {
        #[command(flatten)]
        spec: SpecArg,
        #[command(flatten)]
        pr: PrArgs,
        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Print every task as `[x] <id> <title>`.
    List {
        #[command(flatten)]
        spec: SpecArg,
        /// Print tasks as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the next incomplete task id (exit 2 when none remain).
    Next {
        #[command(flatten)]
        spec: SpecArg,
    },
    /// Print `completed/total (percentage%)`.
    Progress {
        #[command(flatten)]
        spec: SpecArg,
    },
    /// Check off a task in the tasks file.
    Complete {
        /// Spec directory, its tasks file, or a name under the specs root.
        spec: String,
        /// Task id.
        id: String,
    },
    /// Print the resolved spec directory.
    Resolve {
        #[command(flatten)]
        spec: SpecArg,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let cwd = env::current_dir().context("read current directory")?;
    let config_path = cli.config.unwrap_or_else(|| cwd.join(CONFIG_FILE));
    let cfg = load_config(&config_path)?;

    match cli.command {
        Command::Run { spec, pr, agent } => {
            cmd_run(&cfg, &cwd, spec.spec.as_deref(), &pr, &agent)
        }
        Command::List { spec, json } => {
            let doc = open_spec(&cfg, &cwd, spec.spec.as_deref())?;
            let tasks = doc.list_all()?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&tasks).context("serialize tasks")?
                );
            } else {
                for task in &tasks {
                    let mark = if task.completed { "x" } else { " " };
                    println!("[{mark}] {} {}", task.id, task.title);
                }
            }
            Ok(exit_codes::OK)
        }
        Command::Next { spec } => {
            let doc = open_spec(&cfg, &cwd, spec.spec.as_deref())?;
            match doc.next_incomplete()? {
                Some(task) => {
                    println!("{}", task.id);
                    Ok(exit_codes::OK)
                }
                None => Ok(exit_codes::COMPLETE),
            }
        }
        Command::Progress { spec } => {
            let doc = open_spec(&cfg, &cwd, spec.spec.as_deref())?;
            let progress = doc.progress()?;
            println!(
                "{}/{} ({}%)",
                progress.completed, progress.total, progress.percentage
            );
            Ok(exit_codes::OK)
        }
        Command::Complete { spec, id } => {
            let doc = open_spec(&cfg, &cwd, Some(&spec))?;
            doc.mark_complete(&id)?;
            Ok(exit_codes::OK)
        }
        Command::Resolve { spec } => {
            let dir = resolve_spec_location(spec.spec.as_deref(), &cwd, &cfg.specs_root)?;
            println!("{}", dir.display());
            Ok(exit_codes::OK)
        }
    }
}

fn open_spec(cfg: &RunnerConfig, cwd: &Path, name: Option<&str>) -> Result<SpecDocument> {
    let dir = resolve_spec_location(name, cwd, &cfg.specs_root)?;
    Ok(SpecDocument::new(dir, &cfg.tasks_file)
        .with_parse_mode(cfg.parse_mode())
        .with_title_fallback(cfg.title_fallback))
}

fn cmd_run(
    cfg: &RunnerConfig,
    cwd: &Path,
    spec: Option<&str>,
    pr: &PrArgs,
    agent_args: &AgentArgs,
) -> Result<i32> {
    let doc = open_spec(cfg, cwd, spec)?;
    let context = PrContext::resolve(&pr.inputs());
    let agent = ClaudeAgent::new(&cfg.agent_command, agent_args.options());
    let git = Git::new(cwd);
    let settings = RunSettings::from_config(cfg, cwd, &doc.name(), agent_args.raw_log);
    info!(
        spec = %doc.dir().display(),
        staging = %settings.staging_dir.display(),
        "resolved spec"
    );

    let outcome = if context.comment_id().is_some() {
        let comments = GithubComments::new(
            &pr.github_api_url,
            pr.repository.as_deref().unwrap_or_default(),
            pr.github_token.as_deref().unwrap_or_default(),
        )?;
        run_spec(&doc, &context, &agent, &git, comments, &settings)?
    } else {
        if context.is_enabled() {
            warn!("PR_COMMENT_ID is not set; progress comment updates are disabled");
        }
        run_spec(&doc, &context, &agent, &git, NoopComments, &settings)?
    };

    print_summary(&outcome);
    Ok(outcome.exit_code())
}

fn print_summary(outcome: &RunOutcome) {
    let report = &outcome.report;
    println!(
        "{}: {}/{} tasks complete",
        outcome.spec_name,
        report.completed_count(),
        report.tasks.len()
    );
    if let RunStop::TaskFailed {
        id,
        title,
        attempts,
    } = &outcome.stop
    {
        println!("task {id} ({title}) failed after {attempts} attempts");
    }
}
