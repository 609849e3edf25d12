//! Helpers for running child processes with bounded output.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

type Tee = Arc<Option<Mutex<BufWriter<File>>>>;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    /// Whether the watched string appeared anywhere in stdout, including the
    /// part past the output limit.
    pub watch_seen: bool,
}

/// One drained stream: the kept head, the dropped byte count, and whether
/// the watched string was seen.
struct StreamCapture {
    bytes: Vec<u8>,
    truncated: usize,
    watch_seen: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_tail(&self, max_bytes: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let trimmed = text.trim();
        if trimmed.len() <= max_bytes {
            return trimmed.to_string();
        }
        let mut start = trimmed.len() - max_bytes;
        while !trimmed.is_char_boundary(start) {
            start += 1;
        }
        format!("...{}", &trimmed[start..])
    }
}

/// Run a command, capturing stdout/stderr and optionally tee-ing stdout to a file.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds
/// how much of each stream is kept in memory; the rest is drained. With
/// `timeout = None` the child is waited on indefinitely. `watch` is searched
/// for in every stdout line as it is drained; it must not contain a newline.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes, tee = tee_path.is_some()))]
pub fn run_command(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
    tee_path: Option<&Path>,
    watch: Option<&str>,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let tee: Tee = Arc::new(match tee_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create log dir {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("create log file {}", path.display()))?;
            Some(Mutex::new(BufWriter::new(file)))
        }
        None => None,
    });

    let needle = watch.map(|w| w.as_bytes().to_vec()).filter(|w| !w.is_empty());
    let stdout_handle = thread::spawn(move || {
        read_stream_limited_with_tee(stdout, output_limit_bytes, tee, needle.as_deref())
    });
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match timeout {
        None => child.wait().context("wait for command")?,
        Some(limit) => match child.wait_timeout(limit).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(timeout_secs = limit.as_secs(), "command timed out, killing");
                timed_out = true;
                child.kill().context("kill command")?;
                child.wait().context("wait command after kill")?
            }
        },
    };

    let stdout = join_output(stdout_handle).context("join stdout")?;
    let stderr = join_output(stderr_handle).context("join stderr")?;

    if stdout.truncated > 0 || stderr.truncated > 0 {
        warn!(
            stdout_truncated = stdout.truncated,
            stderr_truncated = stderr.truncated,
            "output truncated"
        );
    }

    debug!(
        exit_code = ?status.code(),
        timed_out,
        watch_seen = stdout.watch_seen,
        "command finished"
    );
    Ok(CommandOutput {
        status,
        stdout: stdout.bytes,
        stderr: stderr.bytes,
        stdout_truncated: stdout.truncated,
        stderr_truncated: stderr.truncated,
        timed_out,
        watch_seen: stdout.watch_seen,
    })
}

fn join_output(handle: thread::JoinHandle<Result<StreamCapture>>) -> Result<StreamCapture> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited_with_tee<R: Read>(
    reader: R,
    limit: usize,
    tee: Tee,
    watch: Option<&[u8]>,
) -> Result<StreamCapture> {
    let mut buf_reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;
    let mut watch_seen = false;

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read line")?;
        if n == 0 {
            break;
        }

        // Flush per line so the raw log can be followed live.
        if let Some(ref mutex) = *tee
            && let Ok(mut writer) = mutex.lock()
        {
            if let Err(e) = writer.write_all(&line) {
                warn!(err = %e, "failed to write raw log");
            } else if let Err(e) = writer.flush() {
                warn!(err = %e, "failed to flush raw log");
            }
        }

        if !watch_seen
            && let Some(needle) = watch
        {
            watch_seen = line.windows(needle.len()).any(|w| w == needle);
        }

        let remaining = limit.saturating_sub(collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.extend_from_slice(&line[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok(StreamCapture {
        bytes: collected,
        truncated,
        watch_seen,
    })
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<StreamCapture> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok(StreamCapture {
        bytes: buf,
        truncated,
        watch_seen: false,
    })
}
