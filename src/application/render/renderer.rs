use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::domain::types::RenderErrorCode;

use super::sanitize::sanitize_error_message;

pub const DISABLE_SANDBOX_ENV: &str = "PRESSROOM_RENDER_DISABLE_SANDBOX";
pub const ALLOW_REMOTE_ENV: &str = "PRESSROOM_RENDER_ALLOW_REMOTE";
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// One external rendering attempt.
#[derive(Debug, Clone)]
pub struct RenderInvocation {
    pub html_path: PathBuf,
    pub pdf_path: PathBuf,
    pub qa_report_path: PathBuf,
    pub assets_dir: PathBuf,
    pub browser_binary: Option<PathBuf>,
    pub timeout: Duration,
    pub extra_env: Vec<(String, String)>,
}

/// How the renderer process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Process exited on its own. `code` is `None` when it died from a signal.
    Exited { code: Option<i32> },
    /// Wall-clock limit reached; the process was killed and reaped.
    TimedOut,
    /// The process (or its browser dependency) could not be started.
    SpawnFailed { reason: String },
    /// Any other invocation-level fault.
    Faulted { reason: String },
}

/// Raw result of a renderer run. `stdout`/`stderr` are unsanitized and bounded.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub outcome: ProcessOutcome,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessResult {
    fn without_output(outcome: ProcessOutcome, elapsed: Duration) -> Self {
        Self {
            outcome,
            stdout: String::new(),
            stderr: String::new(),
            elapsed,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.outcome {
            ProcessOutcome::Exited { code } => code,
            _ => None,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.outcome, ProcessOutcome::TimedOut)
    }

    pub fn spawn_failed(&self) -> bool {
        matches!(self.outcome, ProcessOutcome::SpawnFailed { .. })
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code() == Some(0)
    }

    /// Failure code implied by the process outcome alone.
    ///
    /// Spawn and timeout classifications always win over the exit code.
    pub fn failure_code(&self) -> Option<RenderErrorCode> {
        match &self.outcome {
            ProcessOutcome::SpawnFailed { .. } => Some(RenderErrorCode::RendererMissingDependency),
            ProcessOutcome::TimedOut => Some(RenderErrorCode::RendererTimeout),
            ProcessOutcome::Faulted { .. } | ProcessOutcome::Exited { code: None } => {
                Some(RenderErrorCode::RendererFailed)
            }
            ProcessOutcome::Exited { code: Some(0) } => None,
            ProcessOutcome::Exited { code: Some(code) } => Some(RenderErrorCode::RendererExit(*code)),
        }
    }

    /// Operator-facing detail for a failed run. Already sanitized.
    pub fn failure_detail(&self, timeout: Duration) -> String {
        let detail = match &self.outcome {
            ProcessOutcome::SpawnFailed { reason } => format!("renderer could not start: {reason}"),
            ProcessOutcome::TimedOut => format!(
                "renderer exceeded the {}s timeout and was terminated",
                timeout.as_secs().max(1)
            ),
            ProcessOutcome::Faulted { reason } => format!("renderer invocation failed: {reason}"),
            ProcessOutcome::Exited { code: None } => "renderer terminated by signal".to_string(),
            ProcessOutcome::Exited { code: Some(code) } => {
                let tail = stderr_tail(&self.stderr);
                if tail.is_empty() {
                    format!("renderer exited with status {code}")
                } else {
                    format!("renderer exited with status {code}: {tail}")
                }
            }
        };
        sanitize_error_message(&detail)
    }
}

/// Environment toggles handed to the child. Both are always set so a value
/// inherited from the worker's own environment can never enable them.
pub fn policy_env(disable_sandbox: bool, allow_remote_requests: bool) -> Vec<(String, String)> {
    let flag = |enabled: bool| if enabled { "1" } else { "0" }.to_string();
    vec![
        (DISABLE_SANDBOX_ENV.to_string(), flag(disable_sandbox)),
        (ALLOW_REMOTE_ENV.to_string(), flag(allow_remote_requests)),
    ]
}

/// Narrow seam around the external renderer so the orchestrator only sees outcomes.
#[async_trait]
pub trait ExternalRenderer: Send + Sync {
    async fn run(&self, invocation: &RenderInvocation) -> ProcessResult;
}

/// Runs the renderer as a child process under a wall-clock timeout.
#[derive(Debug, Clone)]
pub struct ProcessRenderer {
    program: PathBuf,
    prefix_args: Vec<String>,
    max_output_bytes: usize,
}

impl ProcessRenderer {
    pub fn new(program: PathBuf, prefix_args: Vec<String>) -> Self {
        Self {
            program,
            prefix_args,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn build_args(&self, invocation: &RenderInvocation) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.push("--input".to_string());
        args.push(invocation.html_path.display().to_string());
        args.push("--output".to_string());
        args.push(invocation.pdf_path.display().to_string());
        args.push("--qa-report".to_string());
        args.push(invocation.qa_report_path.display().to_string());
        args.push("--assets-dir".to_string());
        args.push(invocation.assets_dir.display().to_string());
        if let Some(browser) = invocation.browser_binary.as_ref() {
            args.push("--browser".to_string());
            args.push(browser.display().to_string());
        }
        args.push("--timeout-ms".to_string());
        args.push(invocation.timeout.as_millis().to_string());
        args
    }
}

#[async_trait]
impl ExternalRenderer for ProcessRenderer {
    async fn run(&self, invocation: &RenderInvocation) -> ProcessResult {
        let started_at = Instant::now();

        if let Some(browser) = invocation.browser_binary.as_ref()
            && !browser.is_file()
        {
            warn!(
                target = "application::render::renderer",
                op = "renderer::run",
                result = "error",
                error_code = "browser_missing",
                browser = %browser.display(),
                "Configured browser binary does not exist"
            );
            return ProcessResult::without_output(
                ProcessOutcome::SpawnFailed {
                    reason: format!("browser binary `{}` not found", browser.display()),
                },
                started_at.elapsed(),
            );
        }

        let mut command = Command::new(&self.program);
        command
            .args(self.build_args(invocation))
            .envs(invocation.extra_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout also reaches the browser the renderer launched.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let outcome = match err.kind() {
                    ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                        ProcessOutcome::SpawnFailed {
                            reason: err.to_string(),
                        }
                    }
                    _ => ProcessOutcome::Faulted {
                        reason: err.to_string(),
                    },
                };
                warn!(
                    target = "application::render::renderer",
                    op = "renderer::run",
                    result = "error",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error_code = "spawn_renderer",
                    program = %self.program.display(),
                    error = %err,
                    "Failed to spawn PDF renderer"
                );
                return ProcessResult::without_output(outcome, started_at.elapsed());
            }
        };

        let pid = child.id();
        let stdout_task = tokio::spawn(read_bounded(child.stdout.take(), self.max_output_bytes));
        let stderr_task = tokio::spawn(read_bounded(child.stderr.take(), self.max_output_bytes));

        let outcome = match tokio::time::timeout(invocation.timeout, child.wait()).await {
            Ok(Ok(status)) => ProcessOutcome::Exited {
                code: status.code(),
            },
            Ok(Err(err)) => ProcessOutcome::Faulted {
                reason: err.to_string(),
            },
            Err(_) => {
                // The group must be signalled before the leader is reaped.
                kill_process_group(pid);
                // `kill` sends SIGKILL and reaps the child before returning.
                if let Err(err) = child.kill().await {
                    warn!(
                        target = "application::render::renderer",
                        op = "renderer::run",
                        result = "kill_error",
                        error = %err,
                        "Failed to terminate timed-out PDF renderer"
                    );
                }
                ProcessOutcome::TimedOut
            }
        };

        let stdout = drain(stdout_task).await;
        let stderr = drain(stderr_task).await;
        let elapsed = started_at.elapsed();

        match &outcome {
            ProcessOutcome::Exited { code: Some(0) } => info!(
                target = "application::render::renderer",
                op = "renderer::run",
                result = "exited",
                elapsed_ms = elapsed.as_millis() as u64,
                exit_code = 0,
                "PDF renderer finished"
            ),
            ProcessOutcome::TimedOut => warn!(
                target = "application::render::renderer",
                op = "renderer::run",
                result = "timeout",
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = invocation.timeout.as_millis() as u64,
                error_code = "renderer_timeout",
                "PDF renderer timed out and was killed"
            ),
            other => warn!(
                target = "application::render::renderer",
                op = "renderer::run",
                result = "error",
                elapsed_ms = elapsed.as_millis() as u64,
                exit_code = other_exit_code(other),
                stderr = %sanitize_error_message(&stderr_tail(&stderr)),
                "PDF renderer failed"
            ),
        }

        ProcessResult {
            outcome,
            stdout,
            stderr,
            elapsed,
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::{
        errno::Errno,
        sys::signal::{Signal, killpg},
        unistd::Pid,
    };

    let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(
            target = "application::render::renderer",
            op = "renderer::run",
            result = "kill_error",
            pgid,
            error = %err,
            "Failed to terminate renderer process group"
        ),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn other_exit_code(outcome: &ProcessOutcome) -> i64 {
    match outcome {
        ProcessOutcome::Exited { code: Some(code) } => i64::from(*code),
        _ => -1,
    }
}

async fn read_bounded<R>(reader: Option<R>, limit: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => {
                // Keep reading past the limit so the child never blocks on a full pipe.
                let room = limit.saturating_sub(captured.len());
                captured.extend_from_slice(&chunk[..read.min(room)]);
            }
        }
    }
    String::from_utf8_lossy(&captured).into_owned()
}

async fn drain(mut handle: JoinHandle<String>) -> String {
    // A descendant that moved to another process group may keep the pipe open.
    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut handle).await {
        Ok(Ok(output)) => output,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}

fn stderr_tail(stderr: &str) -> String {
    const TAIL_LINES: usize = 8;
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(TAIL_LINES);
    lines[start..].join(" | ")
}
