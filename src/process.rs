//! Process runner
//!
//! Launches one external command, feeds it stdin, captures stdout/stderr in full and enforces an optional
//! wall-clock timeout. Every outcome, including a command that cannot be started, comes back as a [`RunResult`]
//! so a missing artifact surfaces as a readable test failure instead of aborting the batch.
//!
//! The runner never retries.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time;

/// Exit code reported for a run killed by its timeout, following the `timeout(1)` convention.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How long to keep draining pipes after a timed-out process was killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// A command to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Bytes written to the child's stdin; `None` connects stdin to null.
    pub stdin: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Run `line` through `sh -c`.
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(line)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: Vec<u8>) -> Self {
        self.stdin = Some(input);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited on its own with this code.
    Code(i32),
    /// Terminated by a signal it did not arrange itself.
    Signal(i32),
    /// Killed by the runner after exceeding its timeout.
    TimedOut,
    /// Never started (missing executable, permission denied, ...).
    SpawnFailed(String),
}

impl ExitStatus {
    /// Numeric exit code, with [`TIMEOUT_EXIT_CODE`] standing in for a timeout.
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Code(code) => Some(*code),
            ExitStatus::TimedOut => Some(TIMEOUT_EXIT_CODE),
            ExitStatus::Signal(_) | ExitStatus::SpawnFailed(_) => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit code {code}"),
            ExitStatus::Signal(signal) => write!(f, "killed by signal {signal}"),
            ExitStatus::TimedOut => write!(f, "timed out"),
            ExitStatus::SpawnFailed(reason) => write!(f, "failed to start: {reason}"),
        }
    }
}

/// Captured result of one process invocation. Never mutated after creation.
///
/// `stdout`/`stderr` are lossy UTF-8 renderings for messages; comparisons use the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// True iff the process exited with status 0.
    pub passed: bool,
    pub stdout: String,
    pub stderr: String,
    pub stdout_bytes: Vec<u8>,
    pub stderr_bytes: Vec<u8>,
    pub exit: ExitStatus,
}

impl RunResult {
    pub fn from_exit(exit: ExitStatus, stdout: String, stderr: String) -> Self {
        Self::from_bytes(exit, stdout.into_bytes(), stderr.into_bytes())
    }

    pub fn from_bytes(exit: ExitStatus, stdout_bytes: Vec<u8>, stderr_bytes: Vec<u8>) -> Self {
        Self {
            passed: exit == ExitStatus::Code(0),
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            stdout_bytes,
            stderr_bytes,
            exit,
        }
    }

    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::from_exit(ExitStatus::SpawnFailed(reason.into()), String::new(), String::new())
    }

    pub fn timed_out(&self) -> bool {
        self.exit == ExitStatus::TimedOut
    }
}

/// Something that can run a [`CommandSpec`].
///
/// The engine and verification pipeline only talk to this trait, so tests can script process outcomes without
/// spawning anything.
#[allow(async_fn_in_trait)]
pub trait Executor {
    async fn run(&self, spec: &CommandSpec) -> RunResult;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for ProcessRunner {
    #[tracing::instrument(skip_all, fields(program = %spec.program.display()))]
    async fn run(&self, spec: &CommandSpec) -> RunResult {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        tracing::debug!(command = %spec, timeout = ?spec.timeout, "spawning");
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::debug!(command = %spec, error = %err, "spawn failed");
                return RunResult::spawn_failed(format!("{}: {err}", spec.program.display()));
            }
        };

        // Write stdin while the output pipes are drained, so neither side can fill up and stall the other
        let stdin_task = match (child.stdin.take(), spec.stdin.clone()) {
            (Some(mut pipe), Some(input)) => Some(tokio::spawn(async move {
                // A child that exits without reading everything closes the pipe; that is not our failure
                let _ = pipe.write_all(&input).await;
                let _ = pipe.shutdown().await;
            })),
            _ => None,
        };
        let stdout_task = drain(child.stdout.take());
        let stderr_task = drain(child.stderr.take());

        let waited = match spec.timeout {
            Some(limit) => match time::timeout(limit, child.wait()).await {
                Ok(waited) => Some(waited),
                Err(_) => {
                    tracing::debug!(command = %spec, ?limit, "timeout elapsed, killing");
                    let _ = child.kill().await;
                    None
                }
            },
            None => Some(child.wait().await),
        };

        let exit = match waited {
            None => ExitStatus::TimedOut,
            Some(Ok(status)) => exit_status(status),
            Some(Err(err)) => ExitStatus::SpawnFailed(format!("failed to wait for {}: {err}", spec.program.display())),
        };
        let grace = if exit == ExitStatus::TimedOut { Some(DRAIN_GRACE) } else { None };
        let stdout = collect(stdout_task, grace).await;
        let stderr = collect(stderr_task, grace).await;
        if let Some(task) = stdin_task {
            task.abort();
        }

        tracing::debug!(command = %spec, %exit, "finished");
        RunResult::from_bytes(exit, stdout, stderr)
    }
}

fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    })
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>, grace: Option<Duration>) -> Vec<u8> {
    let Some(mut task) = task else {
        return Vec::new();
    };
    match grace {
        // A killed process may have left a grandchild holding the pipe open
        Some(grace) => match time::timeout(grace, &mut task).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                task.abort();
                Vec::new()
            }
        },
        None => task.await.unwrap_or_default(),
    }
}

fn exit_status(status: std::process::ExitStatus) -> ExitStatus {
    if let Some(code) = status.code() {
        return ExitStatus::Code(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExitStatus::Signal(signal);
        }
    }
    ExitStatus::Code(-1)
}
