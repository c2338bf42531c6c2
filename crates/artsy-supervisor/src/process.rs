// ABOUTME: Child process handles owned by the supervisor
// ABOUTME: Spawning, liveness checks, process-group SIGTERM/SIGKILL delivery and reaping

use crate::error::{Result, SupervisorError};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// How long a process gets to exit after SIGTERM before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Everything needed to start one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Short name used in logs ("server", "browser", ...)
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
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

    pub fn envs<I>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.envs.extend(envs);
        self
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code; `None` when the process was ended by a signal
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// A child process the supervisor owns.
///
/// `terminate` and `kill` reach the process and everything it started.
/// Signaling a process that already exited is not an error.
#[async_trait]
pub trait ManagedProcess: Send {
    fn label(&self) -> &str;

    fn pid(&self) -> Option<u32>;

    /// Non-blocking liveness check. Reaps the process if it has exited.
    fn is_alive(&mut self) -> bool;

    /// Asks the process and its descendants to stop (SIGTERM on unix).
    fn terminate(&mut self) -> io::Result<()>;

    /// Forces the process and its descendants to stop (SIGKILL on unix).
    fn kill(&mut self) -> io::Result<()>;

    /// Waits for the process to exit. Cancel-safe.
    async fn wait(&mut self) -> io::Result<ProcessExit>;
}

/// Starts child processes.
pub trait ProcessLauncher: Send + Sync {
    fn spawn(&self, spec: &LaunchSpec) -> Result<Box<dyn ManagedProcess>>;
}

/// Launches real processes with tokio. Output is forwarded to tracing.
///
/// On unix each child leads its own process group, so signals reach
/// whatever it forks (an opener's browser, chromium's helpers) and a
/// terminal Ctrl+C reaches only the supervisor.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioLauncher;

impl ProcessLauncher for TokioLauncher {
    fn spawn(&self, spec: &LaunchSpec) -> Result<Box<dyn ManagedProcess>> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            label: spec.label.clone(),
            source,
        })?;

        let pid = child.id().ok_or_else(|| SupervisorError::Spawn {
            label: spec.label.clone(),
            source: io::Error::other("spawned process has no pid"),
        })?;

        tracing::debug!(process = %spec.label, pid, program = ?spec.program, "Spawned");

        if let Some(stdout) = child.stdout.take() {
            forward_lines(spec.label.clone(), stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(spec.label.clone(), stderr);
        }

        Ok(Box::new(ChildProcess {
            label: spec.label.clone(),
            pid,
            child,
            exit: None,
        }))
    }
}

/// Re-emits each output line of a child as a log event.
fn forward_lines<R>(label: String, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::info!(process = %label, "{}", line);
        }
    });
}

/// Handle over a tokio child process.
pub struct ChildProcess {
    label: String,
    pid: u32,
    child: Child,
    exit: Option<ProcessExit>,
}

impl ChildProcess {
    /// Signals the whole process group led by this child. The group can
    /// outlive its leader, so this does not check the leader first.
    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(self.pid as i32), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    #[cfg(not(unix))]
    fn start_kill(&mut self) -> io::Result<()> {
        if !self.is_alive() {
            return Ok(());
        }
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ManagedProcess for ChildProcess {
    fn label(&self) -> &str {
        &self.label
    }

    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_alive(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status.into());
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::debug!(process = %self.label, error = %e, "try_wait failed");
                false
            }
        }
    }

    fn terminate(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        {
            self.signal_group(nix::sys::signal::Signal::SIGTERM)
        }

        #[cfg(not(unix))]
        {
            self.start_kill()
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        {
            self.signal_group(nix::sys::signal::Signal::SIGKILL)
        }

        #[cfg(not(unix))]
        {
            self.start_kill()
        }
    }

    async fn wait(&mut self) -> io::Result<ProcessExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let exit = ProcessExit::from(self.child.wait().await?);
        self.exit = Some(exit);
        Ok(exit)
    }
}

/// Waits up to `grace` for an already-signaled process, then kills it.
///
/// Signaling errors are logged and swallowed. Returns the exit if the
/// process could be reaped.
pub async fn reap(process: &mut dyn ManagedProcess, grace: Duration) -> Option<ProcessExit> {
    match tokio::time::timeout(grace, process.wait()).await {
        Ok(Ok(exit)) => return Some(exit),
        Ok(Err(e)) => {
            tracing::debug!(process = %process.label(), error = %e, "wait failed");
            return None;
        }
        Err(_) => {
            tracing::warn!(
                process = %process.label(),
                grace_secs = grace.as_secs_f32(),
                "Did not exit after SIGTERM, killing"
            );
        }
    }

    if let Err(e) = process.kill() {
        tracing::debug!(process = %process.label(), error = %e, "SIGKILL failed");
    }
    process.wait().await.ok()
}
