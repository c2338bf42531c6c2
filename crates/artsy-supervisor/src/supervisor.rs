// ABOUTME: Supervisor owning the server, kiosk browser and helper processes
// ABOUTME: Runs launch -> readiness -> kiosk -> wait, with one teardown path for every exit

use crate::config::Config;
use crate::error::{Result, SupervisorError};
use crate::kiosk;
use crate::locator::{ProgramLocator, SystemLocator};
use crate::process::{
    self, LaunchSpec, ManagedProcess, ProcessExit, ProcessLauncher, TokioLauncher,
    DEFAULT_GRACE_PERIOD,
};
use crate::readiness::{self, HttpProbe, PollPolicy, Readiness, ReadinessProbe};
use crate::status::{self, Phase};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    ShuttingDown,
    Exited,
}

/// Why a run ended without a startup failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// SIGINT/SIGTERM (or the injected shutdown future) fired
    Interrupted,
    /// The server process exited on its own
    ServerExited(ProcessExit),
}

impl Outcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Interrupted => 0,
            Outcome::ServerExited(exit) if exit.success() => 0,
            Outcome::ServerExited(_) => 1,
        }
    }
}

/// Owns every child process of a run.
///
/// All exits go through [`Supervisor::shutdown`]. If the value is dropped
/// before that (e.g. the run future is cancelled), `Drop` still sends
/// SIGTERM to whatever is registered.
pub struct Supervisor {
    config: Config,
    launcher: Arc<dyn ProcessLauncher>,
    locator: Arc<dyn ProgramLocator>,
    probe: Arc<dyn ReadinessProbe>,
    policy: PollPolicy,
    grace: Duration,
    state: SupervisorState,
    server: Option<Box<dyn ManagedProcess>>,
    browser: Option<Box<dyn ManagedProcess>>,
    helpers: Vec<Box<dyn ManagedProcess>>,
}

impl Supervisor {
    /// Supervisor with real processes, PATH lookup and an HTTP probe.
    pub fn new(config: Config) -> Result<Self> {
        let probe = HttpProbe::new(config.readiness_url())?;
        Ok(Self {
            config,
            launcher: Arc::new(TokioLauncher),
            locator: Arc::new(SystemLocator),
            probe: Arc::new(probe),
            policy: PollPolicy::default(),
            grace: DEFAULT_GRACE_PERIOD,
            state: SupervisorState::Running,
            server: None,
            browser: None,
            helpers: Vec::new(),
        })
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_locator(mut self, locator: Arc<dyn ProgramLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Checks prerequisites and prepares the data directory. Nothing is
    /// spawned; on error nothing needs tearing down.
    pub fn preflight(&self) -> Result<PathBuf> {
        let program = self.config.server.resolve(self.locator.as_ref())?;
        self.config.prepare_data_dir()?;
        Ok(program)
    }

    /// Runs until `shutdown` resolves or the server exits.
    ///
    /// Startup failures (readiness timeout, server dying early) tear down
    /// what was spawned and are returned as errors.
    pub async fn run<F>(mut self, shutdown: F) -> Result<Outcome>
    where
        F: Future<Output = ()>,
    {
        let program = self.preflight()?;
        tokio::pin!(shutdown);

        status::line(
            Phase::Starting,
            format!(
                "Starting server: {} {}",
                self.config.server.program,
                self.config.server.args.join(" ")
            ),
        );
        status::detail("data", self.config.data_dir.display().to_string());

        let spec = LaunchSpec::new("server", program)
            .args(self.config.server.args.iter().cloned())
            .envs(self.config.server_env());
        let server = self.server.insert(self.launcher.spawn(&spec)?);
        tracing::info!(pid = ?server.pid(), "Server spawned");
        if let Some(pid) = server.pid() {
            status::detail("pid", pid.to_string());
        }

        status::line(
            Phase::Waiting,
            format!("Waiting for server at {}", self.probe.target()),
        );
        let mut missed = 0u32;
        let readiness = tokio::select! {
            biased;
            _ = &mut shutdown => None,
            result = readiness::wait_until_ready(
                self.probe.as_ref(),
                &self.policy,
                server.as_mut(),
                |_| {
                    missed += 1;
                    status::tick();
                },
            ) => Some(result),
        };
        if missed > 0 {
            status::end_ticks();
        }

        match readiness {
            Some(Readiness::Ready { attempts }) => {
                tracing::info!(attempts, "Server ready");
                status::line(
                    Phase::Ready,
                    format!("Server ready after {attempts} attempt(s)"),
                );
            }
            Some(Readiness::TimedOut { attempts }) => {
                status::line(
                    Phase::Failed,
                    format!("Server did not become ready after {attempts} attempts"),
                );
                self.shutdown().await;
                return Err(SupervisorError::ReadinessTimeout {
                    url: self.probe.target().to_string(),
                    attempts,
                });
            }
            Some(Readiness::ProcessExited { code, .. }) => {
                status::line(Phase::Failed, "Server exited before becoming ready");
                self.shutdown().await;
                return Err(SupervisorError::ServerExitedEarly { code });
            }
            None => {
                tracing::info!("Shutdown requested during startup");
                self.shutdown().await;
                return Ok(Outcome::Interrupted);
            }
        }

        if self.config.kiosk {
            self.start_kiosk().await;
        } else {
            self.print_info();
        }

        status::line(Phase::Running, "Running. Press Ctrl+C to stop");
        let outcome = match self.server.as_mut() {
            // A signal wins over a server exit seen in the same poll
            Some(server) => tokio::select! {
                biased;
                _ = &mut shutdown => Outcome::Interrupted,
                exit = server.wait() => {
                    let exit = exit.unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "Lost track of server process");
                        ProcessExit { code: None }
                    });
                    tracing::info!(code = ?exit.code, "Server exited");
                    Outcome::ServerExited(exit)
                }
            },
            None => Outcome::Interrupted,
        };

        self.shutdown().await;
        Ok(outcome)
    }

    async fn start_kiosk(&mut self) {
        let url = self.config.display_url();
        self.helpers = kiosk::prepare_display(self.launcher.as_ref(), self.locator.as_ref()).await;
        self.browser = kiosk::launch_browser(self.launcher.as_ref(), self.locator.as_ref(), &url);

        match &self.browser {
            Some(browser) => {
                tracing::info!(pid = ?browser.pid(), url = %url, "Kiosk browser started");
                status::line(Phase::Running, format!("Kiosk browser showing {url}"));
            }
            None => {
                tracing::warn!("No browser or URL opener found; running headless");
                status::line(Phase::Warning, "No browser found, running headless");
                self.print_info();
            }
        }
    }

    fn print_info(&self) {
        status::line(Phase::Ready, "Display server is running");
        status::detail("control", self.config.control_url());
        status::detail("display", self.config.display_url());
        if let Some(url) = lan_url(self.config.port) {
            status::detail("network", url);
        }
    }

    /// Signals the server, then the browser, then helpers; reaps each one
    /// within the grace period and kills stragglers. Safe to call twice.
    pub async fn shutdown(&mut self) {
        if self.state == SupervisorState::Exited {
            return;
        }
        self.state = SupervisorState::ShuttingDown;
        status::line(Phase::ShuttingDown, "Shutting down...");

        let mut children: Vec<Box<dyn ManagedProcess>> = self
            .server
            .take()
            .into_iter()
            .chain(self.browser.take())
            .chain(self.helpers.drain(..))
            .collect();

        for child in children.iter_mut() {
            if let Err(e) = child.terminate() {
                tracing::debug!(process = %child.label(), error = %e, "SIGTERM failed");
            }
        }

        for child in children.iter_mut() {
            match process::reap(child.as_mut(), self.grace).await {
                Some(exit) => {
                    tracing::debug!(process = %child.label(), code = ?exit.code, "Reaped")
                }
                None => tracing::warn!(process = %child.label(), "Could not reap process"),
            }
        }

        self.state = SupervisorState::Exited;
        status::line(Phase::Stopped, "All processes stopped");
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.state == SupervisorState::Exited {
            return;
        }
        let children = self
            .server
            .iter_mut()
            .chain(self.browser.iter_mut())
            .chain(self.helpers.iter_mut());
        for child in children {
            let _ = child.terminate();
        }
    }
}

fn lan_url(port: u16) -> Option<String> {
    let host = hostname::get().ok()?;
    let host = host.to_string_lossy();
    if host.is_empty() {
        return None;
    }
    Some(format!("http://{host}.local:{port}/"))
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
