// ABOUTME: Kiosk display setup and browser discovery
// ABOUTME: Optional desktop capabilities resolved by name; anything missing is skipped, never fatal

use crate::locator::ProgramLocator;
use crate::process::{LaunchSpec, ManagedProcess, ProcessLauncher};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// How long a one-shot setup command may run.
const SETUP_TIMEOUT: Duration = Duration::from_secs(5);

const CHROMIUM_KIOSK_ARGS: &[&str] = &[
    "--kiosk",
    "--noerrdialogs",
    "--disable-infobars",
    "--disable-session-crashed-bubble",
    "--incognito",
];

/// A program that may provide a capability, with its fixed arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

/// Full-screen browsers, most preferred first.
pub const BROWSERS: &[Candidate] = &[
    Candidate {
        program: "chromium-browser",
        args: CHROMIUM_KIOSK_ARGS,
    },
    Candidate {
        program: "chromium",
        args: CHROMIUM_KIOSK_ARGS,
    },
    Candidate {
        program: "google-chrome",
        args: CHROMIUM_KIOSK_ARGS,
    },
    Candidate {
        program: "firefox",
        args: &["--kiosk"],
    },
];

/// Generic URL openers used when no kiosk browser is installed.
pub const OPENERS: &[Candidate] = &[
    Candidate {
        program: "xdg-open",
        args: &[],
    },
    Candidate {
        program: "open",
        args: &[],
    },
];

/// A resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    fn from_candidate(candidate: &Candidate, path: PathBuf, extra: Option<&str>) -> Self {
        let mut args: Vec<String> = candidate.args.iter().map(|a| a.to_string()).collect();
        args.extend(extra.map(str::to_string));
        Self {
            program: path,
            args,
        }
    }

    fn spec(&self, label: &str) -> LaunchSpec {
        LaunchSpec::new(label, self.program.clone())
            .args(self.args.iter().cloned())
            .envs(display_env())
    }
}

/// How a capability's invocations are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Run each invocation to completion before continuing
    Setup,
    /// Keep running next to the browser; torn down at shutdown
    Helper,
    /// The kiosk browser itself
    Display,
}

type Discover = fn(&dyn ProgramLocator, &str) -> Option<Vec<Invocation>>;

/// A named optional feature. `discover` returns `None` when nothing on
/// this machine provides it.
#[derive(Clone, Copy)]
pub struct Capability {
    pub name: &'static str,
    pub role: Role,
    discover: Discover,
}

impl Capability {
    pub fn discover(&self, locator: &dyn ProgramLocator, url: &str) -> Option<Vec<Invocation>> {
        (self.discover)(locator, url)
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("role", &self.role)
            .finish()
    }
}

pub const SCREEN_BLANKING: Capability = Capability {
    name: "screen-blanking",
    role: Role::Setup,
    discover: discover_screen_blanking,
};

pub const HIDE_POINTER: Capability = Capability {
    name: "hide-pointer",
    role: Role::Helper,
    discover: discover_hide_pointer,
};

pub const BROWSER: Capability = Capability {
    name: "browser",
    role: Role::Display,
    discover: discover_browser,
};

/// Desktop adjustments applied before the browser starts.
pub const DESKTOP_CAPABILITIES: &[Capability] = &[SCREEN_BLANKING, HIDE_POINTER];

fn discover_screen_blanking(locator: &dyn ProgramLocator, _url: &str) -> Option<Vec<Invocation>> {
    let xset = locator.locate("xset")?;
    let steps: &[&[&str]] = &[&["s", "off"], &["-dpms"], &["s", "noblank"]];
    Some(
        steps
            .iter()
            .map(|args| Invocation {
                program: xset.clone(),
                args: args.iter().map(|a| a.to_string()).collect(),
            })
            .collect(),
    )
}

fn discover_hide_pointer(locator: &dyn ProgramLocator, _url: &str) -> Option<Vec<Invocation>> {
    let unclutter = locator.locate("unclutter")?;
    Some(vec![Invocation {
        program: unclutter,
        args: vec!["-idle".into(), "0.5".into(), "-root".into()],
    }])
}

fn discover_browser(locator: &dyn ProgramLocator, url: &str) -> Option<Vec<Invocation>> {
    first_available(BROWSERS, locator)
        .or_else(|| first_available(OPENERS, locator))
        .map(|(candidate, path)| vec![Invocation::from_candidate(candidate, path, Some(url))])
}

fn first_available<'a>(
    candidates: &'a [Candidate],
    locator: &dyn ProgramLocator,
) -> Option<(&'a Candidate, PathBuf)> {
    candidates
        .iter()
        .find_map(|c| locator.locate(c.program).map(|path| (c, path)))
}

/// X display for kiosk children when the supervisor runs outside a
/// desktop session (e.g. over ssh).
fn display_env() -> Vec<(String, String)> {
    if cfg!(target_os = "linux") && std::env::var_os("DISPLAY").is_none() {
        vec![("DISPLAY".to_string(), ":0".to_string())]
    } else {
        Vec::new()
    }
}

/// Applies the desktop capabilities. Setup commands run to completion;
/// helpers are returned so the caller can tear them down.
pub async fn prepare_display(
    launcher: &dyn ProcessLauncher,
    locator: &dyn ProgramLocator,
) -> Vec<Box<dyn ManagedProcess>> {
    let mut helpers = Vec::new();

    for capability in DESKTOP_CAPABILITIES {
        let Some(invocations) = capability.discover(locator, "") else {
            tracing::debug!(capability = capability.name, "Not available, skipping");
            continue;
        };

        for invocation in invocations {
            let label = program_label(&invocation);
            match capability.role {
                Role::Setup => {
                    if let Err(e) = run_to_completion(launcher, &invocation.spec(&label)).await {
                        tracing::warn!(capability = capability.name, "{:#}", e);
                    }
                }
                Role::Helper | Role::Display => match launcher.spawn(&invocation.spec(&label)) {
                    Ok(process) => helpers.push(process),
                    Err(e) => tracing::warn!(capability = capability.name, error = %e, "Failed to start helper"),
                },
            }
        }
    }

    helpers
}

/// Makes exactly one attempt to start a browser on `url`.
///
/// Returns `None` when nothing can show the page; the caller carries on
/// without a visual client.
pub fn launch_browser(
    launcher: &dyn ProcessLauncher,
    locator: &dyn ProgramLocator,
    url: &str,
) -> Option<Box<dyn ManagedProcess>> {
    let invocation = BROWSER.discover(locator, url)?.into_iter().next()?;
    tracing::info!(program = %invocation.program.display(), url, "Launching kiosk browser");

    match launcher.spawn(&invocation.spec("browser")) {
        Ok(process) => Some(process),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to launch kiosk browser");
            None
        }
    }
}

async fn run_to_completion(launcher: &dyn ProcessLauncher, spec: &LaunchSpec) -> Result<()> {
    let mut process = launcher
        .spawn(spec)
        .with_context(|| format!("failed to run {} {}", spec.label, spec.args.join(" ")))?;

    let exit = match tokio::time::timeout(SETUP_TIMEOUT, process.wait()).await {
        Ok(exit) => exit.with_context(|| format!("failed to wait for {}", spec.label))?,
        Err(_) => {
            let _ = process.kill();
            bail!("{} {} timed out", spec.label, spec.args.join(" "));
        }
    };

    if !exit.success() {
        bail!(
            "{} {} exited with {:?}",
            spec.label,
            spec.args.join(" "),
            exit.code
        );
    }
    Ok(())
}

fn program_label(invocation: &Invocation) -> String {
    invocation
        .program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| invocation.program.display().to_string())
}
