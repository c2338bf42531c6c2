// ABOUTME: artsy supervisor library: config, process handles, readiness, kiosk, supervisor
// ABOUTME: Re-exports for the artsy binary and for embedding the supervisor elsewhere

pub mod config;
pub mod error;
pub mod kiosk;
pub mod locator;
pub mod process;
pub mod readiness;
pub mod status;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Cli, Config, Mode, ServerCommand};
pub use error::{Result, SupervisorError};
pub use locator::{ProgramLocator, SystemLocator};
pub use process::{LaunchSpec, ManagedProcess, ProcessExit, ProcessLauncher, TokioLauncher};
pub use readiness::{HttpProbe, PollPolicy, Readiness, ReadinessProbe};
pub use supervisor::{shutdown_signal, Outcome, Supervisor, SupervisorState};
