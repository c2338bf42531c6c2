// ABOUTME: Command-line and environment resolution for the supervisor
// ABOUTME: Produces an immutable Config and prepares the data directory layout

use crate::error::{Result, SupervisorError};
use crate::locator::ProgramLocator;
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Port the display server listens on.
pub const PORT: u16 = 5000;

/// Environment variable carrying the data directory, read here and
/// exported to the server.
pub const DATA_DIR_ENV: &str = "ARTSY_DATA_DIR";

/// Environment variable overriding the server command line.
pub const SERVER_CMD_ENV: &str = "ARTSY_SERVER_CMD";

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_SERVER_CMD: &str = "python3 app.py";

pub const IMAGES_DIR: &str = "images";
pub const TEMP_DIR: &str = "temp";

#[derive(Parser, Debug)]
#[command(name = "artsy", version)]
#[command(about = "Run the artsy display server and, optionally, a kiosk browser")]
pub struct Cli {
    /// Directory holding images/ and temp/
    #[arg(long, value_name = "PATH", env = DATA_DIR_ENV)]
    pub data_dir: Option<PathBuf>,

    /// Run a full-screen browser on the display route once the server is up
    #[arg(value_enum, value_name = "MODE")]
    pub mode: Option<Mode>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Kiosk,
}

impl Cli {
    /// Parses an argument list (program name first).
    pub fn try_parse_args<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)
    }
}

/// Exit code for a clap parse failure. Help and version requests are not
/// failures; everything else is a usage error.
pub fn usage_exit_code(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

/// Program and arguments used to start the display server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ServerCommand {
    /// Splits a whitespace-separated command line.
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(SupervisorError::EmptyServerCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Resolves the program on PATH. A missing interpreter is fatal before
    /// anything is spawned.
    pub fn resolve(&self, locator: &dyn ProgramLocator) -> Result<PathBuf> {
        locator
            .locate(&self.program)
            .ok_or_else(|| SupervisorError::MissingPrerequisite {
                program: self.program.clone(),
            })
    }
}

impl Default for ServerCommand {
    fn default() -> Self {
        // DEFAULT_SERVER_CMD is never empty
        Self {
            program: "python3".to_string(),
            args: vec!["app.py".to_string()],
        }
    }
}

/// Resolved supervisor configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub kiosk: bool,
    pub server: ServerCommand,
}

impl Config {
    /// Resolves configuration from parsed arguments and the process
    /// environment.
    pub fn resolve(cli: Cli) -> Result<Self> {
        let server_line = std::env::var(SERVER_CMD_ENV).ok();
        Self::from_parts(cli, server_line.as_deref())
    }

    /// Resolves configuration from parsed arguments and an optional server
    /// command line.
    pub fn from_parts(cli: Cli, server_line: Option<&str>) -> Result<Self> {
        let data_dir = cli
            .data_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let data_dir = std::path::absolute(&data_dir).map_err(|source| {
            SupervisorError::DataDir {
                path: data_dir.clone(),
                source,
            }
        })?;

        let server = match server_line {
            Some(line) => ServerCommand::parse(line)?,
            None => ServerCommand::default(),
        };

        Ok(Self {
            port: PORT,
            data_dir,
            kiosk: cli.mode == Some(Mode::Kiosk),
            server,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// URL handed to the kiosk browser.
    pub fn display_url(&self) -> String {
        format!("{}/display", self.base_url())
    }

    /// URL polled for readiness.
    pub fn readiness_url(&self) -> String {
        format!("{}/api/state", self.base_url())
    }

    /// Mobile control panel served at the root route.
    pub fn control_url(&self) -> String {
        format!("{}/", self.base_url())
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join(IMAGES_DIR)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.data_dir.join(TEMP_DIR)
    }

    /// Creates `images/` and `temp/` under the data directory. Existing
    /// directories and their contents are left alone.
    pub fn prepare_data_dir(&self) -> Result<()> {
        for dir in [self.images_dir(), self.temp_dir()] {
            create_dir(&dir)?;
        }
        Ok(())
    }

    /// Environment exported to the server process.
    pub fn server_env(&self) -> Vec<(String, String)> {
        vec![(
            DATA_DIR_ENV.to_string(),
            self.data_dir.to_string_lossy().into_owned(),
        )]
    }
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| SupervisorError::DataDir {
        path: path.to_path_buf(),
        source,
    })
}
