// ABOUTME: Shared logging setup for artsy binaries
// ABOUTME: init() logs to stderr with INFO for artsy crates and WARN for dependencies

use tracing_subscriber::EnvFilter;

/// Directives used when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_DIRECTIVES: &str = "warn,artsy=info,artsy_supervisor=info,artsy_log=info";

/// Builds the filter: `RUST_LOG` wins when it parses, otherwise
/// [`DEFAULT_DIRECTIVES`].
pub fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Standard logging to stderr.
/// Stdout is left to the operator-facing status lines.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
