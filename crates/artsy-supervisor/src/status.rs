// ABOUTME: Operator-facing status lines
// ABOUTME: One colored line per supervisor phase on stdout, separate from tracing logs

use colored::{ColoredString, Colorize};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Waiting,
    Ready,
    Running,
    ShuttingDown,
    Stopped,
    Warning,
    Failed,
}

impl Phase {
    pub fn tag(&self) -> &'static str {
        match self {
            Phase::Starting => "[start]",
            Phase::Waiting => "[wait]",
            Phase::Ready => "[ready]",
            Phase::Running => "[run]",
            Phase::ShuttingDown => "[stop]",
            Phase::Stopped => "[done]",
            Phase::Warning => "[warn]",
            Phase::Failed => "[fail]",
        }
    }

    fn colored_tag(&self) -> ColoredString {
        let tag = self.tag();
        match self {
            Phase::Starting | Phase::Waiting => tag.cyan(),
            Phase::Ready | Phase::Running => tag.green().bold(),
            Phase::ShuttingDown | Phase::Stopped => tag.dimmed(),
            Phase::Warning => tag.yellow().bold(),
            Phase::Failed => tag.red().bold(),
        }
    }
}

/// Prints one status line.
pub fn line(phase: Phase, message: impl AsRef<str>) {
    println!("{} {}", phase.colored_tag(), message.as_ref());
}

/// Prints a fatal error line on stderr.
pub fn failure(message: impl AsRef<str>) {
    eprintln!("{} {}", Phase::Failed.colored_tag(), message.as_ref());
}

/// Prints a progress dot for a missed readiness poll.
pub fn tick() {
    print!("{}", ".".dimmed());
    let _ = std::io::stdout().flush();
}

/// Ends a run of progress dots.
pub fn end_ticks() {
    println!();
}

/// Prints an indented detail line under the last status line.
pub fn detail(label: &str, value: impl AsRef<str>) {
    println!("  {:<9} {}", label, value.as_ref().cyan());
}
