// ABOUTME: Program discovery on PATH
// ABOUTME: Lets kiosk and prerequisite checks run against a fixed program set in tests

use std::path::PathBuf;

/// Finds executables by name.
pub trait ProgramLocator: Send + Sync {
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Looks programs up on the real PATH.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLocator;

impl ProgramLocator for SystemLocator {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}
