// ABOUTME: Test doubles for processes, launchers and readiness probes
// ABOUTME: Lets supervisor behaviour be checked without spawning real children

use crate::error::{Result, SupervisorError};
use crate::process::{LaunchSpec, ManagedProcess, ProcessExit, ProcessLauncher};
use crate::readiness::ReadinessProbe;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

struct FakeShared {
    exit: watch::Sender<Option<ProcessExit>>,
    terminated: AtomicU32,
    killed: AtomicU32,
    ignore_term: AtomicBool,
}

/// Observes and drives a [`FakeProcess`] from the test body.
#[derive(Clone)]
pub(crate) struct FakeHandle {
    shared: Arc<FakeShared>,
}

impl FakeHandle {
    pub(crate) fn exit_with(&self, code: Option<i32>) {
        self.shared.exit.send_replace(Some(ProcessExit { code }));
    }

    pub(crate) fn terminated(&self) -> u32 {
        self.shared.terminated.load(Ordering::SeqCst)
    }

    pub(crate) fn killed(&self) -> u32 {
        self.shared.killed.load(Ordering::SeqCst)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.shared.exit.borrow().is_none()
    }

    pub(crate) fn ignore_term(&self) {
        self.shared.ignore_term.store(true, Ordering::SeqCst);
    }
}

/// In-memory process: exits when terminated, killed, or told to.
pub(crate) struct FakeProcess {
    label: String,
    pid: u32,
    shared: Arc<FakeShared>,
}

impl FakeProcess {
    pub(crate) fn running(label: &str) -> (Self, FakeHandle) {
        static NEXT_PID: AtomicU32 = AtomicU32::new(1000);
        let (exit, _) = watch::channel(None);
        let shared = Arc::new(FakeShared {
            exit,
            terminated: AtomicU32::new(0),
            killed: AtomicU32::new(0),
            ignore_term: AtomicBool::new(false),
        });
        let process = Self {
            label: label.to_string(),
            pid: NEXT_PID.fetch_add(1, Ordering::SeqCst),
            shared: shared.clone(),
        };
        (process, FakeHandle { shared })
    }
}

#[async_trait]
impl ManagedProcess for FakeProcess {
    fn label(&self) -> &str {
        &self.label
    }

    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_alive(&mut self) -> bool {
        self.shared.exit.borrow().is_none()
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.shared.terminated.fetch_add(1, Ordering::SeqCst);
        if !self.shared.ignore_term.load(Ordering::SeqCst) {
            self.shared.exit.send_if_modified(|exit| {
                if exit.is_none() {
                    *exit = Some(ProcessExit { code: None });
                    true
                } else {
                    false
                }
            });
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.shared.killed.fetch_add(1, Ordering::SeqCst);
        self.shared.exit.send_if_modified(|exit| {
            if exit.is_none() {
                *exit = Some(ProcessExit { code: None });
                true
            } else {
                false
            }
        });
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<ProcessExit> {
        let mut rx = self.shared.exit.subscribe();
        loop {
            if let Some(exit) = *rx.borrow_and_update() {
                return Ok(exit);
            }
            rx.changed()
                .await
                .map_err(|_| io::Error::other("fake process channel closed"))?;
        }
    }
}

#[derive(Default)]
struct LauncherState {
    specs: Vec<LaunchSpec>,
    handles: Vec<(String, FakeHandle)>,
}

/// Launcher that records every spawn and hands out fake processes.
#[derive(Clone, Default)]
pub(crate) struct FakeLauncher {
    state: Arc<Mutex<LauncherState>>,
    failing: HashSet<String>,
    exiting: HashMap<String, Option<i32>>,
    stubborn: HashSet<String>,
}

impl FakeLauncher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawns with this label fail.
    pub(crate) fn failing(mut self, label: &str) -> Self {
        self.failing.insert(label.to_string());
        self
    }

    /// Processes with this label exit on their own right away.
    pub(crate) fn exiting(mut self, label: &str, code: Option<i32>) -> Self {
        self.exiting.insert(label.to_string(), code);
        self
    }

    /// Processes with this label ignore SIGTERM.
    pub(crate) fn ignoring_term(mut self, label: &str) -> Self {
        self.stubborn.insert(label.to_string());
        self
    }

    pub(crate) fn specs(&self) -> Vec<LaunchSpec> {
        self.state.lock().unwrap().specs.clone()
    }

    pub(crate) fn labels(&self) -> Vec<String> {
        self.specs().into_iter().map(|s| s.label).collect()
    }

    pub(crate) fn spawn_count(&self, label: &str) -> usize {
        self.labels().iter().filter(|l| l.as_str() == label).count()
    }

    pub(crate) fn handle(&self, label: &str) -> Option<FakeHandle> {
        self.state
            .lock()
            .unwrap()
            .handles
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, h)| h.clone())
    }
}

impl ProcessLauncher for FakeLauncher {
    fn spawn(&self, spec: &LaunchSpec) -> Result<Box<dyn ManagedProcess>> {
        let mut state = self.state.lock().unwrap();
        state.specs.push(spec.clone());

        if self.failing.contains(&spec.label) {
            return Err(SupervisorError::Spawn {
                label: spec.label.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "fake spawn failure"),
            });
        }

        let (process, handle) = FakeProcess::running(&spec.label);
        if let Some(code) = self.exiting.get(&spec.label) {
            handle.exit_with(*code);
        }
        if self.stubborn.contains(&spec.label) {
            handle.ignore_term();
        }
        state.handles.push((spec.label.clone(), handle));
        Ok(Box::new(process))
    }
}

/// Probe that answers from attempt `ready_on` onwards.
pub(crate) struct CountingProbe {
    calls: AtomicU32,
    ready_on: Option<u32>,
}

impl CountingProbe {
    pub(crate) fn ready_on(attempt: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            ready_on: Some(attempt),
        }
    }

    pub(crate) fn never() -> Self {
        Self {
            calls: AtomicU32::new(0),
            ready_on: None,
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadinessProbe for CountingProbe {
    fn target(&self) -> &str {
        "http://localhost:5000/api/state"
    }

    async fn probe(&self) -> bool {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.ready_on.is_some_and(|k| call >= k)
    }
}
