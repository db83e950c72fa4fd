//! World shared by the service lifecycle scenarios.

use std::fs;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::MutexGuard;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tempfile::TempDir;

use crate::handle::{RemoteStop, ServiceHandle};
use crate::test_support::session_guard;

pub(super) type StepResult = Result<(), String>;

/// Pause poll interval used by every scenario.
pub(super) const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Observations gathered while the service ran.
#[derive(Debug, Default)]
pub(super) struct Observations {
    pub(super) ran: Option<bool>,
    pub(super) invocations: u64,
    pub(super) invocations_at_stop: Option<u64>,
    pub(super) invocations_while_paused: Option<u64>,
    pub(super) held_while_paused: Option<bool>,
}

/// Result of a remote stop request and how long it took.
#[derive(Debug)]
pub(super) struct StopAttempt {
    pub(super) outcome: RemoteStop,
    pub(super) elapsed: Duration,
    pub(super) timeout: Duration,
}

pub(super) struct ServiceWorld {
    _guard: MutexGuard<'static, ()>,
    temp: TempDir,
    pub(super) handle: ServiceHandle,
    pub(super) observed: Observations,
    pub(super) stop_attempt: Option<StopAttempt>,
    reaper: Option<JoinHandle<()>>,
    stubborn: Option<Child>,
}

impl ServiceWorld {
    pub(super) fn new() -> Self {
        let guard = session_guard();
        let temp = TempDir::new().expect("temp dir");
        let handle = ServiceHandle::new("worker", temp.path())
            .expect("handle")
            .with_poll_interval(POLL_INTERVAL);
        Self {
            _guard: guard,
            temp,
            handle,
            observed: Observations::default(),
            stop_attempt: None,
            reaper: None,
            stubborn: None,
        }
    }

    /// Rebuilds the handle so that it uses the touch-file trap.
    pub(super) fn use_touch_file(&mut self) -> StepResult {
        self.handle = ServiceHandle::new("worker", self.temp.path())
            .map_err(|error| error.to_string())?
            .with_touch_file(POLL_INTERVAL)
            .with_poll_interval(POLL_INTERVAL);
        Ok(())
    }

    /// Spawns a child that behaves like a touch-file holder: it waits for the
    /// termination flag, consumes it and exits.
    pub(super) fn record_touch_file_holder(&mut self) -> StepResult {
        let term = self.handle.identity().term_path();
        let mut child = Command::new("sh")
            .args([
                "-c",
                "while [ ! -e \"$1\" ]; do sleep 0.02; done; rm -f \"$1\"",
                "holder",
            ])
            .arg(&term)
            .spawn()
            .map_err(|error| format!("spawn sh: {error}"))?;
        self.write_record(child.id())?;
        self.reaper = Some(thread::spawn(move || {
            child.wait().ok();
        }));
        Ok(())
    }

    /// Spawns a child that dies on `SIGTERM`, reaped by a background thread
    /// so that its PID disappears as soon as it exits.
    pub(super) fn record_exiting_holder(&mut self) -> StepResult {
        let mut child = Command::new("sleep")
            .arg("30")
            .spawn()
            .map_err(|error| format!("spawn sleep: {error}"))?;
        self.write_record(child.id())?;
        self.reaper = Some(thread::spawn(move || {
            child.wait().ok();
        }));
        Ok(())
    }

    /// Spawns a child that ignores `SIGTERM` and waits until the
    /// disposition is in place.
    pub(super) fn record_stubborn_holder(&mut self) -> StepResult {
        let mut child = Command::new("sh")
            .args(["-c", "trap '' TERM; echo ready; exec sleep 30"])
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|error| format!("spawn sh: {error}"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "child stdout not captured".to_string())?;
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .map_err(|error| format!("read readiness: {error}"))?;
        if line.trim() != "ready" {
            return Err(format!("unexpected readiness line: {line:?}"));
        }
        self.write_record(child.id())?;
        self.stubborn = Some(child);
        Ok(())
    }

    fn write_record(&self, pid: u32) -> StepResult {
        let path = self.handle.identity().record_path();
        fs::write(&path, format!("{pid}\n"))
            .map_err(|error| format!("write {}: {error}", path.display()))
    }
}

impl Drop for ServiceWorld {
    fn drop(&mut self) {
        if let Some(mut child) = self.stubborn.take() {
            child.kill().ok();
            child.wait().ok();
        }
        if let Some(reaper) = self.reaper.take()
            && reaper.is_finished()
        {
            reaper.join().ok();
        }
    }
}
