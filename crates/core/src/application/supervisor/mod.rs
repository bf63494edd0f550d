// Supervisor - service lifecycle behind a PID file
//
// start / stop / restart / status. Detaching from the terminal is delegated
// to a HostMode so the lifecycle logic is the same in both hosting modes.

mod pid_file;

pub use pid_file::{PidFile, PidFileGuard, PidFileState};

use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::application::panic_guard::{execute_guarded, PanicGuardResult};
use crate::error::Result;
use crate::port::{Detached, HostMode, ProcessControl, Signalled, SupervisorError};

/// Default wait for a graceful stop before the forced kill
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Exit code of a hosted loop that failed or panicked
pub const FAILURE_EXIT_CODE: i32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorPhase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub pid_file: PathBuf,
    /// Graceful wait after SIGTERM
    pub stop_timeout: Duration,
    /// Liveness polling interval while stopping
    pub poll_interval: Duration,
}

impl SupervisorConfig {
    pub fn new(pid_file: impl Into<PathBuf>) -> Self {
        Self {
            pid_file: pid_file.into(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            poll_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupervisorStatus {
    pub pid: Option<u32>,
    pub running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// This process is the parent of a detached host; it should just exit
    Detached,
    /// The hosted loop ran in this process and finished
    Exited { code: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No PID file
    NotRunning,
    /// A live process was terminated
    Stopped { pid: u32, forced: bool },
    /// The PID file named no live process and was removed
    StaleCleaned { pid: Option<u32> },
}

pub struct Supervisor {
    config: SupervisorConfig,
    pid_file: PidFile,
    control: Arc<dyn ProcessControl>,
    phase: Mutex<SupervisorPhase>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, control: Arc<dyn ProcessControl>) -> Self {
        let pid_file = PidFile::new(config.pid_file.clone());
        Self {
            config,
            pid_file,
            control,
            phase: Mutex::new(SupervisorPhase::Stopped),
        }
    }

    pub fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.phase
            .lock()
            .map(|p| *p)
            .unwrap_or(SupervisorPhase::Stopped)
    }

    fn set_phase(&self, phase: SupervisorPhase) {
        if let Ok(mut current) = self.phase.lock() {
            *current = phase;
        }
    }

    /// Live iff the PID file holds a PID and that process exists
    pub fn status(&self) -> Result<SupervisorStatus> {
        Ok(match self.pid_file.read()? {
            PidFileState::Pid(pid) => SupervisorStatus {
                pid: Some(pid),
                running: self.control.is_alive(pid),
            },
            PidFileState::Absent | PidFileState::Invalid => SupervisorStatus {
                pid: None,
                running: false,
            },
        })
    }

    /// Host `run` behind the PID file
    ///
    /// Refuses when another live process holds the PID file unless
    /// `overwrite` is set. On the host side of a detach, the PID file is
    /// claimed, `run` executes under a panic guard and the PID file is
    /// released on every exit path. A failed or panicking loop is logged and
    /// reported as exit code 255; it is never restarted here.
    ///
    /// # Errors
    /// - SupervisorError::AlreadyRunning if a live process holds the PID file
    /// - SupervisorError::PidFile / Detach if the host cannot be set up
    pub fn start<F>(&self, host: &dyn HostMode, overwrite: bool, run: F) -> Result<StartOutcome>
    where
        F: FnOnce() -> Result<()>,
    {
        self.set_phase(SupervisorPhase::Starting);
        let outcome = self.start_inner(host, overwrite, run);
        self.set_phase(SupervisorPhase::Stopped);
        outcome
    }

    fn start_inner<F>(&self, host: &dyn HostMode, overwrite: bool, run: F) -> Result<StartOutcome>
    where
        F: FnOnce() -> Result<()>,
    {
        let own_pid = self.control.current_pid();
        match self.pid_file.read()? {
            PidFileState::Pid(pid) if pid != own_pid && self.control.is_alive(pid) => {
                if !overwrite {
                    return Err(SupervisorError::AlreadyRunning {
                        pid,
                        pid_file: self.config.pid_file.clone(),
                    }
                    .into());
                }
                warn!(pid, "Overwriting PID file held by a live process");
            }
            PidFileState::Pid(pid) => {
                info!(pid, "Removing stale PID file");
                self.pid_file.remove()?;
            }
            PidFileState::Invalid => {
                warn!(path = %self.config.pid_file.display(), "Removing unreadable PID file");
                self.pid_file.remove()?;
            }
            PidFileState::Absent => {}
        }

        if host.detach()? == Detached::Parent {
            return Ok(StartOutcome::Detached);
        }

        // After a detach the pid has changed
        let pid = self.control.current_pid();
        let _guard = self.pid_file.claim(pid)?;
        self.set_phase(SupervisorPhase::Running);
        // The hosted loop announces itself once its own logging is up
        debug!(pid, mode = host.name(), pid_file = %self.config.pid_file.display(), "PID file claimed");

        let code = match execute_guarded(AssertUnwindSafe(run)) {
            PanicGuardResult::Success(Ok(())) => {
                info!(pid, "Service exited");
                0
            }
            PanicGuardResult::Success(Err(e)) => {
                error!(pid, error = %e, details = ?e, "Service failed");
                FAILURE_EXIT_CODE
            }
            PanicGuardResult::Panicked(msg) => {
                error!(pid, panic_msg = %msg, "Service crashed, not restarting");
                FAILURE_EXIT_CODE
            }
        };
        self.set_phase(SupervisorPhase::Stopping);
        Ok(StartOutcome::Exited { code })
    }

    /// Stop the process named by the PID file
    ///
    /// Not running is an outcome, not an error. SIGTERM first; after
    /// `stop_timeout` a SIGKILL. The PID file is removed once the process is
    /// confirmed gone.
    ///
    /// # Errors
    /// - SupervisorError::StillRunning if the process survives SIGKILL
    /// - SupervisorError::Signal / PidFile on OS failures
    pub fn stop(&self) -> Result<StopOutcome> {
        let pid = match self.pid_file.read()? {
            PidFileState::Absent => {
                info!("Service is not running");
                return Ok(StopOutcome::NotRunning);
            }
            PidFileState::Invalid => {
                self.pid_file.remove()?;
                return Ok(StopOutcome::StaleCleaned { pid: None });
            }
            PidFileState::Pid(pid) => pid,
        };

        if !self.control.is_alive(pid) {
            info!(pid, "Process already gone, removing stale PID file");
            self.pid_file.remove()?;
            return Ok(StopOutcome::StaleCleaned { pid: Some(pid) });
        }

        self.set_phase(SupervisorPhase::Stopping);
        let outcome = self.terminate(pid);
        self.set_phase(SupervisorPhase::Stopped);
        outcome
    }

    fn terminate(&self, pid: u32) -> Result<StopOutcome> {
        info!(pid, "Sending SIGTERM");
        if self.control.terminate(pid)? == Signalled::AlreadyGone {
            self.pid_file.remove()?;
            return Ok(StopOutcome::Stopped { pid, forced: false });
        }
        if self.wait_gone(pid, self.config.stop_timeout) {
            self.pid_file.remove()?;
            info!(pid, "Service stopped");
            return Ok(StopOutcome::Stopped { pid, forced: false });
        }

        warn!(pid, timeout_ms = self.config.stop_timeout.as_millis() as u64, "Graceful stop timed out, sending SIGKILL");
        self.control.force_kill(pid)?;
        if self.wait_gone(pid, self.config.stop_timeout) {
            self.pid_file.remove()?;
            info!(pid, "Service killed");
            return Ok(StopOutcome::Stopped { pid, forced: true });
        }

        error!(pid, "Process survived SIGKILL");
        Err(SupervisorError::StillRunning(pid).into())
    }

    fn wait_gone(&self, pid: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.control.is_alive(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// `stop()` then `start()`
    pub fn restart<F>(&self, host: &dyn HostMode, run: F) -> Result<StartOutcome>
    where
        F: FnOnce() -> Result<()>,
    {
        let stopped = self.stop()?;
        info!(outcome = ?stopped, "Restarting service");
        self.start(host, false, run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::port::process_control::mocks::{MockProcessControl, Reaction};
    use crate::port::ForegroundHost;

    const OWN_PID: u32 = 100;

    fn supervisor(dir: &std::path::Path) -> (Supervisor, Arc<MockProcessControl>) {
        let control = Arc::new(MockProcessControl::new(OWN_PID));
        let config = SupervisorConfig {
            pid_file: dir.join("nbapp.pid"),
            stop_timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
        };
        (Supervisor::new(config, control.clone()), control)
    }

    struct ParentSide;

    impl HostMode for ParentSide {
        fn name(&self) -> &'static str {
            "parent"
        }

        fn detach(&self) -> std::result::Result<Detached, SupervisorError> {
            Ok(Detached::Parent)
        }
    }

    #[test]
    fn test_foreground_start_claims_and_releases_pid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (sup, _) = supervisor(tmp.path());

        let outcome = sup
            .start(&ForegroundHost, false, || {
                let status = sup.status().unwrap();
                assert_eq!(status.pid, Some(OWN_PID));
                assert!(status.running);
                assert_eq!(sup.phase(), SupervisorPhase::Running);
                Ok(())
            })
            .unwrap();

        assert_eq!(outcome, StartOutcome::Exited { code: 0 });
        assert_eq!(sup.pid_file().read().unwrap(), PidFileState::Absent);
        assert_eq!(sup.phase(), SupervisorPhase::Stopped);
    }

    #[test]
    fn test_start_refuses_live_holder() {
        let tmp = tempfile::tempdir().unwrap();
        let (sup, control) = supervisor(tmp.path());
        control.spawn(200, Reaction::Graceful);
        sup.pid_file().write(200).unwrap();

        let err = sup.start(&ForegroundHost, false, || Ok(())).unwrap_err();
        assert!(matches!(
            err,
            AppError::Supervisor(SupervisorError::AlreadyRunning { pid: 200, .. })
        ));
        assert_eq!(sup.pid_file().read().unwrap(), PidFileState::Pid(200));

        let outcome = sup.start(&ForegroundHost, true, || Ok(())).unwrap();
        assert_eq!(outcome, StartOutcome::Exited { code: 0 });
    }

    #[test]
    fn test_start_replaces_stale_pid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (sup, _) = supervisor(tmp.path());
        sup.pid_file().write(999).unwrap();

        let outcome = sup.start(&ForegroundHost, false, || Ok(())).unwrap();
        assert_eq!(outcome, StartOutcome::Exited { code: 0 });
    }

    #[test]
    fn test_parent_side_of_detach_returns_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let (sup, _) = supervisor(tmp.path());
        let outcome = sup
            .start(&ParentSide, false, || panic!("must not run in the parent"))
            .unwrap();
        assert_eq!(outcome, StartOutcome::Detached);
        assert_eq!(sup.pid_file().read().unwrap(), PidFileState::Absent);
    }

    #[test]
    fn test_crash_is_logged_not_respawned() {
        let tmp = tempfile::tempdir().unwrap();
        let (sup, _) = supervisor(tmp.path());
        let mut runs = 0;

        let outcome = sup
            .start(&ForegroundHost, false, || {
                runs += 1;
                panic!("listener died")
            })
            .unwrap();

        assert_eq!(outcome, StartOutcome::Exited { code: FAILURE_EXIT_CODE });
        assert_eq!(runs, 1);
        assert_eq!(sup.pid_file().read().unwrap(), PidFileState::Absent);

        let failed = sup
            .start(&ForegroundHost, false, || Err(AppError::Config("bad port".into())))
            .unwrap();
        assert_eq!(failed, StartOutcome::Exited { code: FAILURE_EXIT_CODE });
    }

    #[test]
    fn test_stop_when_not_running_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let (sup, control) = supervisor(tmp.path());
        assert_eq!(sup.stop().unwrap(), StopOutcome::NotRunning);
        assert_eq!(sup.stop().unwrap(), StopOutcome::NotRunning);
        assert!(control.signals().is_empty());
    }

    #[test]
    fn test_stop_graceful() {
        let tmp = tempfile::tempdir().unwrap();
        let (sup, control) = supervisor(tmp.path());
        control.spawn(300, Reaction::Graceful);
        sup.pid_file().write(300).unwrap();
        assert!(sup.status().unwrap().running);

        assert_eq!(
            sup.stop().unwrap(),
            StopOutcome::Stopped {
                pid: 300,
                forced: false
            }
        );
        assert_eq!(control.signals(), vec![(300, "TERM")]);
        assert_eq!(
            sup.status().unwrap(),
            SupervisorStatus {
                pid: None,
                running: false
            }
        );
    }

    #[test]
    fn test_stop_escalates_to_kill() {
        let tmp = tempfile::tempdir().unwrap();
        let (sup, control) = supervisor(tmp.path());
        control.spawn(301, Reaction::Stubborn);
        sup.pid_file().write(301).unwrap();

        assert_eq!(
            sup.stop().unwrap(),
            StopOutcome::Stopped {
                pid: 301,
                forced: true
            }
        );
        assert_eq!(control.signals(), vec![(301, "TERM"), (301, "KILL")]);
        assert_eq!(sup.pid_file().read().unwrap(), PidFileState::Absent);
    }

    #[test]
    fn test_stop_unkillable_keeps_pid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (sup, control) = supervisor(tmp.path());
        control.spawn(302, Reaction::Unkillable);
        sup.pid_file().write(302).unwrap();

        let err = sup.stop().unwrap_err();
        assert!(matches!(err, AppError::Supervisor(SupervisorError::StillRunning(302))));
        assert_eq!(sup.pid_file().read().unwrap(), PidFileState::Pid(302));
    }

    #[test]
    fn test_stop_cleans_stale_pid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (sup, control) = supervisor(tmp.path());
        sup.pid_file().write(404).unwrap();

        assert_eq!(sup.stop().unwrap(), StopOutcome::StaleCleaned { pid: Some(404) });
        assert!(control.signals().is_empty());
        assert_eq!(sup.pid_file().read().unwrap(), PidFileState::Absent);

        std::fs::write(sup.pid_file().path(), "not a pid").unwrap();
        assert_eq!(sup.stop().unwrap(), StopOutcome::StaleCleaned { pid: None });
    }

    #[test]
    fn test_restart_stops_then_starts() {
        let tmp = tempfile::tempdir().unwrap();
        let (sup, control) = supervisor(tmp.path());
        control.spawn(500, Reaction::Graceful);
        sup.pid_file().write(500).unwrap();

        let outcome = sup.restart(&ForegroundHost, || Ok(())).unwrap();
        assert_eq!(outcome, StartOutcome::Exited { code: 0 });
        assert_eq!(control.signals(), vec![(500, "TERM")]);
        assert!(!control.is_alive(500));
    }
}
