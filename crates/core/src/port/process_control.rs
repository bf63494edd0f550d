// Process Control Port
// Signals and liveness checks used by the supervisor

use std::path::PathBuf;
use thiserror::Error;

/// Supervisor errors
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("already running with pid {pid} (pid file {pid_file})")]
    AlreadyRunning { pid: u32, pid_file: PathBuf },

    #[error("pid file {path}: {message}")]
    PidFile { path: PathBuf, message: String },

    #[error("signal to pid {pid} failed: {message}")]
    Signal { pid: u32, message: String },

    #[error("pid {0} is still running after forced termination")]
    StillRunning(u32),

    #[error("detach failed: {0}")]
    Detach(String),
}

/// Result of delivering a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signalled {
    Sent,
    /// No such process
    AlreadyGone,
}

/// Process Control trait
///
/// Implementations:
/// - SystemProcessControl: POSIX signals (sysinfo elsewhere)
/// - MockProcessControl: test double
pub trait ProcessControl: Send + Sync {
    /// PID of the calling process
    fn current_pid(&self) -> u32;

    /// Check if a process currently exists
    fn is_alive(&self, pid: u32) -> bool;

    /// Ask a process to terminate (SIGTERM)
    fn terminate(&self, pid: u32) -> Result<Signalled, SupervisorError>;

    /// Force a process to terminate (SIGKILL)
    fn force_kill(&self, pid: u32) -> Result<Signalled, SupervisorError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// How a mocked process reacts to signals
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Reaction {
        /// Exits on SIGTERM
        Graceful,
        /// Ignores SIGTERM, exits on SIGKILL
        Stubborn,
        /// Survives everything
        Unkillable,
    }

    /// Mock ProcessControl for testing
    pub struct MockProcessControl {
        current: u32,
        processes: Mutex<HashMap<u32, Reaction>>,
        signals: Mutex<Vec<(u32, &'static str)>>,
    }

    impl MockProcessControl {
        pub fn new(current: u32) -> Self {
            let mut processes = HashMap::new();
            processes.insert(current, Reaction::Unkillable);
            Self {
                current,
                processes: Mutex::new(processes),
                signals: Mutex::new(Vec::new()),
            }
        }

        pub fn spawn(&self, pid: u32, reaction: Reaction) {
            self.processes.lock().unwrap().insert(pid, reaction);
        }

        pub fn signals(&self) -> Vec<(u32, &'static str)> {
            self.signals.lock().unwrap().clone()
        }

        fn deliver(&self, pid: u32, name: &'static str, kills: &[Reaction]) -> Signalled {
            self.signals.lock().unwrap().push((pid, name));
            let mut processes = self.processes.lock().unwrap();
            match processes.get(&pid).copied() {
                None => Signalled::AlreadyGone,
                Some(reaction) => {
                    if kills.contains(&reaction) {
                        processes.remove(&pid);
                    }
                    Signalled::Sent
                }
            }
        }
    }

    impl ProcessControl for MockProcessControl {
        fn current_pid(&self) -> u32 {
            self.current
        }

        fn is_alive(&self, pid: u32) -> bool {
            self.processes.lock().unwrap().contains_key(&pid)
        }

        fn terminate(&self, pid: u32) -> Result<Signalled, SupervisorError> {
            Ok(self.deliver(pid, "TERM", &[Reaction::Graceful]))
        }

        fn force_kill(&self, pid: u32) -> Result<Signalled, SupervisorError> {
            Ok(self.deliver(pid, "KILL", &[Reaction::Graceful, Reaction::Stubborn]))
        }
    }
}
