// Process control implementation
// reason: nix for POSIX signals, sysinfo where signals are unavailable
use nbapp_core::port::{ProcessControl, Signalled, SupervisorError};

/// Signals and liveness checks against real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessControl;

impl SystemProcessControl {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
mod imp {
    use super::*;
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    fn pid(raw: u32) -> Result<Pid, SupervisorError> {
        i32::try_from(raw)
            .ok()
            .filter(|p| *p > 0)
            .map(Pid::from_raw)
            .ok_or_else(|| SupervisorError::Signal {
                pid: raw,
                message: "not a valid process id".to_string(),
            })
    }

    pub fn is_alive(raw: u32) -> bool {
        let Ok(target) = pid(raw) else {
            return false;
        };
        // Signal 0 checks if process exists without actually sending a signal
        match kill(target, None) {
            Ok(()) => !is_zombie(raw),
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    /// Exited but not yet reaped by its parent
    #[cfg(target_os = "linux")]
    fn is_zombie(raw: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{}/stat", raw))
            .ok()
            .and_then(|stat| {
                stat.rfind(')')
                    .and_then(|i| stat[i + 1..].trim_start().chars().next())
            })
            .map_or(false, |state| state == 'Z')
    }

    #[cfg(not(target_os = "linux"))]
    fn is_zombie(_raw: u32) -> bool {
        false
    }

    pub fn signal(raw: u32, signal: Signal) -> Result<Signalled, SupervisorError> {
        match kill(pid(raw)?, signal) {
            Ok(()) => Ok(Signalled::Sent),
            Err(Errno::ESRCH) => Ok(Signalled::AlreadyGone),
            Err(e) => Err(SupervisorError::Signal {
                pid: raw,
                message: format!("{:?}: {}", signal, e),
            }),
        }
    }

    pub fn terminate(raw: u32) -> Result<Signalled, SupervisorError> {
        signal(raw, Signal::SIGTERM)
    }

    pub fn force_kill(raw: u32) -> Result<Signalled, SupervisorError> {
        signal(raw, Signal::SIGKILL)
    }
}

#[cfg(not(unix))]
mod imp {
    use super::*;
    use sysinfo::{Pid, Signal, System};

    fn with_process<T>(raw: u32, f: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
        let mut system = System::new();
        let pid = Pid::from_u32(raw);
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(f)
    }

    pub fn is_alive(raw: u32) -> bool {
        with_process(raw, |_| ()).is_some()
    }

    pub fn terminate(raw: u32) -> Result<Signalled, SupervisorError> {
        match with_process(raw, |p| p.kill_with(Signal::Term).unwrap_or_else(|| p.kill())) {
            None => Ok(Signalled::AlreadyGone),
            Some(true) => Ok(Signalled::Sent),
            Some(false) => Err(SupervisorError::Signal {
                pid: raw,
                message: "terminate request refused".to_string(),
            }),
        }
    }

    pub fn force_kill(raw: u32) -> Result<Signalled, SupervisorError> {
        match with_process(raw, |p| p.kill()) {
            None => Ok(Signalled::AlreadyGone),
            Some(true) => Ok(Signalled::Sent),
            Some(false) => Err(SupervisorError::Signal {
                pid: raw,
                message: "kill request refused".to_string(),
            }),
        }
    }
}

impl ProcessControl for SystemProcessControl {
    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn is_alive(&self, pid: u32) -> bool {
        imp::is_alive(pid)
    }

    fn terminate(&self, pid: u32) -> Result<Signalled, SupervisorError> {
        imp::terminate(pid)
    }

    fn force_kill(&self, pid: u32) -> Result<Signalled, SupervisorError> {
        imp::force_kill(pid)
    }
}
