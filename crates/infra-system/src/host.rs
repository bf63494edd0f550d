// Daemon host mode
// POSIX double fork; the foreground mode lives in core (ForegroundHost)
use std::path::PathBuf;

use nbapp_core::port::{Detached, HostMode, SupervisorError};

/// Detach into the background as a session-less daemon
#[derive(Debug, Clone)]
pub struct DaemonHost {
    /// Working directory of the daemon
    pub home_dir: PathBuf,
    pub umask: u32,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
}

impl DaemonHost {
    /// True where detaching is supported
    pub fn is_supported() -> bool {
        cfg!(unix)
    }
}

#[cfg(unix)]
impl HostMode for DaemonHost {
    fn name(&self) -> &'static str {
        "daemon"
    }

    fn detach(&self) -> Result<Detached, SupervisorError> {
        use nix::sys::stat::{umask, Mode};
        use nix::unistd::{chdir, dup2, fork, setsid, ForkResult};
        use std::fs::{File, OpenOptions};
        use std::os::unix::io::AsRawFd;

        let fail = |stage: &str, e: &dyn std::fmt::Display| {
            SupervisorError::Detach(format!("{}: {}", stage, e))
        };

        // Log files are opened before forking so failures reach the caller
        let open_log = |path: &PathBuf| -> Result<File, SupervisorError> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| fail("log dir", &e))?;
            }
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| fail(format!("open {}", path.display()).as_str(), &e))
        };
        let stdout = open_log(&self.stdout_log)?;
        let stderr = open_log(&self.stderr_log)?;
        let devnull = File::open("/dev/null").map_err(|e| fail("open /dev/null", &e))?;

        // First fork: the original process returns to its caller
        // SAFETY: called before any other thread (async runtime) exists
        match unsafe { fork() }.map_err(|e| fail("first fork", &e))? {
            ForkResult::Parent { .. } => return Ok(Detached::Parent),
            ForkResult::Child => {}
        }

        // New session without a controlling terminal
        setsid().map_err(|e| fail("setsid", &e))?;

        // Second fork: the session leader exits so a terminal can never be
        // reacquired
        // SAFETY: still single-threaded
        match unsafe { fork() }.map_err(|e| fail("second fork", &e))? {
            ForkResult::Parent { .. } => std::process::exit(0),
            ForkResult::Child => {}
        }

        chdir(&self.home_dir).map_err(|e| fail("chdir", &e))?;
        umask(Mode::from_bits_truncate(self.umask as nix::libc::mode_t));

        dup2(devnull.as_raw_fd(), 0).map_err(|e| fail("redirect stdin", &e))?;
        dup2(stdout.as_raw_fd(), 1).map_err(|e| fail("redirect stdout", &e))?;
        dup2(stderr.as_raw_fd(), 2).map_err(|e| fail("redirect stderr", &e))?;

        Ok(Detached::Host)
    }
}

#[cfg(not(unix))]
impl HostMode for DaemonHost {
    fn name(&self) -> &'static str {
        "daemon"
    }

    fn detach(&self) -> Result<Detached, SupervisorError> {
        Err(SupervisorError::Detach(
            "background mode is not supported on this platform; use foreground start".to_string(),
        ))
    }
}
