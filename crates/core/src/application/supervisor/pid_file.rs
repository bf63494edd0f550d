// PID file: the only persistent state of the supervisor

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::port::SupervisorError;

/// What a PID file currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidFileState {
    Absent,
    Pid(u32),
    /// Present but not a positive integer
    Invalid,
}

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<PidFileState, SupervisorError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(match contents.trim().parse::<u32>() {
                Ok(pid) if pid > 0 => PidFileState::Pid(pid),
                _ => PidFileState::Invalid,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PidFileState::Absent),
            Err(e) => Err(self.error(e)),
        }
    }

    /// Write `pid`, replacing any previous content
    pub fn write(&self, pid: u32) -> Result<(), SupervisorError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }
        let tmp = self.path.with_extension("pid.tmp");
        fs::write(&tmp, format!("{}\n", pid)).map_err(|e| self.error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.error(e))?;
        debug!(pid, path = %self.path.display(), "PID file written");
        Ok(())
    }

    /// Remove the file; a missing file is not an error
    pub fn remove(&self) -> Result<(), SupervisorError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(e)),
        }
    }

    /// Write `pid` and remove the file again when the guard drops
    pub fn claim(&self, pid: u32) -> Result<PidFileGuard, SupervisorError> {
        self.write(pid)?;
        Ok(PidFileGuard {
            file: self.clone(),
            pid,
        })
    }

    fn error(&self, e: io::Error) -> SupervisorError {
        SupervisorError::PidFile {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }
}

/// Removes the PID file on drop if it still names the claiming process
#[derive(Debug)]
pub struct PidFileGuard {
    file: PidFile,
    pid: u32,
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        match self.file.read() {
            Ok(PidFileState::Pid(pid)) if pid == self.pid => {
                if let Err(e) = self.file.remove() {
                    warn!(error = %e, "Failed to remove PID file");
                } else {
                    debug!(pid, "PID file removed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to read PID file on exit"),
        }
    }
}
