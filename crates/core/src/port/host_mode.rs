// Host Mode Port
// How the supervised process is hosted: in the foreground or detached

use crate::port::SupervisorError;

/// Which side of a detach the caller is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detached {
    /// Original process; it should report and return
    Parent,
    /// The process that goes on to host the service
    Host,
}

/// Host Mode trait
///
/// Implementations:
/// - ForegroundHost: keep running in the calling process (portable)
/// - DaemonHost: POSIX double fork with a new session
pub trait HostMode: Send + Sync {
    fn name(&self) -> &'static str;

    /// Detach from the controlling terminal if this mode requires it
    ///
    /// Must be called before any threads (async runtime) are started.
    fn detach(&self) -> Result<Detached, SupervisorError>;
}

/// Run in the calling process
pub struct ForegroundHost;

impl HostMode for ForegroundHost {
    fn name(&self) -> &'static str {
        "foreground"
    }

    fn detach(&self) -> Result<Detached, SupervisorError> {
        Ok(Detached::Host)
    }
}
