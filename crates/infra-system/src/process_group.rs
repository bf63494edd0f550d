// Child process groups
// reason: nix for process-group signals; output pipes are drained on tokio tasks
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Extra wait for output pipes after the child exited
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Terminate a child's process group: SIGTERM, grace, SIGKILL; then reap
///
/// The child must have been spawned with `process_group(0)` so its pid is
/// also the group id. Off unix only the child itself is killed.
pub(crate) async fn kill_tree(child: &mut Child, pid: Option<u32>, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        info!(pid, "Sending SIGTERM to process group");
        if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGTERM) {
            debug!(pid, error = %e, "SIGTERM to process group failed");
        }
        if let Ok(Ok(_)) = timeout(grace, child.wait()).await {
            // Leader gone; make sure nothing else in the group survives
            let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
            return;
        }
        warn!(pid, "Process group ignored SIGTERM, sending SIGKILL");
        if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            debug!(pid, error = %e, "SIGKILL to process group failed");
        }
    }

    #[cfg(not(unix))]
    let _ = (pid, grace);

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Kill after process group signal failed");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "Failed to reap child process");
    }
}

/// Read a child pipe to the end on its own task
pub(crate) fn spawn_reader<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                debug!(error = %e, "Child pipe read failed");
            }
            buf
        })
    })
}

/// Collect a reader; a pipe still held open by a stray process is abandoned
pub(crate) async fn drain(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    let abort = handle.abort_handle();
    match timeout(PIPE_DRAIN_TIMEOUT, handle).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            warn!(error = %e, "Child pipe reader failed");
            String::new()
        }
        Err(_) => {
            abort.abort();
            warn!("Child pipe still open after exit, output truncated");
            String::new()
        }
    }
}
