// Subprocess executor implementation
// reason: tokio for async process management; group kills live in process_group
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use nbapp_core::domain::EnvironmentTarget;
use nbapp_core::port::{
    Classification, EnvironmentManager, ExecutionError, ExecutionRequest, ExecutionResult,
    NotebookExecutor, TimeProvider,
};

use crate::process_group::{drain, kill_tree, spawn_reader};
use crate::runner::RunnerConfig;

/// Wait between SIGTERM and SIGKILL for a timed-out runner
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(500);

/// Resolved runner invocation
#[derive(Debug, Clone)]
struct Invocation {
    program: PathBuf,
    /// Environment bin directory, prepended to PATH
    bin_dir: Option<PathBuf>,
    prefix: Option<PathBuf>,
}

/// Runs the notebook runner as a child process (Execution Engine)
///
/// One child per request, placed in its own process group, with the
/// document directory as its working directory. The host process working
/// directory is never changed, so concurrent executions do not interfere.
pub struct SubprocessExecutor {
    runner: RunnerConfig,
    environments: Arc<dyn EnvironmentManager>,
    time_provider: Arc<dyn TimeProvider>,
    kill_grace: Duration,
}

impl SubprocessExecutor {
    /// Create a new subprocess executor
    ///
    /// # Example
    /// ```ignore
    /// let executor = SubprocessExecutor::new(
    ///     RunnerConfig::default(),
    ///     Arc::new(CondaEnvironmentManager::new(CondaConfig::default())),
    ///     Arc::new(SystemTimeProvider),
    /// );
    /// ```
    pub fn new(
        runner: RunnerConfig,
        environments: Arc<dyn EnvironmentManager>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            runner,
            environments,
            time_provider,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Locate the runner program for the target environment
    async fn resolve(
        &self,
        target: &EnvironmentTarget,
        working_dir: &Path,
    ) -> Result<Invocation, ExecutionError> {
        let prefix = match target {
            EnvironmentTarget::Host => {
                let program = which::which(&self.runner.program).map_err(|e| {
                    ExecutionError::RunnerNotFound(format!("{} ({})", self.runner.program, e))
                })?;
                return Ok(Invocation {
                    program,
                    bin_dir: None,
                    prefix: None,
                });
            }
            EnvironmentTarget::Named(name) => self.environments.prefix(name).await?,
            EnvironmentTarget::Path(path) if path.is_relative() => working_dir.join(path),
            EnvironmentTarget::Path(path) => path.clone(),
        };

        let bin_dir = env_bin_dir(&prefix);
        let program = bin_dir.join(executable_name(&self.runner.program));
        if !program.is_file() {
            return Err(ExecutionError::RunnerNotFound(program.display().to_string()));
        }
        Ok(Invocation {
            program,
            bin_dir: Some(bin_dir),
            prefix: Some(prefix),
        })
    }

    fn command(&self, invocation: &Invocation, request: &ExecutionRequest) -> Command {
        let args = self
            .runner
            .arguments(request.format, request.timeout.as_secs().max(1), request.execute);
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&args)
            .current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let (Some(bin_dir), Some(prefix)) = (&invocation.bin_dir, &invocation.prefix) {
            cmd.env("PATH", prepend_path(bin_dir))
                .env("CONDA_PREFIX", prefix);
        }

        // Own process group so a timeout reaches the kernel and its children
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

#[async_trait]
impl NotebookExecutor for SubprocessExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecutionError> {
        let invocation = self
            .resolve(&request.environment, &request.working_dir)
            .await?;
        let start_time = self.time_provider.now_millis();

        info!(
            run_id = %request.run_id,
            program = %invocation.program.display(),
            working_dir = %request.working_dir.display(),
            timeout_secs = request.timeout.as_secs(),
            "Starting runner"
        );

        let mut child = self
            .command(&invocation, request)
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(e.to_string()))?;
        let pid = child.id();

        // Feed the document, then close stdin to signal end-of-input
        let writer = child.stdin.take().map(|mut stdin| {
            let document = request.document.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&document).await {
                    debug!(error = %e, "Runner closed stdin early");
                }
                let _ = stdin.shutdown().await;
            })
        });
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let (timed_out, exit_code) = match timeout(request.timeout, child.wait()).await {
            Ok(Ok(status)) => (false, status.code()),
            Ok(Err(e)) => {
                kill_tree(&mut child, pid, self.kill_grace).await;
                return Err(ExecutionError::IoError(e.to_string()));
            }
            Err(_) => {
                warn!(run_id = %request.run_id, pid = ?pid, "Runner timed out");
                kill_tree(&mut child, pid, self.kill_grace).await;
                (true, None)
            }
        };

        if let Some(writer) = writer {
            writer.abort();
        }
        let stdout = drain(stdout).await;
        let stderr = drain(stderr).await;

        let duration_ms = self.time_provider.elapsed_millis(start_time);
        let classification = Classification::from_output(timed_out, exit_code, &stdout, &stderr);

        info!(
            run_id = %request.run_id,
            duration_ms,
            exit_code = ?exit_code,
            classification = ?classification,
            "Runner finished"
        );

        Ok(ExecutionResult {
            classification,
            stdout,
            stderr,
            exit_code,
            duration_ms,
            pid,
        })
    }
}

/// Directory holding an environment's executables
pub fn env_bin_dir(prefix: &Path) -> PathBuf {
    if cfg!(windows) {
        prefix.join("Scripts")
    } else {
        prefix.join("bin")
    }
}

fn executable_name(program: &str) -> String {
    if cfg!(windows) && !program.ends_with(".exe") {
        format!("{}.exe", program)
    } else {
        program.to_string()
    }
}

fn prepend_path(dir: &Path) -> OsString {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).unwrap_or_else(|_| dir.as_os_str().to_os_string())
}
