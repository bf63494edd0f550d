// Notebook Executor Port
// Abstraction for running a serialized document through the notebook runner

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{EnvironmentTarget, OutputFormat};
use crate::port::EnvironmentError;

/// One runner invocation
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub run_id: String,
    pub app_name: String,
    /// Serialized, already parameterized document
    pub document: Vec<u8>,
    /// Absolute directory of the document; becomes the subprocess cwd
    pub working_dir: PathBuf,
    pub environment: EnvironmentTarget,
    pub timeout: Duration,
    pub format: OutputFormat,
    /// false renders the document without executing it
    pub execute: bool,
}

/// Outcome category of one subprocess run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Success,
    Timeout,
    FormatError,
    ExecutionError,
    UnknownError,
}

impl Classification {
    /// Classify a finished (or killed) runner
    ///
    /// Timeout wins; any diagnostics on stderr mean the runner reported a
    /// failure; a non-zero exit without diagnostics is unexplained; a clean
    /// exit without a document is a format failure.
    pub fn from_output(
        timed_out: bool,
        exit_code: Option<i32>,
        stdout: &str,
        stderr: &str,
    ) -> Self {
        if timed_out {
            Classification::Timeout
        } else if !stderr.trim().is_empty() {
            Classification::ExecutionError
        } else if exit_code != Some(0) {
            Classification::UnknownError
        } else if stdout.trim().is_empty() {
            Classification::FormatError
        } else {
            Classification::Success
        }
    }
}

/// Result of one runner invocation
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub classification: Classification,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: i64,
    pub pid: Option<u32>,
}

/// Execution errors (failures before a classification exists)
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Runner not found: {0}")]
    RunnerNotFound(String),

    #[error("Environment lookup failed: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Notebook Executor trait
///
/// Implementations:
/// - SubprocessExecutor: spawns the runner inside the target environment
/// - MockNotebookExecutor: test double
#[async_trait]
pub trait NotebookExecutor: Send + Sync {
    /// Run the document once; no retries
    ///
    /// # Errors
    /// - ExecutionError::RunnerNotFound if the runner is missing from the environment
    /// - ExecutionError::SpawnFailed if the process cannot be started
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock executor behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Echo the received document on stdout
        Echo,
        /// Finish with the given classification and stderr
        Classified(Classification, String),
        /// Fail before spawning
        SpawnFail(String),
    }

    /// Mock Notebook Executor for testing
    pub struct MockNotebookExecutor {
        behavior: Arc<Mutex<MockBehavior>>,
        requests: Arc<Mutex<Vec<ExecutionRequest>>>,
    }

    impl MockNotebookExecutor {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn new_echo() -> Self {
            Self::new(MockBehavior::Echo)
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn requests(&self) -> Vec<ExecutionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotebookExecutor for MockNotebookExecutor {
        async fn execute(
            &self,
            request: &ExecutionRequest,
        ) -> Result<ExecutionResult, ExecutionError> {
            self.requests.lock().unwrap().push(request.clone());
            let behavior = self.behavior.lock().unwrap().clone();

            let (classification, stdout, stderr) = match behavior {
                MockBehavior::Echo => (
                    Classification::Success,
                    String::from_utf8_lossy(&request.document).into_owned(),
                    String::new(),
                ),
                MockBehavior::Classified(c, stderr) => (c, String::new(), stderr),
                MockBehavior::SpawnFail(msg) => return Err(ExecutionError::SpawnFailed(msg)),
            };

            Ok(ExecutionResult {
                classification,
                stdout,
                stderr,
                exit_code: Some(0),
                duration_ms: 5,
                pid: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_order() {
        assert_eq!(
            Classification::from_output(true, Some(0), "out", "err"),
            Classification::Timeout
        );
        assert_eq!(
            Classification::from_output(false, Some(0), "out", "Traceback ..."),
            Classification::ExecutionError
        );
        assert_eq!(
            Classification::from_output(false, Some(2), "out", ""),
            Classification::UnknownError
        );
        assert_eq!(
            Classification::from_output(false, Some(0), "  \n", ""),
            Classification::FormatError
        );
        assert_eq!(
            Classification::from_output(false, Some(0), "<html/>", "\n"),
            Classification::Success
        );
    }
}
