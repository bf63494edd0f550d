// Central Error Type for the Application

use thiserror::Error;

use crate::domain::ParameterError;
use crate::port::{EnvironmentError, ExecutionError, SupervisorError};

/// Application-level error type
///
/// One variant per failure category a caller can act on. Config, Parameter
/// and Format errors are raised before any environment is touched; Execution
/// and Timeout only after the runner subprocess was spawned.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Execution timed out after {0}s")]
    Timeout(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Coarse error category shared by the CLI exit codes and the RPC code families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Environment,
    Parameter,
    Format,
    Execution,
    Timeout,
    NotFound,
    Io,
    Unknown,
}

impl AppError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::Config(_) => ErrorCategory::Config,
            AppError::Environment(_) => ErrorCategory::Environment,
            AppError::Parameter(_) => ErrorCategory::Parameter,
            AppError::Format(_) | AppError::Serialization(_) => ErrorCategory::Format,
            AppError::Execution(_) => ErrorCategory::Execution,
            AppError::Timeout(_) => ErrorCategory::Timeout,
            AppError::NotFound(_) => ErrorCategory::NotFound,
            AppError::Io(_) => ErrorCategory::Io,
            AppError::Supervisor(_) | AppError::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// Process exit code used by `nbapp-launch`
    ///
    /// 0 success, 1 I/O / format / configuration, 2 parameter,
    /// 3 execution / timeout / environment, 4 unknown.
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Config
            | ErrorCategory::Format
            | ErrorCategory::Io
            | ErrorCategory::NotFound => 1,
            ErrorCategory::Parameter => 2,
            ErrorCategory::Execution | ErrorCategory::Timeout | ErrorCategory::Environment => 3,
            ErrorCategory::Unknown => 4,
        }
    }
}

impl From<ExecutionError> for AppError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Environment(e) => AppError::Environment(e),
            other => AppError::Execution(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_per_category() {
        assert_eq!(AppError::Config("bad".into()).exit_code(), 1);
        assert_eq!(AppError::Format("bad".into()).exit_code(), 1);
        assert_eq!(
            AppError::Parameter(ParameterError::Missing {
                names: vec!["a".into()]
            })
            .exit_code(),
            2
        );
        assert_eq!(AppError::Execution("boom".into()).exit_code(), 3);
        assert_eq!(AppError::Timeout(1).exit_code(), 3);
        assert_eq!(AppError::Unknown("?".into()).exit_code(), 4);
    }
}
