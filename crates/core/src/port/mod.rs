// Port Layer - Interfaces for external collaborators

pub mod environment_manager;
pub mod host_mode;
pub mod notebook_executor;
pub mod process_control;
pub mod time_provider;

// Re-exports
pub use environment_manager::{EnvironmentError, EnvironmentInfo, EnvironmentManager};
pub use host_mode::{Detached, ForegroundHost, HostMode};
pub use notebook_executor::{
    Classification, ExecutionError, ExecutionRequest, ExecutionResult, NotebookExecutor,
};
pub use process_control::{ProcessControl, Signalled, SupervisorError};
pub use time_provider::TimeProvider;
