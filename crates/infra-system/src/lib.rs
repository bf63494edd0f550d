// nbapp Infrastructure - System Adapters
// Implements the environment, execution and process ports with OS facilities

pub mod conda;
pub mod host;
pub mod process_control;
mod process_group;
pub mod runner;
pub mod subprocess_executor;

pub use conda::{CondaConfig, CondaEnvironmentManager};
pub use host::DaemonHost;
pub use process_control::SystemProcessControl;
pub use runner::RunnerConfig;
pub use subprocess_executor::SubprocessExecutor;
