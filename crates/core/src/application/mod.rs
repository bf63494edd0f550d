// Application Layer - Use Cases and Business Logic

pub mod config_resolver;
pub mod environment_resolver;
pub mod injector;
pub mod launcher;
pub mod panic_guard;
pub mod shutdown;
pub mod supervisor;

// Re-exports
pub use environment_resolver::EnvironmentResolver;
pub use injector::{inject, Injection, ValueType};
pub use launcher::{
    LaunchOutcome, LaunchRequest, Launcher, LauncherConfig, DEFAULT_BASE_PACKAGES,
};
pub use panic_guard::{execute_guarded, PanicGuardResult};
pub use shutdown::{shutdown_channel, ShutdownReason, ShutdownSender, ShutdownToken};
pub use supervisor::{
    PidFile, StartOutcome, StopOutcome, Supervisor, SupervisorConfig, SupervisorPhase,
    SupervisorStatus,
};
