// Domain Layer - Notebook apps, settings and environments

pub mod app;
pub mod environment;
pub mod error;
pub mod notebook;
pub mod settings;

// Re-exports
pub use app::{AppMeta, NotebookApp};
pub use environment::{EnvironmentState, EnvironmentTarget, ResolvedEnvironment};
pub use error::ParameterError;
pub use notebook::{Layout, Notebook, APP_META_KEY, INJECTED_CELL_TAG};
pub use settings::{
    CallerSettings, Mode, OutputFormat, RawSettings, ResolvedSettings, SettingSource,
    SystemDefaults,
};
