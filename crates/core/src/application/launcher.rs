// Launcher
// One notebook-app invocation: settings -> parameters -> environment -> execute

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::application::config_resolver;
use crate::application::environment_resolver::EnvironmentResolver;
use crate::application::injector::Injection;
use crate::domain::environment::required_packages;
use crate::domain::{
    CallerSettings, EnvironmentTarget, NotebookApp, ResolvedEnvironment, ResolvedSettings,
    SettingSource, SystemDefaults,
};
use crate::error::{AppError, Result};
use crate::port::{Classification, EnvironmentManager, ExecutionRequest, NotebookExecutor};

/// Packages every dedicated environment needs to run the notebook runner
pub const DEFAULT_BASE_PACKAGES: &[&str] = &["python", "nbconvert", "ipykernel"];

#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Unioned with the document packages
    pub base_packages: Vec<String>,
    pub defaults: SystemDefaults,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            base_packages: DEFAULT_BASE_PACKAGES.iter().map(|p| p.to_string()).collect(),
            defaults: SystemDefaults::default(),
        }
    }
}

/// What the caller asked for
#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
    /// Input name -> raw text value
    pub args: BTreeMap<String, String>,
    pub caller: CallerSettings,
    /// Render the document as-is, without parameters or execution
    pub view: bool,
}

/// A successful launch
#[derive(Debug, Clone, Serialize)]
pub struct LaunchOutcome {
    pub run_id: String,
    pub app_name: String,
    pub settings: ResolvedSettings,
    /// Environment resolution result; `None` for host and prefix-path targets
    pub environment: Option<ResolvedEnvironment>,
    /// Exported document
    pub content: String,
    /// Runner diagnostics that did not fail the run
    pub diagnostics: String,
    pub duration_ms: i64,
}

pub struct Launcher {
    resolver: EnvironmentResolver,
    executor: Arc<dyn NotebookExecutor>,
    config: LauncherConfig,
}

impl Launcher {
    pub fn new(
        environments: Arc<dyn EnvironmentManager>,
        executor: Arc<dyn NotebookExecutor>,
        config: LauncherConfig,
    ) -> Self {
        Self {
            resolver: EnvironmentResolver::new(environments),
            executor,
            config,
        }
    }

    /// Run a notebook app once
    ///
    /// Configuration and parameter problems are reported before any
    /// environment is resolved; environment resolution completes before the
    /// document is injected and handed to the runner. Nothing is retried.
    ///
    /// # Errors
    /// - Config / Parameter / Format before any side effect
    /// - Environment if resolution or creation fails
    /// - Execution / Timeout / Format / Unknown from the runner classification
    pub async fn launch(&self, app: &NotebookApp, request: LaunchRequest) -> Result<LaunchOutcome> {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("launch", run_id = %run_id, app = %app.name);
        self.launch_inner(run_id, app, request).instrument(span).await
    }

    async fn launch_inner(
        &self,
        run_id: String,
        app: &NotebookApp,
        request: LaunchRequest,
    ) -> Result<LaunchOutcome> {
        let settings =
            config_resolver::resolve(&app.name, &app.meta, &request.caller, &self.config.defaults)?;

        let injection = if request.view {
            None
        } else {
            Some(Injection::prepare(app.inputs(), &request.args)?)
        };

        let (target, environment) = if request.view {
            (EnvironmentTarget::Host, None)
        } else {
            self.resolve_target(app, &settings).await?
        };

        let document = match &injection {
            Some(injection) => {
                let mut document = injection.apply(&app.document)?;
                let mut meta = app.meta.clone();
                meta.nbargs = request.args.clone();
                meta.settings.timeout = Some(settings.timeout_secs.into());
                meta.settings.mode = Some(settings.mode.as_str().into());
                meta.settings.format = Some(settings.format.as_str().into());
                meta.settings.output = settings.output.clone().map(Value::from);
                meta.settings.env = target.name().map(Value::from);
                document.set_app_meta(&meta)?;
                document
            }
            None => app.document.clone(),
        };

        let execution = ExecutionRequest {
            run_id: run_id.clone(),
            app_name: app.name.clone(),
            document: document.to_vec()?,
            working_dir: app.dir().to_path_buf(),
            environment: target,
            timeout: Duration::from_secs(settings.timeout_secs),
            format: settings.format,
            execute: !request.view,
        };

        info!(
            env = ?execution.environment,
            timeout_secs = settings.timeout_secs,
            format = %settings.format,
            view = request.view,
            "Executing notebook"
        );
        let result = self.executor.execute(&execution).await?;

        match result.classification {
            Classification::Success => {
                info!(duration_ms = result.duration_ms, "Notebook executed");
                if !result.stderr.trim().is_empty() {
                    warn!(stderr = %result.stderr.trim(), "Runner diagnostics");
                }
                Ok(LaunchOutcome {
                    run_id,
                    app_name: app.name.clone(),
                    settings,
                    environment,
                    content: result.stdout,
                    diagnostics: result.stderr,
                    duration_ms: result.duration_ms,
                })
            }
            Classification::Timeout => {
                error!(timeout_secs = settings.timeout_secs, "Notebook timed out");
                Err(AppError::Timeout(settings.timeout_secs))
            }
            Classification::ExecutionError => {
                error!(stderr = %result.stderr.trim(), "Notebook execution failed");
                Err(AppError::Execution(result.stderr.trim().to_string()))
            }
            Classification::FormatError => {
                error!("Runner produced no document");
                Err(AppError::Format(
                    "runner exited cleanly without producing a document".to_string(),
                ))
            }
            Classification::UnknownError => {
                error!(exit_code = ?result.exit_code, "Runner failed without diagnostics");
                Err(AppError::Unknown(format!(
                    "runner exited with {:?} and no diagnostics",
                    result.exit_code
                )))
            }
        }
    }

    async fn resolve_target(
        &self,
        app: &NotebookApp,
        settings: &ResolvedSettings,
    ) -> Result<(EnvironmentTarget, Option<ResolvedEnvironment>)> {
        match EnvironmentTarget::from_setting(settings.env.as_deref()) {
            EnvironmentTarget::Named(base) => {
                let required = required_packages(&self.config.base_packages, &app.meta.pkgs);
                // A caller-named environment is never silently shared
                let reuse_allowed = settings.env_source != SettingSource::Caller;
                let resolved = self
                    .resolver
                    .resolve_environment(&base, &required, &app.meta.channels, reuse_allowed)
                    .await?;
                Ok((
                    EnvironmentTarget::Named(resolved.name.clone()),
                    Some(resolved),
                ))
            }
            other => Ok((other, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notebook::cell_source;
    use crate::domain::{EnvironmentState, Notebook, RawSettings};
    use crate::port::environment_manager::mocks::InMemoryEnvironmentManager;
    use crate::port::notebook_executor::mocks::{MockBehavior, MockNotebookExecutor};
    use crate::domain::ParameterError;
    use serde_json::json;
    use std::path::PathBuf;

    fn app(meta: serde_json::Value) -> NotebookApp {
        let document = Notebook::from_value(json!({
            "metadata": {"nbapp": meta},
            "cells": [
                {"cell_type": "code", "metadata": {}, "outputs": [], "execution_count": null,
                 "source": "n = 1"},
                {"cell_type": "code", "metadata": {}, "outputs": [], "execution_count": null,
                 "source": "print(n)"}
            ]
        }))
        .unwrap();
        NotebookApp::from_document(PathBuf::from("/apps/Sales Report.ipynb"), document).unwrap()
    }

    fn launcher(
        manager: &Arc<InMemoryEnvironmentManager>,
        executor: &Arc<MockNotebookExecutor>,
    ) -> Launcher {
        Launcher::new(manager.clone(), executor.clone(), LauncherConfig::default())
    }

    fn args(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_launch_injects_and_records_metadata() {
        let manager = Arc::new(InMemoryEnvironmentManager::new("/conda"));
        let executor = Arc::new(MockNotebookExecutor::new_echo());
        let app = app(json!({"inputs": {"n": "int"}, "pkgs": ["pandas"]}));

        let outcome = launcher(&manager, &executor)
            .launch(
                &app,
                LaunchRequest {
                    args: args(&[("n", "5")]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let requests = executor.requests();
        assert_eq!(requests.len(), 1);
        let sent = Notebook::from_slice(&requests[0].document).unwrap();
        assert_eq!(cell_source(&sent.cells()[0]), "n = 5");
        let meta = sent.app_meta().unwrap();
        assert_eq!(meta.nbargs.get("n").map(String::as_str), Some("5"));
        assert_eq!(meta.settings.timeout, Some(json!(10)));
        assert_eq!(meta.settings.env, Some(json!("sales-report")));

        assert_eq!(requests[0].working_dir, PathBuf::from("/apps"));
        assert_eq!(
            requests[0].environment,
            EnvironmentTarget::Named("sales-report".into())
        );
        let env = outcome.environment.unwrap();
        assert_eq!(env.state, EnvironmentState::Created);
        assert!(manager.packages_of("sales-report").unwrap().contains("nbconvert"));
        assert!(!outcome.content.is_empty());
    }

    #[tokio::test]
    async fn test_missing_parameter_spawns_nothing() {
        let manager = Arc::new(InMemoryEnvironmentManager::new("/conda"));
        let executor = Arc::new(MockNotebookExecutor::new_echo());
        let app = app(json!({"inputs": {"n": "int"}, "pkgs": ["pandas"]}));

        let err = launcher(&manager, &executor)
            .launch(&app, LaunchRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Parameter(ParameterError::Missing { .. })));
        assert_eq!(executor.call_count(), 0);
        assert!(manager.created().is_empty());
    }

    #[tokio::test]
    async fn test_config_error_before_environment() {
        let manager = Arc::new(InMemoryEnvironmentManager::new("/conda"));
        let executor = Arc::new(MockNotebookExecutor::new_echo());
        let app = app(json!({"inputs": {}, "pkgs": ["pandas"], "timeout": 0}));

        let err = launcher(&manager, &executor)
            .launch(&app, LaunchRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(manager.created().is_empty());
    }

    #[tokio::test]
    async fn test_caller_named_env_gets_fresh_environment() {
        let manager = Arc::new(
            InMemoryEnvironmentManager::new("/conda")
                .with_env("shared", &["python", "nbconvert", "ipykernel"]),
        );
        let executor = Arc::new(MockNotebookExecutor::new_echo());
        let app = app(json!({"inputs": {}}));

        let request = LaunchRequest {
            caller: CallerSettings {
                settings: RawSettings {
                    env: Some("shared".into()),
                    ..Default::default()
                },
                override_mode: false,
            },
            ..Default::default()
        };
        let outcome = launcher(&manager, &executor).launch(&app, request).await.unwrap();
        assert_eq!(outcome.environment.unwrap().name, "shared_1");
    }

    #[tokio::test]
    async fn test_document_env_reused_when_compatible() {
        let manager = Arc::new(
            InMemoryEnvironmentManager::new("/conda")
                .with_env("shared", &["python", "nbconvert", "ipykernel", "pandas"]),
        );
        let executor = Arc::new(MockNotebookExecutor::new_echo());
        let app = app(json!({"inputs": {}, "env": "shared", "pkgs": ["pandas"]}));

        let outcome = launcher(&manager, &executor)
            .launch(&app, LaunchRequest::default())
            .await
            .unwrap();
        let env = outcome.environment.unwrap();
        assert_eq!(env.name, "shared");
        assert_eq!(env.state, EnvironmentState::ExistingCompatible);
        assert!(manager.created().is_empty());
    }

    #[tokio::test]
    async fn test_view_mode_skips_injection_and_environment() {
        let manager = Arc::new(InMemoryEnvironmentManager::new("/conda"));
        let executor = Arc::new(MockNotebookExecutor::new_echo());
        let app = app(json!({"inputs": {"n": "int"}, "pkgs": ["pandas"]}));

        launcher(&manager, &executor)
            .launch(
                &app,
                LaunchRequest {
                    view: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let request = &executor.requests()[0];
        assert!(!request.execute);
        assert_eq!(request.environment, EnvironmentTarget::Host);
        let sent = Notebook::from_slice(&request.document).unwrap();
        assert_eq!(cell_source(&sent.cells()[0]), "n = 1");
        assert!(manager.created().is_empty());
    }

    #[tokio::test]
    async fn test_classifications_map_to_errors() {
        let cases = [
            (Classification::Timeout, "ignored"),
            (Classification::ExecutionError, "Traceback: boom"),
            (Classification::FormatError, ""),
            (Classification::UnknownError, ""),
        ];
        for (classification, stderr) in cases {
            let manager = Arc::new(InMemoryEnvironmentManager::new("/conda"));
            let executor = Arc::new(MockNotebookExecutor::new(MockBehavior::Classified(
                classification,
                stderr.to_string(),
            )));
            let err = launcher(&manager, &executor)
                .launch(&app(json!({"inputs": {}})), LaunchRequest::default())
                .await
                .unwrap_err();
            match classification {
                Classification::Timeout => assert!(matches!(err, AppError::Timeout(10))),
                Classification::ExecutionError => {
                    assert!(matches!(err, AppError::Execution(ref s) if s.contains("boom")))
                }
                Classification::FormatError => assert!(matches!(err, AppError::Format(_))),
                _ => assert!(matches!(err, AppError::Unknown(_))),
            }
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_is_execution_error() {
        let manager = Arc::new(InMemoryEnvironmentManager::new("/conda"));
        let executor = Arc::new(MockNotebookExecutor::new(MockBehavior::SpawnFail(
            "permission denied".to_string(),
        )));

        let err = launcher(&manager, &executor)
            .launch(&app(json!({"inputs": {}})), LaunchRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Execution(ref s) if s.contains("permission denied")));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(executor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_packages_runs_on_host() {
        let manager = Arc::new(InMemoryEnvironmentManager::new("/conda"));
        let executor = Arc::new(MockNotebookExecutor::new_echo());
        let outcome = launcher(&manager, &executor)
            .launch(&app(json!({"inputs": {}})), LaunchRequest::default())
            .await
            .unwrap();
        assert!(outcome.environment.is_none());
        assert_eq!(executor.requests()[0].environment, EnvironmentTarget::Host);
    }
}
