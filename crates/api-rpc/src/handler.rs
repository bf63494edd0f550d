//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::{forbidden, to_rpc_error};
use crate::types::{
    FormField, FormRequest, FormResponse, LaunchRequest, LaunchResponse, OutputResponse,
    ShutdownRequest, ShutdownResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use nbapp_core::application::{Launcher, ShutdownReason, ShutdownSender};
use nbapp_core::application::LaunchRequest as CoreLaunchRequest;
use nbapp_core::domain::{CallerSettings, NotebookApp, RawSettings};
use nbapp_core::error::{AppError, Result as AppResult};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const NOTEBOOK_EXTENSION: &str = "ipynb";

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    launcher: Arc<Launcher>,
    apps_dir: PathBuf,
    shutdown: ShutdownSender,
    /// Only a loopback-bound server accepts admin methods
    admin_allowed: bool,
}

impl RpcHandler {
    pub fn new(
        launcher: Arc<Launcher>,
        apps_dir: impl Into<PathBuf>,
        shutdown: ShutdownSender,
        admin_allowed: bool,
    ) -> Self {
        Self {
            launcher,
            apps_dir: apps_dir.into(),
            shutdown,
            admin_allowed,
        }
    }

    /// app.launch.v1
    pub async fn launch(&self, req: LaunchRequest) -> Result<LaunchResponse, ErrorObjectOwned> {
        let app = self.load_app(&req.notebook).map_err(to_rpc_error)?;

        if req.form_if_missing && !req.view {
            let missing = app.missing_inputs(&req.args);
            if !missing.is_empty() {
                info!(app = %app.name, missing = ?missing, "Inputs missing, returning form");
                return Ok(LaunchResponse::Form(form_of(&app, missing)));
            }
        }

        let request = CoreLaunchRequest {
            args: req.args,
            caller: CallerSettings {
                settings: RawSettings {
                    timeout: req.timeout,
                    mode: req.mode,
                    format: req.format,
                    output: req.output,
                    env: req.env,
                },
                override_mode: req.override_mode,
            },
            view: req.view,
        };

        let outcome = self
            .launcher
            .launch(&app, request)
            .await
            .map_err(to_rpc_error)?;

        Ok(LaunchResponse::Output(OutputResponse {
            name: outcome.app_name,
            run_id: outcome.run_id,
            format: outcome.settings.format.as_str().to_string(),
            mode: outcome.settings.mode.as_str().to_string(),
            output: outcome.settings.output,
            content: outcome.content,
            environment: outcome.environment.map(|env| env.name),
            duration_ms: outcome.duration_ms,
        }))
    }

    /// app.form.v1
    pub async fn form(&self, req: FormRequest) -> Result<FormResponse, ErrorObjectOwned> {
        let app = self.load_app(&req.notebook).map_err(to_rpc_error)?;
        let missing = app.missing_inputs(&BTreeMap::new());
        Ok(form_of(&app, missing))
    }

    /// admin.shutdown.v1
    pub async fn shutdown(
        &self,
        _req: ShutdownRequest,
    ) -> Result<ShutdownResponse, ErrorObjectOwned> {
        if !self.admin_allowed {
            warn!("Shutdown refused: server is not bound to a loopback host");
            return Err(forbidden("shutdown is only available on a loopback-bound server"));
        }
        info!("Shutdown requested over RPC");
        self.shutdown.shutdown(ShutdownReason::AdminRequest);
        Ok(ShutdownResponse { accepted: true })
    }

    fn load_app(&self, notebook: &str) -> AppResult<NotebookApp> {
        let path = resolve_notebook(&self.apps_dir, notebook)?;
        NotebookApp::load(path)
    }
}

fn form_of(app: &NotebookApp, missing: Vec<String>) -> FormResponse {
    FormResponse {
        name: app.name.clone(),
        desc: app.desc().to_string(),
        inputs: app
            .inputs()
            .iter()
            .map(|(name, type_tag)| FormField {
                name: name.clone(),
                type_tag: type_tag.clone(),
            })
            .collect(),
        missing,
    }
}

/// Map a notebook name to a document inside `apps_dir`
///
/// Only a single plain file name is accepted; the `.ipynb` extension is
/// optional. Anything else is reported as not found.
pub fn resolve_notebook(apps_dir: &Path, notebook: &str) -> AppResult<PathBuf> {
    let name = notebook.trim();
    let not_found = || AppError::NotFound(format!("notebook '{}'", notebook));

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => return Err(not_found()),
    }
    if name.contains('\\') {
        return Err(not_found());
    }

    let file = if name.ends_with(&format!(".{}", NOTEBOOK_EXTENSION)) {
        name.to_string()
    } else {
        format!("{}.{}", name, NOTEBOOK_EXTENSION)
    };
    let path = apps_dir.join(file);
    if !path.is_file() {
        return Err(not_found());
    }
    Ok(path)
}
