//! JSON-RPC Server
//!
//! Implements the JSON-RPC 2.0 server over TCP.

use crate::handler::RpcHandler;
use crate::types::{FormRequest, LaunchRequest, ShutdownRequest};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use nbapp_core::application::{Launcher, ShutdownSender};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 5007;
const DEFAULT_APPS_DIR: &str = "~/.nbapp/apps";

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("failed to register method {method}: {reason}")]
    Register { method: &'static str, reason: String },
}

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 picks a free port
    pub port: u16,
    /// Directory notebook names are resolved in
    pub apps_dir: PathBuf,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
            apps_dir: shellexpand::tilde(DEFAULT_APPS_DIR).into_owned().into(),
        }
    }
}

impl RpcServerConfig {
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `localhost` or a loopback address
    pub fn is_loopback(&self) -> bool {
        if self.host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        self.host
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, launcher: Arc<Launcher>, shutdown: ShutdownSender) -> Self {
        let admin_allowed = config.is_loopback();
        if !admin_allowed {
            warn!(host = %config.host, "Non-loopback bind: admin methods disabled");
        }
        let handler = Arc::new(RpcHandler::new(
            launcher,
            config.apps_dir.clone(),
            shutdown,
            admin_allowed,
        ));
        Self { config, handler }
    }

    /// Start the JSON-RPC server
    ///
    /// Returns the running handle and the bound address.
    pub async fn start(self) -> Result<(ServerHandle, SocketAddr), ServerError> {
        let addr = self.config.bind_addr();

        info!(
            host = %self.config.host,
            port = %self.config.port,
            apps_dir = %self.config.apps_dir.display(),
            "Starting JSON-RPC server"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = server.local_addr().map_err(|e| ServerError::Bind {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("app.launch.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: LaunchRequest = params.parse()?;
                    handler.launch(req).await
                }
            })
            .map_err(|e| ServerError::Register {
                method: "app.launch.v1",
                reason: e.to_string(),
            })?;

        let handler = self.handler.clone();
        module
            .register_async_method("app.form.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: FormRequest = params.parse()?;
                    handler.form(req).await
                }
            })
            .map_err(|e| ServerError::Register {
                method: "app.form.v1",
                reason: e.to_string(),
            })?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.shutdown.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    // Parameters are optional for this method
                    let req: Option<ShutdownRequest> = params.parse()?;
                    handler.shutdown(req.unwrap_or_default()).await
                }
            })
            .map_err(|e| ServerError::Register {
                method: "admin.shutdown.v1",
                reason: e.to_string(),
            })?;

        info!(addr = %local_addr, "JSON-RPC server started successfully");

        let handle = server.start(module);
        Ok((handle, local_addr))
    }
}
