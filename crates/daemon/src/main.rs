//! nbapp server - Main Entry Point
//!
//! Hosts the JSON-RPC service behind a PID file, in the foreground or as a
//! detached daemon. Detaching happens before the async runtime exists.

mod logging;
mod settings;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use nbapp_api_rpc::RpcServer;
use nbapp_core::application::{
    shutdown_channel, Launcher, ShutdownReason, ShutdownSender, StartOutcome, StopOutcome,
    Supervisor,
};
use nbapp_core::port::time_provider::SystemTimeProvider;
use nbapp_core::port::{EnvironmentManager, ForegroundHost, HostMode, SupervisorError};
use nbapp_core::AppError;
use nbapp_infra_system::{
    CondaEnvironmentManager, DaemonHost, SubprocessExecutor, SystemProcessControl,
};

use crate::logging::LogTarget;
use crate::settings::ServerSettings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "nbapp-server")]
#[command(about = "Notebook app server", version)]
struct Cli {
    /// Server action
    #[arg(value_enum, default_value_t = Action::Start)]
    action: Action,

    /// Settings file (TOML)
    #[arg(short, long, env = "NBAPP_CONFIG")]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Take over the PID file even if another live server holds it
    #[arg(long)]
    overwrite: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Action {
    /// Start detached in the background
    Daemon,
    /// Start in the foreground
    Start,
    /// Stop the background server
    Stop,
    /// Stop, then start detached
    Restart,
    /// Report whether a server is running
    Status,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let mut settings = ServerSettings::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        settings.host = host;
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }

    let supervisor = Supervisor::new(
        settings.supervisor_config(),
        Arc::new(SystemProcessControl::new()),
    );

    match cli.action {
        Action::Status => {
            let status = supervisor.status()?;
            match (status.running, status.pid) {
                (true, Some(pid)) => {
                    println!("app server running: pid {} ({}:{})", pid, settings.host, settings.port);
                    Ok(0)
                }
                _ => {
                    println!("app server not running");
                    Ok(1)
                }
            }
        }
        Action::Stop => {
            let _guard = logging::init(LogTarget::Stderr)?;
            println!("stopping background app server");
            report_stop(supervisor.stop()?);
            Ok(0)
        }
        Action::Start => {
            let _guard = logging::init(LogTarget::Stderr)?;
            println!("starting app server in the foreground");
            let outcome = supervisor.start(&ForegroundHost, cli.overwrite, || {
                announce(ForegroundHost.name());
                serve(&settings)
            })?;
            Ok(exit_code(outcome))
        }
        Action::Daemon => {
            ensure_daemon_supported()?;
            let host = settings.daemon_host();
            let stdout_log = settings.stdout_log.clone();
            let mut log_guard = None;
            let started = supervisor.start(&host, cli.overwrite, || {
                run_detached(stdout_log, host.name(), &mut log_guard, || serve(&settings))
            });
            match started {
                Ok(StartOutcome::Detached) => {
                    println!("starting daemonized app server in the background");
                    Ok(0)
                }
                Ok(outcome) => Ok(exit_code(outcome)),
                Err(AppError::Supervisor(SupervisorError::AlreadyRunning { pid, .. })) => {
                    println!(
                        "daemonized app server already running: pid {} ({}:{})",
                        pid, settings.host, settings.port
                    );
                    Ok(0)
                }
                Err(e) => Err(e.into()),
            }
        }
        Action::Restart => {
            ensure_daemon_supported()?;
            println!("restarting background app server");
            let host = settings.daemon_host();
            let stdout_log = settings.stdout_log.clone();
            let mut log_guard = None;
            let outcome = supervisor.restart(&host, || {
                run_detached(stdout_log, host.name(), &mut log_guard, || serve(&settings))
            })?;
            Ok(exit_code(outcome))
        }
    }
}

fn ensure_daemon_supported() -> Result<()> {
    if !DaemonHost::is_supported() {
        anyhow::bail!("daemon mode is not supported on this platform; use `start`");
    }
    Ok(())
}

fn init_file_logging(path: PathBuf) -> nbapp_core::Result<Option<WorkerGuard>> {
    logging::init(LogTarget::File(path)).map_err(|e| AppError::Config(format!("{:#}", e)))
}

/// Hosted body of a detached server
///
/// File logging comes up before anything is logged. The writer guard lives in
/// `log_guard`, owned by the caller, so the supervisor's exit lines written
/// after `run` returns still reach the file.
fn run_detached<F>(
    log_file: PathBuf,
    mode: &'static str,
    log_guard: &mut Option<WorkerGuard>,
    run: F,
) -> nbapp_core::Result<()>
where
    F: FnOnce() -> nbapp_core::Result<()>,
{
    *log_guard = init_file_logging(log_file)?;
    announce(mode);
    run()
}

fn announce(mode: &'static str) {
    info!(pid = std::process::id(), mode, "Service started");
}

fn exit_code(outcome: StartOutcome) -> i32 {
    match outcome {
        StartOutcome::Detached => 0,
        StartOutcome::Exited { code } => code,
    }
}

fn report_stop(outcome: StopOutcome) {
    match outcome {
        StopOutcome::NotRunning => println!("app server not running"),
        StopOutcome::Stopped { pid, forced: false } => println!("stopped pid {}", pid),
        StopOutcome::Stopped { pid, forced: true } => println!("killed pid {}", pid),
        StopOutcome::StaleCleaned { pid: Some(pid) } => {
            println!("removed stale PID file (pid {} was not running)", pid)
        }
        StopOutcome::StaleCleaned { pid: None } => println!("removed unreadable PID file"),
    }
}

/// Hosted loop: runs on the host side of the supervisor
fn serve(settings: &ServerSettings) -> nbapp_core::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve_async(settings))
}

async fn serve_async(settings: &ServerSettings) -> nbapp_core::Result<()> {
    info!("nbapp server v{} starting...", VERSION);

    let launcher_config = settings
        .launcher_config()
        .map_err(|e| AppError::Config(format!("{:#}", e)))?;

    // Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let environments: Arc<dyn EnvironmentManager> =
        Arc::new(CondaEnvironmentManager::new(settings.conda_config()));
    let executor = Arc::new(SubprocessExecutor::new(
        settings.runner_config(),
        environments.clone(),
        time_provider,
    ));
    let launcher = Arc::new(Launcher::new(environments, executor, launcher_config));

    let (shutdown_tx, mut shutdown_rx) = shutdown_channel();
    tokio::spawn(forward_signals(shutdown_tx.clone()));

    let server = RpcServer::new(settings.rpc_config(), launcher, shutdown_tx);
    let (handle, addr) = server
        .start()
        .await
        .map_err(|e| AppError::Config(e.to_string()))?;

    info!(addr = %addr, apps_dir = %settings.apps_dir.display(), "System ready");

    let reason = shutdown_rx.wait().await;
    info!(reason = ?reason, "Shutdown requested. Exiting gracefully...");

    if handle.stop().is_err() {
        warn!("RPC server already stopped");
    }
    handle.stopped().await;

    info!("Shutdown complete.");
    Ok(())
}

async fn forward_signals(shutdown: ShutdownSender) {
    if let Err(e) = wait_for_signal().await {
        warn!(error = %e, "Cannot listen for termination signals");
        return;
    }
    info!("Shutdown signal received");
    shutdown.shutdown(ShutdownReason::Signal);
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = term.recv() => Ok(()),
        res = tokio::signal::ctrl_c() => res,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
