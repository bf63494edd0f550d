//! nbapp-launch - Run a notebook as an app
//!
//! Runs the engine in-process, or delegates to an app server with `--server`.

mod fetch;
mod present;
mod report;
mod rpc;

use clap::Parser;
use colored::Colorize;
use nbapp_api_rpc::error::code;
use nbapp_api_rpc::types::{FormResponse, LaunchResponse};
use nbapp_core::application::{LaunchRequest, Launcher, LauncherConfig};
use nbapp_core::domain::{CallerSettings, NotebookApp, ParameterError, RawSettings};
use nbapp_core::port::time_provider::SystemTimeProvider;
use nbapp_core::port::EnvironmentManager;
use nbapp_core::AppError;
use nbapp_infra_system::{CondaConfig, CondaEnvironmentManager, RunnerConfig, SubprocessExecutor};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::fetch::Source;
use crate::present::{present, Presented, Rendered};
use crate::report::Failure;
use crate::rpc::{call_rpc, RpcFailure};

const DEFAULT_APPS_DIR: &str = "~/.nbapp/apps";
const DEFAULT_CACHE_DIR: &str = "~/.nbapp/cache";

#[derive(Parser, Debug)]
#[command(name = "nbapp-launch")]
#[command(about = "Launch a notebook as an app", long_about = None)]
#[command(version)]
struct Cli {
    /// View the document as-is (no inputs, no execution)
    #[arg(short, long)]
    view: bool,

    /// Print the result on stdout
    #[arg(short, long, conflicts_with = "quiet")]
    stream: bool,

    /// Write the result file without opening it
    #[arg(short, long)]
    quiet: bool,

    /// Environment name or prefix path
    #[arg(short, long)]
    env: Option<String>,

    /// Output format (html, md, py)
    #[arg(short, long)]
    format: Option<String>,

    /// Execution timeout in seconds
    #[arg(short, long, allow_negative_numbers = true)]
    timeout: Option<i64>,

    /// Result file name
    #[arg(short, long)]
    output: Option<String>,

    /// Let these options win over the document's own settings
    #[arg(long = "override")]
    override_mode: bool,

    /// App server URL; runs locally when absent
    #[arg(long, env = "NBAPP_SERVER")]
    server: Option<String>,

    /// Directory app names are looked up in
    #[arg(long, env = "NBAPP_APPS_DIR", default_value = DEFAULT_APPS_DIR)]
    apps_dir: String,

    /// Environment manager executable
    #[arg(long, env = "NBAPP_CONDA", default_value = "conda")]
    conda: String,

    /// Debug logging on stderr
    #[arg(long)]
    verbose: bool,

    /// Notebook path, URL or app name
    notebook: String,

    /// Input values as KEY=VALUE
    #[arg(trailing_var_arg = true)]
    nbargs: Vec<String>,
}

impl Cli {
    fn mode(&self) -> Option<&'static str> {
        if self.stream {
            Some("stream")
        } else if self.quiet {
            Some("quiet")
        } else {
            None
        }
    }

    fn caller(&self) -> CallerSettings {
        CallerSettings {
            settings: RawSettings {
                timeout: self.timeout.map(Value::from),
                mode: self.mode().map(Value::from),
                format: self.format.clone().map(Value::from),
                output: self.output.clone().map(Value::from),
                env: self.env.clone().map(Value::from),
            },
            override_mode: self.override_mode,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprint!("{}", failure.render(&cli.notebook));
            ExitCode::from(u8::try_from(failure.exit_code).unwrap_or(1))
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "nbapp=debug" } else { "nbapp=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: &Cli) -> Result<(), Failure> {
    let args = parse_nbargs(&cli.nbargs).map_err(|e| Failure::app(&e, None))?;
    match &cli.server {
        Some(server) => run_remote(cli, server, args).await,
        None => run_local(cli, args).await,
    }
}

async fn run_local(cli: &Cli, args: BTreeMap<String, String>) -> Result<(), Failure> {
    let apps_dir = expand(&cli.apps_dir);
    let cache_dir = expand(DEFAULT_CACHE_DIR);
    let path = fetch::locate(&cli.notebook, &apps_dir, &cache_dir)
        .await
        .map_err(|e| Failure::app(&e, None))?;
    let app = NotebookApp::load(&path).map_err(|e| Failure::app(&e, None))?;

    let environments: Arc<dyn EnvironmentManager> =
        Arc::new(CondaEnvironmentManager::new(CondaConfig {
            executable: cli.conda.clone(),
            ..Default::default()
        }));
    let executor = Arc::new(SubprocessExecutor::new(
        RunnerConfig::default(),
        environments.clone(),
        Arc::new(SystemTimeProvider),
    ));
    let launcher = Launcher::new(environments, executor, LauncherConfig::default());

    let request = LaunchRequest {
        args,
        caller: cli.caller(),
        view: cli.view,
    };
    let outcome = launcher
        .launch(&app, request)
        .await
        .map_err(|e| Failure::app(&e, Some(&app)))?;

    let rendered = Rendered {
        name: app.name.clone(),
        format: outcome.settings.format,
        mode: outcome.settings.mode,
        output: outcome.settings.output.clone(),
        content: outcome.content,
    };
    show(&rendered, app.dir())
}

async fn run_remote(
    cli: &Cli,
    server: &str,
    args: BTreeMap<String, String>,
) -> Result<(), Failure> {
    let name = match Source::classify(&cli.notebook) {
        Source::Name(name) => name,
        _ => {
            return Err(Failure::app(
                &AppError::Config(
                    "an app server launches apps by name; pass the name, not a path or URL"
                        .to_string(),
                ),
                None,
            ))
        }
    };

    let params = json!({
        "notebook": name,
        "args": args,
        "env": cli.env,
        "format": cli.format,
        "timeout": cli.timeout,
        "mode": cli.mode(),
        "output": cli.output,
        "override": cli.override_mode,
        "view": cli.view,
    });
    debug!(server = %server, notebook = %name, "Launching on app server");

    let result = match call_rpc(server, "app.launch.v1", params).await {
        Ok(result) => result,
        Err(RpcFailure::Remote(err)) => {
            let form = if err.code == code::PARAMETER_ERROR || err.code == code::FORMAT_ERROR {
                fetch_form(server, &name).await
            } else {
                None
            };
            return Err(Failure::remote(&err, form.as_ref()));
        }
        Err(RpcFailure::Transport(e)) => return Err(Failure::other(e)),
    };

    let response: LaunchResponse = serde_json::from_value(result)
        .map_err(|e| Failure::other(anyhow::anyhow!("unexpected server response: {}", e)))?;
    let output = match response {
        LaunchResponse::Output(output) => output,
        LaunchResponse::Form(form) => return Err(Failure::form(&form)),
    };

    let rendered = Rendered {
        name: output.name,
        format: output
            .format
            .parse()
            .map_err(|e: String| Failure::other(anyhow::anyhow!(e)))?,
        mode: output
            .mode
            .parse()
            .map_err(|e: String| Failure::other(anyhow::anyhow!(e)))?,
        output: output.output,
        content: output.content,
    };
    let cwd = std::env::current_dir().map_err(|e| Failure::app(&AppError::Io(e), None))?;
    show(&rendered, &cwd)
}

async fn fetch_form(server: &str, name: &str) -> Option<FormResponse> {
    let value = call_rpc(server, "app.form.v1", json!({ "notebook": name }))
        .await
        .ok()?;
    serde_json::from_value(value).ok()
}

fn show(rendered: &Rendered, out_dir: &Path) -> Result<(), Failure> {
    let mut stdout = std::io::stdout();
    let presented =
        present(rendered, out_dir, &mut stdout).map_err(|e| Failure::app(&AppError::Io(e), None))?;

    match presented {
        Presented::Streamed => {}
        Presented::Written(path) => debug!(path = %path.display(), "Result written"),
        Presented::Opened(path) => {
            println!("{} {}", "✓ Opened".green().bold(), path.display());
        }
        Presented::OpenFailed { path, reason } => {
            println!("{} {}", "✓ Result written to".green().bold(), path.display());
            eprintln!("{} cannot open it: {}", "!".yellow().bold(), reason);
        }
    }
    Ok(())
}

/// `KEY=VALUE` pairs; the value may be empty or contain `=`
fn parse_nbargs(raw: &[String]) -> Result<BTreeMap<String, String>, AppError> {
    let mut args = BTreeMap::new();
    for arg in raw {
        match arg.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                args.insert(key.trim().to_string(), value.to_string());
            }
            _ => {
                return Err(AppError::Parameter(ParameterError::Malformed {
                    name: arg.clone(),
                    type_tag: "KEY=VALUE".to_string(),
                    value: arg.clone(),
                    reason: "launch arguments must be pairs such as a=7".to_string(),
                }))
            }
        }
    }
    Ok(args)
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_nbargs() {
        let args = parse_nbargs(&pairs(&["a=7", "expr=x=y", "empty="])).unwrap();
        assert_eq!(args["a"], "7");
        assert_eq!(args["expr"], "x=y");
        assert_eq!(args["empty"], "");

        let err = parse_nbargs(&pairs(&["a=1", "novalue"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(parse_nbargs(&pairs(&["=3"])).is_err());
    }

    #[test]
    fn test_flags_map_to_caller_settings() {
        let cli = Cli::try_parse_from([
            "nbapp-launch",
            "-s",
            "-e",
            "analytics",
            "-t",
            "30",
            "--override",
            "stats",
            "n=3",
            "title=Q1",
        ])
        .unwrap();

        assert_eq!(cli.notebook, "stats");
        assert_eq!(cli.nbargs, pairs(&["n=3", "title=Q1"]));
        let caller = cli.caller();
        assert!(caller.override_mode);
        assert_eq!(caller.settings.mode, Some(json!("stream")));
        assert_eq!(caller.settings.env, Some(json!("analytics")));
        assert_eq!(caller.settings.timeout, Some(json!(30)));
    }

    #[test]
    fn test_stream_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["nbapp-launch", "-s", "-q", "stats"]).is_err());
        let cli = Cli::try_parse_from(["nbapp-launch", "-v", "stats"]).unwrap();
        assert!(cli.view);
        assert_eq!(cli.mode(), None);
    }
}
