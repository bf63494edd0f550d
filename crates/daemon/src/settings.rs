//! Server settings
//!
//! Built-in defaults, then an optional TOML file, then `NBAPP_*` environment
//! variables. Paths accept `~`.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nbapp_api_rpc::RpcServerConfig;
use nbapp_core::application::{LauncherConfig, SupervisorConfig, DEFAULT_BASE_PACKAGES};
use nbapp_core::domain::{Mode, OutputFormat, SystemDefaults};
use nbapp_infra_system::{CondaConfig, DaemonHost, RunnerConfig};

pub const DEFAULT_CONFIG_PATH: &str = "~/.nbapp/server.toml";
const ENV_PREFIX: &str = "NBAPP";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub execute_args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub apps_dir: PathBuf,
    pub pid_file: PathBuf,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
    /// Working directory of the detached server
    pub home_dir: PathBuf,
    pub umask: u32,
    pub stop_timeout_secs: u64,
    pub conda: String,
    pub query_timeout_secs: u64,
    pub create_timeout_secs: u64,
    pub base_packages: Vec<String>,
    pub runner: RunnerSection,
    pub default_timeout_secs: u64,
    pub default_mode: String,
    pub default_format: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let rpc = RpcServerConfig::default();
        let defaults = SystemDefaults::default();
        let conda = CondaConfig::default();
        Self {
            host: rpc.host,
            port: rpc.port,
            apps_dir: rpc.apps_dir,
            pid_file: PathBuf::from("~/.nbapp/server.pid"),
            stdout_log: PathBuf::from("~/.nbapp/server.log"),
            stderr_log: PathBuf::from("~/.nbapp/server.err"),
            home_dir: PathBuf::from("~"),
            umask: 0o022,
            stop_timeout_secs: 10,
            conda: conda.executable,
            query_timeout_secs: conda.query_timeout.as_secs(),
            create_timeout_secs: conda.create_timeout.as_secs(),
            base_packages: DEFAULT_BASE_PACKAGES.iter().map(|p| p.to_string()).collect(),
            runner: RunnerSection::default(),
            default_timeout_secs: defaults.timeout_secs,
            default_mode: defaults.mode.as_str().to_string(),
            default_format: defaults.format.as_str().to_string(),
        }
    }
}

impl ServerSettings {
    /// Load settings from `path` (default location when `None`) and the
    /// process environment
    ///
    /// An explicitly given file must exist; the default one is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn load_with(path: Option<&Path>, env: Environment) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (expand(Path::new(DEFAULT_CONFIG_PATH)), false),
        };

        let settings: ServerSettings = Config::builder()
            .add_source(
                File::from(file.as_path())
                    .format(FileFormat::Toml)
                    .required(required),
            )
            .add_source(env)
            .build()
            .with_context(|| format!("failed to read settings from {}", file.display()))?
            .try_deserialize()
            .context("invalid server settings")?;

        settings.normalized()
    }

    fn normalized(mut self) -> Result<Self> {
        let cwd = std::env::current_dir().context("cannot determine working directory")?;
        self.apps_dir = absolute(&cwd, &expand(&self.apps_dir));
        self.pid_file = absolute(&cwd, &expand(&self.pid_file));
        self.stdout_log = absolute(&cwd, &expand(&self.stdout_log));
        self.stderr_log = absolute(&cwd, &expand(&self.stderr_log));
        self.home_dir = absolute(&cwd, &expand(&self.home_dir));
        // Validate early so a bad file fails at startup, not on first launch
        self.system_defaults()?;
        Ok(self)
    }

    pub fn system_defaults(&self) -> Result<SystemDefaults> {
        let mode: Mode = self
            .default_mode
            .parse()
            .map_err(|e: String| anyhow::anyhow!("default_mode: {}", e))?;
        let format: OutputFormat = self
            .default_format
            .parse()
            .map_err(|e: String| anyhow::anyhow!("default_format: {}", e))?;
        if self.default_timeout_secs == 0 {
            anyhow::bail!("default_timeout_secs must be positive");
        }
        Ok(SystemDefaults {
            timeout_secs: self.default_timeout_secs,
            mode,
            format,
        })
    }

    pub fn launcher_config(&self) -> Result<LauncherConfig> {
        Ok(LauncherConfig {
            base_packages: self.base_packages.clone(),
            defaults: self.system_defaults()?,
        })
    }

    pub fn conda_config(&self) -> CondaConfig {
        CondaConfig {
            executable: self.conda.clone(),
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            create_timeout: Duration::from_secs(self.create_timeout_secs),
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        let default = RunnerConfig::default();
        RunnerConfig {
            program: self.runner.program.clone().unwrap_or(default.program),
            args: self.runner.args.clone().unwrap_or(default.args),
            execute_args: self
                .runner
                .execute_args
                .clone()
                .unwrap_or(default.execute_args),
        }
    }

    pub fn rpc_config(&self) -> RpcServerConfig {
        RpcServerConfig {
            host: self.host.clone(),
            port: self.port,
            apps_dir: self.apps_dir.clone(),
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            ..SupervisorConfig::new(self.pid_file.clone())
        }
    }

    pub fn daemon_host(&self) -> DaemonHost {
        DaemonHost {
            home_dir: self.home_dir.clone(),
            umask: self.umask,
            stdout_log: self.stdout_log.clone(),
            stderr_log: self.stderr_log.clone(),
        }
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(Some(map))
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let settings =
            ServerSettings::load_with(Some(&write(&dir, "")), env(&[])).unwrap();

        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 5007);
        assert!(settings.pid_file.is_absolute());
        assert!(!settings.pid_file.to_string_lossy().contains('~'));
        let defaults = settings.system_defaults().unwrap();
        assert_eq!(defaults.timeout_secs, 10);
        assert_eq!(defaults.mode, Mode::Open);
        assert_eq!(settings.runner_config().program, "jupyter");
    }

    #[test]
    fn test_file_then_environment() {
        let dir = TempDir::new().unwrap();
        let file = write(
            &dir,
            r#"
port = 6000
apps_dir = "/srv/apps"
default_format = "md"
stop_timeout_secs = 3

[runner]
program = "nbrun"
"#,
        );
        let settings =
            ServerSettings::load_with(Some(&file), env(&[("NBAPP_PORT", "7000")])).unwrap();

        assert_eq!(settings.port, 7000);
        assert_eq!(settings.apps_dir, PathBuf::from("/srv/apps"));
        assert_eq!(
            settings.system_defaults().unwrap().format,
            OutputFormat::Markdown
        );
        assert_eq!(
            settings.supervisor_config().stop_timeout,
            Duration::from_secs(3)
        );
        let runner = settings.runner_config();
        assert_eq!(runner.program, "nbrun");
        assert_eq!(runner.args, RunnerConfig::default().args);
    }

    #[test]
    fn test_invalid_default_mode_rejected() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "default_mode = \"loud\"\n");
        let err = ServerSettings::load_with(Some(&file), env(&[])).unwrap_err();
        assert!(format!("{:#}", err).contains("default_mode"));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(ServerSettings::load_with(Some(&missing), env(&[])).is_err());
    }

    fn write(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("server.toml");
        std::fs::write(&path, body).unwrap();
        path
    }
}
