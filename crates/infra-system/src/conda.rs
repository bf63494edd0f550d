// Conda environment manager
// Drives the `conda` CLI with --json output; every command is time-bounded
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::process_group::{drain, kill_tree, spawn_reader};

use nbapp_core::domain::environment::package_name;
use nbapp_core::port::{EnvironmentError, EnvironmentInfo, EnvironmentManager};

/// Default bound for list/inspect/remove commands
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound for environment creation (downloads and installs)
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(900);

/// Wait between SIGTERM and SIGKILL for a timed-out conda command
const KILL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct CondaConfig {
    /// `conda` executable (name on PATH or absolute path)
    pub executable: String,
    pub query_timeout: Duration,
    pub create_timeout: Duration,
}

impl Default for CondaConfig {
    fn default() -> Self {
        Self {
            executable: "conda".to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            create_timeout: DEFAULT_CREATE_TIMEOUT,
        }
    }
}

pub struct CondaEnvironmentManager {
    config: CondaConfig,
}

impl CondaEnvironmentManager {
    pub fn new(config: CondaConfig) -> Self {
        Self { config }
    }

    /// Run one conda command and return its stdout
    async fn run(&self, args: &[String], limit: Duration) -> Result<String, EnvironmentError> {
        let command = format!("{} {}", self.config.executable, args.join(" "));
        debug!(command = %command, timeout_secs = limit.as_secs(), "Running conda command");

        let mut cmd = Command::new(&self.config.executable);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so a timeout also reaches the solver's children
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| EnvironmentError::CommandFailed {
            command: command.clone(),
            message: e.to_string(),
        })?;
        let pid = child.id();
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = match timeout(limit, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                kill_tree(&mut child, pid, KILL_GRACE).await;
                return Err(EnvironmentError::CommandFailed {
                    command,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %command, pid = ?pid, "Conda command timed out");
                kill_tree(&mut child, pid, KILL_GRACE).await;
                return Err(EnvironmentError::CommandTimeout {
                    command,
                    secs: limit.as_secs(),
                });
            }
        };

        let stdout = drain(stdout).await;
        let stderr = drain(stderr).await;
        if !status.success() {
            return Err(EnvironmentError::CommandFailed {
                command,
                message: failure_message(&stdout, &stderr, status.code()),
            });
        }
        Ok(stdout)
    }

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }
}

#[async_trait]
impl EnvironmentManager for CondaEnvironmentManager {
    async fn list(&self) -> Result<Vec<EnvironmentInfo>, EnvironmentError> {
        let args = Self::args(&["env", "list", "--json"]);
        let stdout = self.run(&args, self.config.query_timeout).await?;
        parse_env_list(&stdout).map_err(|message| EnvironmentError::UnexpectedOutput {
            command: "conda env list".to_string(),
            message,
        })
    }

    async fn installed_packages(&self, name: &str) -> Result<HashSet<String>, EnvironmentError> {
        let args = Self::args(&["list", "-n", name, "--json"]);
        let stdout = self.run(&args, self.config.query_timeout).await?;
        parse_package_list(&stdout).map_err(|message| EnvironmentError::UnexpectedOutput {
            command: format!("conda list -n {}", name),
            message,
        })
    }

    async fn create(
        &self,
        name: &str,
        packages: &[String],
        channels: &[String],
    ) -> Result<(), EnvironmentError> {
        let mut args = Self::args(&["create", "-y", "--json", "-n", name]);
        for channel in channels {
            args.push("-c".to_string());
            args.push(channel.clone());
        }
        args.extend(packages.iter().cloned());

        info!(env = %name, packages = ?packages, "Creating conda environment");
        self.run(&args, self.config.create_timeout).await?;
        info!(env = %name, "Conda environment created");
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), EnvironmentError> {
        let args = Self::args(&["env", "remove", "-y", "-n", name]);
        self.run(&args, self.config.query_timeout).await?;
        info!(env = %name, "Conda environment removed");
        Ok(())
    }
}

#[derive(Deserialize)]
struct EnvList {
    envs: Vec<PathBuf>,
}

/// `conda env list --json` -> environments named by prefix
///
/// Environments under an `envs` directory are named after their directory;
/// the root installation is `base`.
pub fn parse_env_list(stdout: &str) -> Result<Vec<EnvironmentInfo>, String> {
    let list: EnvList = serde_json::from_str(stdout).map_err(|e| e.to_string())?;
    Ok(list
        .envs
        .into_iter()
        .map(|prefix| EnvironmentInfo {
            name: env_name(&prefix),
            prefix,
        })
        .collect())
}

fn env_name(prefix: &Path) -> String {
    let in_envs_dir = prefix
        .parent()
        .and_then(Path::file_name)
        .map_or(false, |dir| dir == "envs");
    match prefix.file_name() {
        Some(name) if in_envs_dir => name.to_string_lossy().into_owned(),
        _ => "base".to_string(),
    }
}

#[derive(Deserialize)]
struct PackageEntry {
    name: String,
}

/// `conda list -n NAME --json` -> bare package names
pub fn parse_package_list(stdout: &str) -> Result<HashSet<String>, String> {
    let entries: Vec<PackageEntry> = serde_json::from_str(stdout).map_err(|e| e.to_string())?;
    Ok(entries.iter().map(|p| package_name(&p.name)).collect())
}

/// Best diagnostic from a failed command: the JSON error conda prints on
/// stdout with --json, else stderr, else the exit status
fn failure_message(stdout: &str, stderr: &str, code: Option<i32>) -> String {
    let from_json = serde_json::from_str::<Value>(stdout).ok().and_then(|v| {
        v.get("message")
            .or_else(|| v.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    from_json
        .or_else(|| Some(stderr.trim().to_string()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| format!("exit status {:?}", code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_list() {
        let envs = parse_env_list(
            r#"{"envs": ["/opt/conda", "/opt/conda/envs/stats", "/home/u/.conda/envs/stats_1"]}"#,
        )
        .unwrap();
        let names: Vec<&str> = envs.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["base", "stats", "stats_1"]);
        assert_eq!(envs[1].prefix, PathBuf::from("/opt/conda/envs/stats"));
    }

    #[test]
    fn test_parse_package_list() {
        let pkgs = parse_package_list(
            r#"[{"name": "NumPy", "version": "1.26"}, {"name": "python", "version": "3.11"}]"#,
        )
        .unwrap();
        assert!(pkgs.contains("numpy"));
        assert!(pkgs.contains("python"));
        assert!(parse_package_list("{}").is_err());
    }

    #[test]
    fn test_failure_message_prefers_conda_json() {
        assert_eq!(
            failure_message(r#"{"error": "PackagesNotFoundError"}"#, "noise", Some(1)),
            "PackagesNotFoundError"
        );
        assert_eq!(failure_message("", " solver failed \n", Some(1)), "solver failed");
        assert_eq!(failure_message("", "", Some(3)), "exit status Some(3)");
    }

    #[cfg(unix)]
    mod with_fake_conda {
        use super::*;
        use crate::test_support::script;

        fn manager(conda: &Path, query: Duration) -> CondaEnvironmentManager {
            CondaEnvironmentManager::new(CondaConfig {
                executable: conda.display().to_string(),
                query_timeout: query,
                create_timeout: query,
            })
        }

        #[tokio::test]
        async fn test_list_and_inspect() {
            let tmp = tempfile::tempdir().unwrap();
            let conda = script(
                tmp.path(),
                "conda",
                r#"case "$1" in
  env) echo '{"envs": ["/c", "/c/envs/demo"]}' ;;
  list) echo '[{"name": "python"}, {"name": "nbconvert"}]' ;;
  *) exit 2 ;;
esac"#,
            );
            let mgr = manager(&conda, Duration::from_secs(10));

            let envs = mgr.list().await.unwrap();
            assert_eq!(envs.len(), 2);
            assert_eq!(mgr.prefix("demo").await.unwrap(), PathBuf::from("/c/envs/demo"));
            assert!(matches!(
                mgr.prefix("other").await,
                Err(EnvironmentError::NotFound(_))
            ));
            assert!(mgr.installed_packages("demo").await.unwrap().contains("nbconvert"));
        }

        #[tokio::test]
        async fn test_create_passes_channels_and_packages() {
            let tmp = tempfile::tempdir().unwrap();
            let log = tmp.path().join("args.log");
            let conda = script(
                tmp.path(),
                "conda",
                &format!("echo \"$@\" >> {}\necho '{{\"success\": true}}'", log.display()),
            );
            let mgr = manager(&conda, Duration::from_secs(10));

            mgr.create("demo", &["numpy".into(), "python".into()], &["conda-forge".into()])
                .await
                .unwrap();
            let logged = std::fs::read_to_string(&log).unwrap();
            assert_eq!(
                logged.trim(),
                "create -y --json -n demo -c conda-forge numpy python"
            );
        }

        #[tokio::test]
        async fn test_command_failure_surfaces_message() {
            let tmp = tempfile::tempdir().unwrap();
            let conda = script(
                tmp.path(),
                "conda",
                r#"echo '{"error": "PackagesNotFoundError: nope"}'; exit 1"#,
            );
            let err = manager(&conda, Duration::from_secs(10))
                .create("demo", &["nope".into()], &[])
                .await
                .unwrap_err();
            match err {
                EnvironmentError::CommandFailed { message, .. } => {
                    assert!(message.contains("PackagesNotFoundError"))
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_command_timeout() {
            let tmp = tempfile::tempdir().unwrap();
            let conda = script(tmp.path(), "conda", "sleep 5");
            let started = std::time::Instant::now();
            let err = manager(&conda, Duration::from_millis(200))
                .list()
                .await
                .unwrap_err();
            assert!(matches!(err, EnvironmentError::CommandTimeout { .. }));
            assert!(started.elapsed() < Duration::from_secs(3));
        }

        #[tokio::test]
        async fn test_timeout_kills_background_children() {
            let tmp = tempfile::tempdir().unwrap();
            let marker = tmp.path().join("solver-finished");
            let conda = script(
                tmp.path(),
                "conda",
                &format!("(sleep 1; touch {}) &\nsleep 5", marker.display()),
            );
            let err = manager(&conda, Duration::from_millis(200))
                .list()
                .await
                .unwrap_err();
            assert!(matches!(err, EnvironmentError::CommandTimeout { .. }));

            tokio::time::sleep(Duration::from_millis(1500)).await;
            assert!(!marker.exists(), "background child outlived the timeout");
        }

        #[tokio::test]
        async fn test_unexpected_output() {
            let tmp = tempfile::tempdir().unwrap();
            let conda = script(tmp.path(), "conda", "echo not-json");
            let err = manager(&conda, Duration::from_secs(10)).list().await.unwrap_err();
            assert!(matches!(err, EnvironmentError::UnexpectedOutput { .. }));
        }
    }
}
