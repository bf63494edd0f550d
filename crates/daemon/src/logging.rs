//! Logging setup
//!
//! `RUST_LOG` overrides the default filter; `NBAPP_LOG_FORMAT=json` switches
//! to structured JSON lines.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "nbapp=info";

/// Where log lines go
#[derive(Debug, Clone)]
pub enum LogTarget {
    Stderr,
    /// Appended through a non-blocking writer
    File(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("NBAPP_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop and must be held for
/// as long as the process logs. A second call is a no-op.
pub fn init(target: LogTarget) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("failed to create env filter")?;
    let format = LogFormat::from_env();

    match target {
        LogTarget::Stderr => {
            let registry = tracing_subscriber::registry().with(env_filter);
            let _ = match format {
                LogFormat::Json => registry
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .try_init(),
                LogFormat::Pretty => registry
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .try_init(),
            };
            Ok(None)
        }
        LogTarget::File(path) => {
            let (dir, file_name) = split(&path)?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let registry = tracing_subscriber::registry().with(env_filter);
            let _ = match format {
                LogFormat::Json => registry
                    .with(fmt::layer().json().with_writer(writer))
                    .try_init(),
                LogFormat::Pretty => registry
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .try_init(),
            };
            Ok(Some(guard))
        }
    }
}

fn split(path: &Path) -> Result<(PathBuf, String)> {
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .with_context(|| format!("log path {} has no file name", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((dir, file_name))
}
