//! Result presentation per mode

use nbapp_core::domain::{Mode, OutputFormat};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// An exported document ready to be shown
#[derive(Debug, Clone)]
pub struct Rendered {
    pub name: String,
    pub format: OutputFormat,
    pub mode: Mode,
    /// Requested artifact name, defaults to the app name
    pub output: Option<String>,
    pub content: String,
}

/// What presenting did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presented {
    Streamed,
    Written(PathBuf),
    Opened(PathBuf),
    /// Written, but the platform opener failed
    OpenFailed { path: PathBuf, reason: String },
}

/// Present `rendered`; files are written relative to `out_dir`
pub fn present(
    rendered: &Rendered,
    out_dir: &Path,
    stdout: &mut dyn Write,
) -> std::io::Result<Presented> {
    match rendered.mode {
        Mode::Stream => {
            stdout.write_all(rendered.content.as_bytes())?;
            if !rendered.content.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
            stdout.flush()?;
            Ok(Presented::Streamed)
        }
        Mode::Quiet => Ok(Presented::Written(write_result(rendered, out_dir)?)),
        Mode::Open => {
            let path = write_result(rendered, out_dir)?;
            match open_with_platform(&path) {
                Ok(()) => Ok(Presented::Opened(path)),
                Err(e) => Ok(Presented::OpenFailed {
                    path,
                    reason: e.to_string(),
                }),
            }
        }
    }
}

/// `<out_dir>/<output or name>.<ext>`; an absolute output is kept as is
pub fn result_path(rendered: &Rendered, out_dir: &Path) -> PathBuf {
    let base = rendered.output.as_deref().unwrap_or(&rendered.name);
    let ext = format!(".{}", rendered.format.extension());
    let file = if base.ends_with(&ext) {
        base.to_string()
    } else {
        format!("{}{}", base, ext)
    };
    let path = Path::new(&file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        out_dir.join(path)
    }
}

fn write_result(rendered: &Rendered, out_dir: &Path) -> std::io::Result<PathBuf> {
    let path = result_path(rendered, out_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, rendered.content.as_bytes())?;
    debug!(path = %path.display(), bytes = rendered.content.len(), "Result written");
    Ok(path)
}

fn open_with_platform(path: &Path) -> std::io::Result<()> {
    let status = opener(path).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("opener exited with {}", status)))
    }
}

fn opener(path: &Path) -> Command {
    if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(path);
        cmd
    } else if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]).arg(path);
        cmd
    } else {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(path);
        cmd
    }
}
