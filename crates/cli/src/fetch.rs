//! Locating the notebook document: local path, URL, or app name

use nbapp_api_rpc::handler::resolve_notebook;
use nbapp_core::error::{AppError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const NOTEBOOK_EXTENSION: &str = ".ipynb";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Path(PathBuf),
    Url(String),
    /// Looked up in the apps directory
    Name(String),
}

impl Source {
    pub fn classify(notebook: &str) -> Self {
        let lower = notebook.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Source::Url(notebook.to_string())
        } else if Path::new(notebook).exists() {
            Source::Path(PathBuf::from(notebook))
        } else {
            Source::Name(notebook.to_string())
        }
    }
}

/// Resolve `notebook` to a local document path, downloading URLs into
/// `cache_dir`
pub async fn locate(notebook: &str, apps_dir: &Path, cache_dir: &Path) -> Result<PathBuf> {
    match Source::classify(notebook) {
        Source::Path(path) => Ok(path),
        Source::Name(name) => {
            let path = resolve_notebook(apps_dir, &name)?;
            debug!(name = %name, path = %path.display(), "Resolved app name");
            Ok(path)
        }
        Source::Url(url) => download(&url, cache_dir).await,
    }
}

async fn download(url: &str, cache_dir: &Path) -> Result<PathBuf> {
    info!(url = %url, "Fetching notebook");
    let response = reqwest::get(url)
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(format!("cannot access {}: {}", url, e))))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(AppError::NotFound(format!("notebook {}", url)));
    }
    if !status.is_success() {
        return Err(AppError::Io(std::io::Error::other(format!(
            "cannot fetch {}: HTTP {}",
            url, status
        ))));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(format!("cannot read {}: {}", url, e))))?;

    std::fs::create_dir_all(cache_dir)?;
    let path = cache_dir.join(url_file_name(url));
    std::fs::write(&path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "Notebook cached");
    Ok(path)
}

/// File name implied by a URL path, with the notebook extension
pub fn url_file_name(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let last = path
        .split('/')
        .skip(1)
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .last()
        .unwrap_or("notebook");

    if last.ends_with(NOTEBOOK_EXTENSION) {
        last.to_string()
    } else {
        format!("{}{}", last, NOTEBOOK_EXTENSION)
    }
}
