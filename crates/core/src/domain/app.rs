// Notebook App - one execution request built from a document path

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::notebook::Notebook;
use crate::domain::settings::RawSettings;
use crate::error::{AppError, Result};

/// App settings embedded in a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// Input name -> declared type tag
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(flatten)]
    pub settings: RawSettings,
    #[serde(default)]
    pub pkgs: Vec<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    /// Argument values of the last run (written back before execution)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nbargs: BTreeMap<String, String>,
}

/// A notebook document plus its app metadata
///
/// The document held here is never mutated by a launch; injection and
/// metadata write-back operate on a copy, so re-running with new values
/// always starts from the declared inputs.
#[derive(Debug, Clone)]
pub struct NotebookApp {
    /// Stable identifier derived from the file name
    pub name: String,
    /// Absolute path of the document
    pub path: PathBuf,
    pub document: Notebook,
    pub meta: AppMeta,
}

impl NotebookApp {
    /// Load an app from a document path
    ///
    /// # Errors
    /// - AppError::NotFound if the path does not exist
    /// - AppError::Format if the document or its app metadata is malformed
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let absolute = std::fs::canonicalize(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::NotFound(format!("notebook {}", path.display()))
            }
            _ => AppError::Io(e),
        })?;
        let bytes = std::fs::read(&absolute)?;
        let document = Notebook::from_slice(&bytes)?;
        Self::from_document(absolute, document)
    }

    pub fn from_document(path: PathBuf, document: Notebook) -> Result<Self> {
        let meta = document.app_meta()?;
        let name = app_name(&path);
        Ok(Self {
            name,
            path,
            document,
            meta,
        })
    }

    /// Directory relative resources of the document resolve against
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("/"))
    }

    pub fn desc(&self) -> &str {
        self.meta.desc.as_deref().unwrap_or(&self.name)
    }

    pub fn inputs(&self) -> &BTreeMap<String, String> {
        &self.meta.inputs
    }

    /// Declared inputs with no supplied value
    pub fn missing_inputs(&self, values: &BTreeMap<String, String>) -> Vec<String> {
        self.meta
            .inputs
            .keys()
            .filter(|name| !values.contains_key(*name))
            .cloned()
            .collect()
    }
}

/// App name from a document path (`/apps/My Stats.ipynb` -> `My Stats`)
pub fn app_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "nbapp".to_string())
}
