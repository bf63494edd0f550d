// Notebook document model
//
// The document stays an opaque JSON tree; only the cell list, cell type/source
// and the app metadata section are interpreted. Both the current layout
// (top-level `cells`) and the legacy worksheet layout are supported.

use serde_json::{json, Map, Value};

use crate::domain::app::AppMeta;
use crate::error::{AppError, Result};

/// Reserved key under the document `metadata` holding app settings
pub const APP_META_KEY: &str = "nbapp";

/// Older key for the same section, read when the reserved key is absent
pub const LEGACY_APP_META_KEY: &str = "conda.app";

/// Tag attached to the cell produced by parameter injection
pub const INJECTED_CELL_TAG: &str = "injected-parameters";

/// Cell-list layout of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `cells` at top level, code under `source`
    Current,
    /// `worksheets[0].cells`, code under `input`
    Worksheets,
}

/// A structured, cell-based notebook document
#[derive(Debug, Clone, PartialEq)]
pub struct Notebook {
    root: Value,
    layout: Layout,
}

impl Notebook {
    /// Parse a serialized document
    ///
    /// # Errors
    /// - AppError::Format if the bytes are not a JSON object with a cell list
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let root: Value = serde_json::from_slice(bytes)
            .map_err(|e| AppError::Format(format!("document is not valid JSON: {}", e)))?;
        Self::from_value(root)
    }

    pub fn from_value(root: Value) -> Result<Self> {
        if !root.is_object() {
            return Err(AppError::Format("document root is not an object".into()));
        }
        let layout = if root.get("cells").map_or(false, Value::is_array) {
            Layout::Current
        } else if root
            .pointer("/worksheets/0/cells")
            .map_or(false, Value::is_array)
        {
            Layout::Worksheets
        } else {
            return Err(AppError::Format("document has no cell list".into()));
        };
        Ok(Self { root, layout })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.root)?)
    }

    fn cells_pointer(&self) -> &'static str {
        match self.layout {
            Layout::Current => "/cells",
            Layout::Worksheets => "/worksheets/0/cells",
        }
    }

    pub fn cells(&self) -> &[Value] {
        self.root
            .pointer(self.cells_pointer())
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn cells_mut(&mut self) -> Result<&mut Vec<Value>> {
        let pointer = self.cells_pointer();
        self.root
            .pointer_mut(pointer)
            .and_then(Value::as_array_mut)
            .ok_or_else(|| AppError::Format("document has no cell list".into()))
    }

    /// Index of the first directly executable cell
    pub fn first_code_cell(&self) -> Option<usize> {
        self.cells()
            .iter()
            .position(|cell| cell_type(cell) == Some("code"))
    }

    /// Replace the first code cell with `cell`, or insert it at position zero
    /// when the document has no code cell
    pub fn replace_first_code_cell(&mut self, cell: Value) -> Result<usize> {
        let index = self.first_code_cell();
        let cells = self.cells_mut()?;
        match index {
            Some(i) => {
                cells[i] = cell;
                Ok(i)
            }
            None => {
                cells.insert(0, cell);
                Ok(0)
            }
        }
    }

    /// Build a code cell in this document's layout
    pub fn code_cell(&self, lines: &[String]) -> Value {
        let source: Vec<Value> = lines.iter().map(|l| Value::String(l.clone())).collect();
        let metadata = json!({ "tags": [INJECTED_CELL_TAG] });
        match self.layout {
            Layout::Current => json!({
                "cell_type": "code",
                "execution_count": null,
                "metadata": metadata,
                "outputs": [],
                "source": source,
            }),
            Layout::Worksheets => json!({
                "cell_type": "code",
                "collapsed": false,
                "input": source,
                "language": "python",
                "metadata": metadata,
                "outputs": [],
            }),
        }
    }

    /// Read app metadata
    ///
    /// The reserved metadata key wins, then the legacy `conda.app` key;
    /// otherwise the JSON content of the last raw cell is used.
    ///
    /// # Errors
    /// - AppError::Format if no location holds a valid app metadata object
    pub fn app_meta(&self) -> Result<AppMeta> {
        let metadata = self.root.get("metadata");
        for key in [APP_META_KEY, LEGACY_APP_META_KEY] {
            if let Some(meta) = metadata.and_then(|m| m.get(key)) {
                return serde_json::from_value(meta.clone()).map_err(|e| {
                    AppError::Format(format!("invalid '{}' metadata: {}", key, e))
                });
            }
        }

        let raw = self
            .cells()
            .iter()
            .rev()
            .find(|cell| cell_type(cell) == Some("raw"))
            .ok_or_else(|| {
                AppError::Format(format!(
                    "no app metadata: none of metadata.{}, metadata.{} or a raw metadata cell is present",
                    APP_META_KEY, LEGACY_APP_META_KEY
                ))
            })?;

        serde_json::from_str(&cell_source(raw))
            .map_err(|e| AppError::Format(format!("last raw cell is not app metadata: {}", e)))
    }

    /// Record app metadata under the reserved key
    pub fn set_app_meta(&mut self, meta: &AppMeta) -> Result<()> {
        let value = serde_json::to_value(meta)?;
        let root = self
            .root
            .as_object_mut()
            .ok_or_else(|| AppError::Format("document root is not an object".into()))?;
        let metadata = root
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        if let Some(map) = metadata.as_object_mut() {
            map.insert(APP_META_KEY.to_string(), value);
        }
        Ok(())
    }
}

/// Type tag of a cell (`code`, `markdown`, `raw`, ...)
pub fn cell_type(cell: &Value) -> Option<&str> {
    cell.get("cell_type").and_then(Value::as_str)
}

/// Source text of a cell; joins line lists
pub fn cell_source(cell: &Value) -> String {
    match cell.get("source").or_else(|| cell.get("input")) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(lines)) => lines.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}
