// Execution settings: raw (per source), resolved, and system defaults

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Default execution timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// How the executed result is presented to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Write the result to disk and open it
    Open,
    /// Stream the result to stdout
    Stream,
    /// Write the result to disk silently
    Quiet,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Open => "open",
            Mode::Stream => "stream",
            Mode::Quiet => "quiet",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Mode::Open),
            "stream" => Ok(Mode::Stream),
            "quiet" => Ok(Mode::Quiet),
            other => Err(format!(
                "unrecognized mode '{}' (expected open|stream|quiet)",
                other
            )),
        }
    }
}

/// Output format of the exported document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    #[serde(rename = "html")]
    Html,
    #[serde(rename = "md", alias = "markdown")]
    Markdown,
    #[serde(rename = "py", alias = "python")]
    Python,
}

impl OutputFormat {
    /// Canonical short name (`html`, `md`, `py`)
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "md",
            OutputFormat::Python => "py",
        }
    }

    /// Exporter name understood by the notebook runner
    pub fn exporter(&self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Python => "python",
        }
    }

    /// File extension for written artifacts
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(OutputFormat::Html),
            "md" | "markdown" => Ok(OutputFormat::Markdown),
            "py" | "python" => Ok(OutputFormat::Python),
            other => Err(format!(
                "unrecognized format '{}' (expected html|md|py)",
                other
            )),
        }
    }
}

/// Unvalidated settings from a single source (document metadata or caller)
///
/// Values stay as written, whatever their JSON type, so that malformed input
/// is reported by the resolver as a configuration problem instead of failing
/// document deserialization. `null` reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Value>,
}

/// Caller-supplied settings plus the override switch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerSettings {
    pub settings: RawSettings,
    /// When set, any caller value wins over the document metadata
    pub override_mode: bool,
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingSource {
    Caller,
    Document,
    Default,
}

/// System defaults, lowest precedence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemDefaults {
    pub timeout_secs: u64,
    pub mode: Mode,
    pub format: OutputFormat,
}

impl Default for SystemDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            mode: Mode::Open,
            format: OutputFormat::Html,
        }
    }
}

/// Final settings after merging all sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSettings {
    pub timeout_secs: u64,
    pub mode: Mode,
    pub format: OutputFormat,
    pub output: Option<String>,
    /// Environment name or prefix path; `None` runs in the host environment
    pub env: Option<String>,
    pub env_source: SettingSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_aliases() {
        assert_eq!("markdown".parse::<OutputFormat>(), Ok(OutputFormat::Markdown));
        assert_eq!("PY".parse::<OutputFormat>(), Ok(OutputFormat::Python));
        assert!("pdf".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Markdown.exporter(), "markdown");
    }

    #[test]
    fn test_mode_parse_rejects_unknown() {
        assert_eq!("Stream".parse::<Mode>(), Ok(Mode::Stream));
        let err = "api".parse::<Mode>().unwrap_err();
        assert!(err.contains("api"));
    }

    #[test]
    fn test_format_serde_alias() {
        let fmt: OutputFormat = serde_json::from_str("\"python\"").unwrap();
        assert_eq!(fmt, OutputFormat::Python);
        assert_eq!(serde_json::to_string(&fmt).unwrap(), "\"py\"");
    }
}
