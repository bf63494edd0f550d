//! RPC Request/Response Types
//!
//! JSON-RPC method parameters and results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// app.launch.v1 - Run a notebook app
#[derive(Debug, Default, Deserialize)]
pub struct LaunchRequest {
    /// App name inside the apps directory (without `.ipynb`)
    pub notebook: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    // Settings are validated by the launcher, so a mistyped value is a
    // configuration error rather than invalid params
    #[serde(default)]
    pub env: Option<Value>,
    #[serde(default)]
    pub format: Option<Value>,
    #[serde(default)]
    pub timeout: Option<Value>,
    #[serde(default)]
    pub mode: Option<Value>,
    #[serde(default)]
    pub output: Option<Value>,
    /// Caller values win over document metadata
    #[serde(default, rename = "override")]
    pub override_mode: bool,
    #[serde(default)]
    pub view: bool,
    /// Return the input form instead of failing when inputs are missing
    #[serde(default)]
    pub form_if_missing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LaunchResponse {
    Output(OutputResponse),
    Form(FormResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputResponse {
    pub name: String,
    pub run_id: String,
    pub format: String,
    /// Resolved presentation mode, for the client to apply
    pub mode: String,
    #[serde(default)]
    pub output: Option<String>,
    pub content: String,
    /// Environment the document ran in, if any
    pub environment: Option<String>,
    pub duration_ms: i64,
}

/// app.form.v1 - Describe the inputs of a notebook app
#[derive(Debug, Deserialize)]
pub struct FormRequest {
    pub notebook: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormResponse {
    pub name: String,
    pub desc: String,
    pub inputs: Vec<FormField>,
    /// Inputs the request did not supply
    #[serde(default)]
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
}

/// admin.shutdown.v1 - Stop the service
#[derive(Debug, Default, Deserialize)]
pub struct ShutdownRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct ShutdownResponse {
    pub accepted: bool,
}
