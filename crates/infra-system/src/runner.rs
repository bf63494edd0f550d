// Notebook runner command line
use serde::{Deserialize, Serialize};

use nbapp_core::domain::OutputFormat;

/// How to invoke the notebook execution entry point
///
/// The runner reads a serialized document on stdin and writes the exported
/// document on stdout. `{format}` and `{timeout}` in any argument are
/// replaced per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Appended only when the document is executed (not in view mode)
    pub execute_args: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: "jupyter".to_string(),
            args: vec![
                "nbconvert".to_string(),
                "--stdin".to_string(),
                "--stdout".to_string(),
                "--log-level=ERROR".to_string(),
                "--to".to_string(),
                "{format}".to_string(),
            ],
            execute_args: vec![
                "--execute".to_string(),
                "--ExecutePreprocessor.timeout={timeout}".to_string(),
            ],
        }
    }
}

impl RunnerConfig {
    /// Arguments for one run
    pub fn arguments(&self, format: OutputFormat, timeout_secs: u64, execute: bool) -> Vec<String> {
        let timeout = timeout_secs.to_string();
        let extra: &[String] = if execute { &self.execute_args } else { &[] };
        self.args
            .iter()
            .chain(extra.iter())
            .map(|arg| {
                arg.replace("{format}", format.exporter())
                    .replace("{timeout}", &timeout)
            })
            .collect()
    }
}
