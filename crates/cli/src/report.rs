//! Failure diagnostics and exit codes

use colored::Colorize;
use nbapp_api_rpc::error::code;
use nbapp_api_rpc::types::FormResponse;
use nbapp_core::domain::NotebookApp;
use nbapp_core::error::{AppError, ErrorCategory};
use tabled::{Table, Tabled};

use crate::rpc::JsonRpcError;

const PARAMETER_EXIT: i32 = 2;

#[derive(Tabled)]
struct InputRow {
    input: String,
    #[tabled(rename = "type")]
    type_tag: String,
    status: String,
}

/// A failed launch, ready to be printed
#[derive(Debug)]
pub struct Failure {
    pub exit_code: i32,
    pub message: String,
    /// Declared inputs (name, type tag)
    pub expected: Vec<(String, String)>,
    /// Inputs the failure refers to
    pub offending: Vec<String>,
    /// Show the expected-inputs table
    pub show_inputs: bool,
}

impl Failure {
    pub fn app(err: &AppError, app: Option<&NotebookApp>) -> Self {
        let offending = match err {
            AppError::Parameter(e) => e.names().into_iter().map(str::to_string).collect(),
            _ => Vec::new(),
        };
        let expected = app
            .map(|app| {
                app.inputs()
                    .iter()
                    .map(|(name, type_tag)| (name.clone(), type_tag.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            exit_code: err.exit_code(),
            message: err.to_string(),
            expected,
            offending,
            show_inputs: matches!(
                err.category(),
                ErrorCategory::Parameter | ErrorCategory::Format
            ),
        }
    }

    pub fn remote(err: &JsonRpcError, form: Option<&FormResponse>) -> Self {
        Self {
            exit_code: remote_exit_code(err.code),
            message: err.message.clone(),
            expected: expected_of(form),
            offending: err.inputs(),
            show_inputs: err.code == code::PARAMETER_ERROR || err.code == code::FORMAT_ERROR,
        }
    }

    /// The server answered with an input form instead of a result
    pub fn form(form: &FormResponse) -> Self {
        Self {
            exit_code: PARAMETER_EXIT,
            message: format!("missing input parameter(s): {}", form.missing.join(", ")),
            expected: expected_of(Some(form)),
            offending: form.missing.clone(),
            show_inputs: true,
        }
    }

    pub fn other(err: anyhow::Error) -> Self {
        Self {
            exit_code: 1,
            message: format!("{:#}", err),
            expected: Vec::new(),
            offending: Vec::new(),
            show_inputs: false,
        }
    }

    pub fn render(&self, notebook: &str) -> String {
        let mut out = format!("{} {}\n", "✗".red().bold(), self.message.red());

        if self.show_inputs && !self.expected.is_empty() {
            let rows: Vec<InputRow> = self
                .expected
                .iter()
                .map(|(name, type_tag)| InputRow {
                    input: name.clone(),
                    type_tag: type_tag.clone(),
                    status: if self.offending.contains(name) {
                        "missing or invalid".to_string()
                    } else {
                        "ok".to_string()
                    },
                })
                .collect();
            out.push('\n');
            out.push_str(&Table::new(rows).to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.usage(notebook));
        out.push('\n');
        out
    }

    fn usage(&self, notebook: &str) -> String {
        if self.exit_code == PARAMETER_EXIT && !self.expected.is_empty() {
            let pairs: Vec<String> = self
                .expected
                .iter()
                .map(|(name, type_tag)| format!("{}=<{}>", name, type_tag))
                .collect();
            format!(
                "{} nbapp-launch {} {}",
                "usage:".bold(),
                notebook,
                pairs.join(" ")
            )
        } else {
            format!(
                "{} nbapp-launch [OPTIONS] NOTEBOOK [KEY=VALUE]... (see --help)",
                "usage:".bold()
            )
        }
    }
}

fn expected_of(form: Option<&FormResponse>) -> Vec<(String, String)> {
    form.map(|form| {
        form.inputs
            .iter()
            .map(|field| (field.name.clone(), field.type_tag.clone()))
            .collect()
    })
    .unwrap_or_default()
}

/// Exit code for an RPC error code, same families as local failures
pub fn remote_exit_code(rpc_code: i32) -> i32 {
    match rpc_code {
        code::PARAMETER_ERROR => 2,
        code::NOT_FOUND | code::FORMAT_ERROR | code::CONFIG_ERROR | code::FORBIDDEN => 1,
        code::ENVIRONMENT_ERROR | code::EXECUTION_ERROR | code::TIMEOUT => 3,
        code::INTERNAL_ERROR => 4,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbapp_api_rpc::types::FormField;
    use nbapp_core::domain::ParameterError;

    #[test]
    fn test_remote_codes_match_local_families() {
        assert_eq!(remote_exit_code(code::PARAMETER_ERROR), 2);
        assert_eq!(remote_exit_code(code::NOT_FOUND), 1);
        assert_eq!(remote_exit_code(code::TIMEOUT), 3);
        assert_eq!(remote_exit_code(code::ENVIRONMENT_ERROR), 3);
        assert_eq!(remote_exit_code(code::INTERNAL_ERROR), 4);
        assert_eq!(remote_exit_code(-32602), 1);
    }

    #[test]
    fn test_parameter_failure_lists_inputs() {
        let form = FormResponse {
            name: "squares".into(),
            desc: "Squares".into(),
            inputs: vec![
                FormField {
                    name: "n".into(),
                    type_tag: "int".into(),
                },
                FormField {
                    name: "title".into(),
                    type_tag: "str".into(),
                },
            ],
            missing: vec!["n".into()],
        };
        let failure = Failure::form(&form);
        assert_eq!(failure.exit_code, 2);

        let text = failure.render("squares");
        assert!(text.contains("missing input parameter(s): n"));
        assert!(text.contains("title"));
        assert!(text.contains("missing or invalid"));
        assert!(text.contains("n=<int> title=<str>"));
    }

    #[test]
    fn test_app_failure_without_table() {
        let failure = Failure::app(&AppError::Timeout(10), None);
        assert_eq!(failure.exit_code, 3);
        assert!(!failure.show_inputs);
        assert!(failure.render("x").contains("--help"));

        let param = Failure::app(
            &AppError::Parameter(ParameterError::Missing {
                names: vec!["a".into()],
            }),
            None,
        );
        assert_eq!(param.offending, vec!["a".to_string()]);
    }
}
