// Domain Error Types

use thiserror::Error;

/// Caller-supplied input values that cannot be bound to the declared inputs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("missing input parameter(s): {}", .names.join(", "))]
    Missing { names: Vec<String> },

    #[error("input '{name}' expects {type_tag}, got {value:?}: {reason}")]
    Malformed {
        name: String,
        type_tag: String,
        value: String,
        reason: String,
    },
}

impl ParameterError {
    /// Input names this error refers to
    pub fn names(&self) -> Vec<&str> {
        match self {
            ParameterError::Missing { names } => names.iter().map(String::as_str).collect(),
            ParameterError::Malformed { name, .. } => vec![name.as_str()],
        }
    }
}
