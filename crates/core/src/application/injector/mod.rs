// Parameter Injector
// Binds caller-supplied values to the declared inputs of a document

mod value_types;

pub use value_types::{is_identifier, string_literal, text_literal, ValueType};

use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::{Notebook, ParameterError};
use crate::error::{AppError, Result};

/// Validated assignment statements, ready to be placed into a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    lines: Vec<String>,
}

impl Injection {
    /// Validate `values` against the declared `inputs` and build one
    /// assignment per input
    ///
    /// Runs without touching any environment, so a bad request is rejected
    /// before any subprocess or environment work.
    ///
    /// # Errors
    /// - AppError::Config for unknown type tags or unusable input names
    /// - AppError::Parameter naming every missing input, or the first malformed one
    pub fn prepare(
        inputs: &BTreeMap<String, String>,
        values: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut typed = Vec::with_capacity(inputs.len());
        for (name, tag) in inputs {
            if !is_identifier(name) {
                return Err(AppError::Config(format!(
                    "input name '{}' is not a valid identifier",
                    name
                )));
            }
            let value_type = ValueType::from_tag(tag).ok_or_else(|| {
                AppError::Config(format!(
                    "input '{}' declares unknown type '{}' (expected int|float|str|text)",
                    name, tag
                ))
            })?;
            typed.push((name, value_type));
        }

        let missing: Vec<String> = typed
            .iter()
            .filter(|(name, _)| !values.contains_key(*name))
            .map(|(name, _)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ParameterError::Missing { names: missing }.into());
        }

        let mut statements = Vec::with_capacity(typed.len());
        for (name, value_type) in typed {
            let raw = &values[name];
            let literal = value_type.literal(raw).map_err(|reason| ParameterError::Malformed {
                name: name.clone(),
                type_tag: value_type.tag().to_string(),
                value: raw.clone(),
                reason,
            })?;
            statements.push(format!("{} = {}", name, literal));
        }

        let undeclared: Vec<&String> = values.keys().filter(|k| !inputs.contains_key(*k)).collect();
        if !undeclared.is_empty() {
            debug!(undeclared = ?undeclared, "Ignoring values for undeclared inputs");
        }

        let count = statements.len();
        let lines = statements
            .into_iter()
            .enumerate()
            .map(|(i, stmt)| if i + 1 < count { stmt + "\n" } else { stmt })
            .collect();
        Ok(Self { lines })
    }

    /// Source lines of the assignment cell
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Copy of `document` whose first code cell is replaced by the
    /// assignments (inserted at position zero when there is none)
    pub fn apply(&self, document: &Notebook) -> Result<Notebook> {
        let mut injected = document.clone();
        let cell = injected.code_cell(&self.lines);
        let index = injected.replace_first_code_cell(cell)?;
        debug!(cell = index, statements = self.lines.len(), "Injected parameters");
        Ok(injected)
    }
}

/// Validate and inject in one step
pub fn inject(
    document: &Notebook,
    inputs: &BTreeMap<String, String>,
    values: &BTreeMap<String, String>,
) -> Result<Notebook> {
    Injection::prepare(inputs, values)?.apply(document)
}
