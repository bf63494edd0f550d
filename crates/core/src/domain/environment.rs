// Environment domain model

use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// Where the runner subprocess executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentTarget {
    /// The host's current environment (no dedicated environment)
    Host,
    /// A named environment known to the environment manager
    Named(String),
    /// An environment addressed by its prefix directory
    Path(PathBuf),
}

impl EnvironmentTarget {
    /// Classify a resolved `env` setting
    ///
    /// Anything containing a path separator is treated as a prefix path.
    pub fn from_setting(env: Option<&str>) -> Self {
        match env {
            None => EnvironmentTarget::Host,
            Some(value) if looks_like_path(value) => EnvironmentTarget::Path(PathBuf::from(value)),
            Some(name) => EnvironmentTarget::Named(name.to_string()),
        }
    }

    pub fn name(&self) -> Option<String> {
        match self {
            EnvironmentTarget::Host => None,
            EnvironmentTarget::Named(name) => Some(name.clone()),
            EnvironmentTarget::Path(path) => Some(path.display().to_string()),
        }
    }
}

fn looks_like_path(value: &str) -> bool {
    value.contains('/') || value.contains('\\') || value.starts_with('.') || value.starts_with('~')
}

/// Observed or produced state of an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentState {
    Absent,
    ExistingCompatible,
    ExistingIncompatible,
    Created,
}

/// Outcome of environment resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEnvironment {
    /// Environment to execute in
    pub name: String,
    /// `ExistingCompatible` when reused, `Created` otherwise
    pub state: EnvironmentState,
    /// State of the requested base environment when it was inspected
    pub observed: Option<EnvironmentState>,
}

/// Bare package name of a package spec (`numpy>=1.20` -> `numpy`)
pub fn package_name(spec: &str) -> String {
    let spec = spec.trim();
    let end = spec
        .find(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~' | ' ' | '[' | ';'))
        .unwrap_or(spec.len());
    spec[..end].to_ascii_lowercase()
}

/// Union of fixed base dependencies and document packages, deduplicated by
/// bare name, base dependencies first
pub fn required_packages(base: &[String], document: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    base.iter()
        .chain(document.iter())
        .filter(|spec| !spec.trim().is_empty())
        .filter(|spec| seen.insert(package_name(spec)))
        .map(|spec| spec.trim().to_string())
        .collect()
}

/// Normalized environment name derived from an app name
///
/// Lower-cased, whitespace runs become a single hyphen, characters an
/// environment manager would reject are dropped.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.trim().chars() {
        if c.is_whitespace() {
            pending_hyphen = !slug.is_empty();
            continue;
        }
        if !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.')) {
            continue;
        }
        if pending_hyphen {
            slug.push('-');
            pending_hyphen = false;
        }
        slug.extend(c.to_lowercase());
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "nbapp".to_string()
    } else {
        slug
    }
}
