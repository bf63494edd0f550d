// Environment Manager Port
// Abstraction over the package-environment manager (create/list/inspect by name)

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

/// Environment manager errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("command `{command}` timed out after {secs}s")]
    CommandTimeout { command: String, secs: u64 },

    #[error("unexpected output from `{command}`: {message}")]
    UnexpectedOutput { command: String, message: String },

    #[error("environment not found: {0}")]
    NotFound(String),

    #[error("no free environment name derived from '{0}'")]
    NameExhausted(String),

    #[error("environment resolution did not settle after {0} steps")]
    Unsettled(usize),
}

/// An existing environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentInfo {
    pub name: String,
    pub prefix: PathBuf,
}

/// Environment Manager trait
///
/// Implementations:
/// - CondaEnvironmentManager: drives the `conda` CLI
/// - InMemoryEnvironmentManager: test double
#[async_trait]
pub trait EnvironmentManager: Send + Sync {
    /// List existing environments
    async fn list(&self) -> Result<Vec<EnvironmentInfo>, EnvironmentError>;

    /// Bare names of the packages installed in `name`
    async fn installed_packages(&self, name: &str) -> Result<HashSet<String>, EnvironmentError>;

    /// Create `name` with `packages`, looking them up in `channels` first
    ///
    /// This is the only operation that mutates external state.
    async fn create(
        &self,
        name: &str,
        packages: &[String],
        channels: &[String],
    ) -> Result<(), EnvironmentError>;

    /// Remove `name` (used to clean up after a failed create)
    async fn remove(&self, name: &str) -> Result<(), EnvironmentError>;

    /// Prefix directory of `name`
    async fn prefix(&self, name: &str) -> Result<PathBuf, EnvironmentError> {
        self.list()
            .await?
            .into_iter()
            .find(|env| env.name == name)
            .map(|env| env.prefix)
            .ok_or_else(|| EnvironmentError::NotFound(name.to_string()))
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::environment::package_name;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct MockEnv {
        prefix: PathBuf,
        packages: HashSet<String>,
    }

    /// In-memory environment manager for testing
    pub struct InMemoryEnvironmentManager {
        root: PathBuf,
        envs: Mutex<BTreeMap<String, MockEnv>>,
        broken_inspection: Mutex<HashSet<String>>,
        fail_create: Mutex<bool>,
        created: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
    }

    impl InMemoryEnvironmentManager {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self {
                root: root.into(),
                envs: Mutex::new(BTreeMap::new()),
                broken_inspection: Mutex::new(HashSet::new()),
                fail_create: Mutex::new(false),
                created: Mutex::new(Vec::new()),
                removed: Mutex::new(Vec::new()),
            }
        }

        /// Seed an existing environment
        pub fn with_env(self, name: &str, packages: &[&str]) -> Self {
            self.insert(name, packages.iter().map(|p| p.to_string()).collect());
            self
        }

        /// Make package inspection of `name` fail
        pub fn break_inspection(&self, name: &str) {
            self.broken_inspection
                .lock()
                .unwrap()
                .insert(name.to_string());
        }

        pub fn fail_create(&self, fail: bool) {
            *self.fail_create.lock().unwrap() = fail;
        }

        pub fn created(&self) -> Vec<String> {
            self.created.lock().unwrap().clone()
        }

        pub fn removed(&self) -> Vec<String> {
            self.removed.lock().unwrap().clone()
        }

        pub fn names(&self) -> Vec<String> {
            self.envs.lock().unwrap().keys().cloned().collect()
        }

        pub fn packages_of(&self, name: &str) -> Option<HashSet<String>> {
            self.envs
                .lock()
                .unwrap()
                .get(name)
                .map(|env| env.packages.clone())
        }

        fn insert(&self, name: &str, packages: Vec<String>) {
            let env = MockEnv {
                prefix: self.root.join("envs").join(name),
                packages: packages.iter().map(|p| package_name(p)).collect(),
            };
            self.envs.lock().unwrap().insert(name.to_string(), env);
        }
    }

    #[async_trait]
    impl EnvironmentManager for InMemoryEnvironmentManager {
        async fn list(&self) -> Result<Vec<EnvironmentInfo>, EnvironmentError> {
            Ok(self
                .envs
                .lock()
                .unwrap()
                .iter()
                .map(|(name, env)| EnvironmentInfo {
                    name: name.clone(),
                    prefix: env.prefix.clone(),
                })
                .collect())
        }

        async fn installed_packages(
            &self,
            name: &str,
        ) -> Result<HashSet<String>, EnvironmentError> {
            if self.broken_inspection.lock().unwrap().contains(name) {
                return Err(EnvironmentError::CommandFailed {
                    command: format!("list -n {}", name),
                    message: "inspection failed".to_string(),
                });
            }
            self.packages_of(name)
                .ok_or_else(|| EnvironmentError::NotFound(name.to_string()))
        }

        async fn create(
            &self,
            name: &str,
            packages: &[String],
            _channels: &[String],
        ) -> Result<(), EnvironmentError> {
            if *self.fail_create.lock().unwrap() {
                // Leave a partial environment behind, like an interrupted install
                self.insert(name, Vec::new());
                return Err(EnvironmentError::CommandFailed {
                    command: format!("create -n {}", name),
                    message: "solver failed".to_string(),
                });
            }
            self.insert(name, packages.to_vec());
            self.created.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn remove(&self, name: &str) -> Result<(), EnvironmentError> {
            self.envs.lock().unwrap().remove(name);
            self.removed.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }
}
