// Environment Resolver
// Decides whether to reuse an existing environment or create a fresh one

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::environment::package_name;
use crate::domain::{EnvironmentState, ResolvedEnvironment};
use crate::port::{EnvironmentError, EnvironmentManager};

/// Upper bound on resolver state transitions (inspect -> create-unique -> done)
pub const MAX_RESOLVE_STEPS: usize = 4;

/// Upper bound on the `_N` suffix tried for a unique name
pub const MAX_NAME_SUFFIX: u32 = 10_000;

/// Resolver states
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    /// Look at the base environment
    Inspect,
    /// Base environment satisfies every required package
    Reuse,
    /// Base environment is absent: create it under its own name
    CreateBase,
    /// Never touch the base environment: create `<base>_<n>`
    CreateUnique,
}

pub struct EnvironmentResolver {
    manager: Arc<dyn EnvironmentManager>,
}

impl EnvironmentResolver {
    pub fn new(manager: Arc<dyn EnvironmentManager>) -> Self {
        Self { manager }
    }

    /// Resolve the environment to execute in
    ///
    /// With `reuse_allowed`, an existing `base_name` is reused only when it
    /// contains every required package. A missing package, or an environment
    /// whose packages cannot be listed, leads to a fresh uniquely named
    /// environment; an existing environment is never modified.
    ///
    /// # Errors
    /// - EnvironmentError from the manager when listing or creation fails
    pub async fn resolve_environment(
        &self,
        base_name: &str,
        required: &[String],
        channels: &[String],
        reuse_allowed: bool,
    ) -> Result<ResolvedEnvironment, EnvironmentError> {
        let mut step = if reuse_allowed {
            Step::Inspect
        } else {
            Step::CreateUnique
        };
        let mut observed = None;

        for _ in 0..MAX_RESOLVE_STEPS {
            step = match step {
                Step::Inspect => {
                    let existing = self.existing_names().await?;
                    if !existing.contains(base_name) {
                        observed = Some(EnvironmentState::Absent);
                        Step::CreateBase
                    } else {
                        match self.manager.installed_packages(base_name).await {
                            Ok(installed) => {
                                let missing = missing_packages(required, &installed);
                                if missing.is_empty() {
                                    observed = Some(EnvironmentState::ExistingCompatible);
                                    Step::Reuse
                                } else {
                                    info!(
                                        env = %base_name,
                                        missing = ?missing,
                                        "Existing environment lacks packages, creating a new one"
                                    );
                                    observed = Some(EnvironmentState::ExistingIncompatible);
                                    Step::CreateUnique
                                }
                            }
                            Err(e) => {
                                // Inspection failure counts as "everything missing"
                                warn!(
                                    env = %base_name,
                                    error = %e,
                                    "Cannot inspect environment, creating a new one"
                                );
                                observed = Some(EnvironmentState::ExistingIncompatible);
                                Step::CreateUnique
                            }
                        }
                    }
                }
                Step::Reuse => {
                    info!(env = %base_name, "Reusing existing environment");
                    return Ok(ResolvedEnvironment {
                        name: base_name.to_string(),
                        state: EnvironmentState::ExistingCompatible,
                        observed,
                    });
                }
                Step::CreateBase => {
                    self.create(base_name, required, channels).await?;
                    return Ok(ResolvedEnvironment {
                        name: base_name.to_string(),
                        state: EnvironmentState::Created,
                        observed,
                    });
                }
                Step::CreateUnique => {
                    let existing = self.existing_names().await?;
                    let name = unique_name(base_name, &existing)?;
                    self.create(&name, required, channels).await?;
                    return Ok(ResolvedEnvironment {
                        name,
                        state: EnvironmentState::Created,
                        observed,
                    });
                }
            };
        }

        Err(EnvironmentError::Unsettled(MAX_RESOLVE_STEPS))
    }

    async fn existing_names(&self) -> Result<HashSet<String>, EnvironmentError> {
        Ok(self
            .manager
            .list()
            .await?
            .into_iter()
            .map(|env| env.name)
            .collect())
    }

    /// Create an environment; a failed create leaves no environment behind
    /// under that name
    async fn create(
        &self,
        name: &str,
        required: &[String],
        channels: &[String],
    ) -> Result<(), EnvironmentError> {
        info!(env = %name, packages = ?required, channels = ?channels, "Creating environment");
        match self.manager.create(name, required, channels).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(env = %name, error = %e, "Environment creation failed, cleaning up");
                if let Err(cleanup) = self.manager.remove(name).await {
                    warn!(env = %name, error = %cleanup, "Cleanup of partial environment failed");
                }
                Err(e)
            }
        }
    }
}

/// Required packages (by bare name) not present in `installed`
pub fn missing_packages(required: &[String], installed: &HashSet<String>) -> Vec<String> {
    required
        .iter()
        .map(|spec| package_name(spec))
        .filter(|name| !installed.contains(name))
        .collect()
}

/// `<base>_<n>` with the lowest `n >= 1` not present in `existing`
pub fn unique_name(base: &str, existing: &HashSet<String>) -> Result<String, EnvironmentError> {
    (1..=MAX_NAME_SUFFIX)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !existing.contains(candidate))
        .ok_or_else(|| EnvironmentError::NameExhausted(base.to_string()))
}
