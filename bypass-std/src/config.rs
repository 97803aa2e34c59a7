//! Manager configuration.

use bypass_core::ResidencyPolicy;
use std::sync::Arc;

/// Injection key used when none is configured.
pub const DEFAULT_INJECTION_KEY: &str = "bypass";

/// Settings for an [`InjectionManager`](crate::injection::InjectionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Key every hook of the manager is installed under.
    pub injection_key: Arc<str>,
    /// Weight placement for each adapter call.
    pub policy: ResidencyPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerConfig {
    /// Default key and full residency policy.
    pub fn new() -> Self {
        Self {
            injection_key: Arc::from(DEFAULT_INJECTION_KEY),
            policy: ResidencyPolicy::default(),
        }
    }

    /// Set the injection key.
    pub fn with_injection_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.injection_key = key.into();
        self
    }

    /// Set the residency policy.
    pub fn with_policy(mut self, policy: ResidencyPolicy) -> Self {
        self.policy = policy;
        self
    }
}
