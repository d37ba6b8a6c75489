use std::sync::Arc;

use covenant_validator::Validator;
use serde::{Deserialize, Serialize};

use crate::guard::Guard;

/// What a guard does when a contract is violated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Fail the call with [`GuardError::Violated`](crate::GuardError::Violated).
    /// A violation before the call means the body never runs.
    #[default]
    Exception,
    /// Only notify listeners. On entry, `proceed` decides whether the body
    /// still runs; a suppressed call returns `Ok(None)`.
    Notify { proceed: bool },
}

#[derive(Clone, Debug)]
pub struct GuardConfig {
    pub(crate) mode: EnforcementMode,
    pub(crate) parameters: bool,
    pub(crate) preconditions: bool,
    pub(crate) postconditions: bool,
    pub(crate) invariants: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            mode: EnforcementMode::default(),
            parameters: true,
            preconditions: true,
            postconditions: true,
            invariants: true,
        }
    }
}

impl GuardConfig {
    pub fn mode(mut self, mode: EnforcementMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn check_parameters(mut self, enabled: bool) -> Self {
        self.parameters = enabled;
        self
    }

    pub fn check_preconditions(mut self, enabled: bool) -> Self {
        self.preconditions = enabled;
        self
    }

    /// Also governs return-value checks.
    pub fn check_postconditions(mut self, enabled: bool) -> Self {
        self.postconditions = enabled;
        self
    }

    pub fn check_invariants(mut self, enabled: bool) -> Self {
        self.invariants = enabled;
        self
    }

    pub fn build(self, validator: Arc<Validator>) -> Arc<Guard> {
        Arc::new(Guard::from_config(self, validator))
    }
}
