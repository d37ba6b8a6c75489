use std::sync::{Mutex, PoisonError};

use covenant_validator::{ConstraintViolation, ConstraintsViolatedError};

use crate::error::ListenerError;

/// Hears about every violated guarded call, whatever the enforcement mode.
///
/// Listeners run synchronously on the calling thread, in registration
/// order. A failing or panicking listener is logged and skipped.
pub trait ConstraintsViolatedListener: Send + Sync {
    fn on_constraints_violated(&self, error: &ConstraintsViolatedError) -> Result<(), ListenerError>;
}

#[derive(Debug, Default)]
struct Received {
    errors: Vec<ConstraintsViolatedError>,
    violations: Vec<ConstraintViolation>,
}

/// Listener that keeps everything it receives, for probing contracts
/// without failing calls.
#[derive(Debug, Default)]
pub struct ConstraintsViolatedAdapter {
    received: Mutex<Received>,
}

impl ConstraintsViolatedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors in the order they arrived.
    pub fn errors(&self) -> Vec<ConstraintsViolatedError> {
        self.lock().errors.clone()
    }

    /// Violations of every received error, in arrival order.
    pub fn violations(&self) -> Vec<ConstraintViolation> {
        self.lock().violations.clone()
    }

    pub fn clear(&self) {
        let mut received = self.lock();
        received.errors.clear();
        received.violations.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Received> {
        self.received.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConstraintsViolatedListener for ConstraintsViolatedAdapter {
    fn on_constraints_violated(&self, error: &ConstraintsViolatedError) -> Result<(), ListenerError> {
        let mut received = self.lock();
        received.violations.extend_from_slice(error.violations());
        received.errors.push(error.clone());
        Ok(())
    }
}
