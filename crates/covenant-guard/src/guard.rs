use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use covenant_types::{Reflect, Value};
use covenant_validator::{ConstraintViolation, ConstraintsViolatedError, Validator};
use tracing::{debug, warn};

use crate::config::{EnforcementMode, GuardConfig};
use crate::error::GuardError;
use crate::guarded::Guarded;
use crate::listener::ConstraintsViolatedListener;

/// Enforces method contracts on the objects it guards.
///
/// Shared behind an `Arc`: every [`Guarded`] handle keeps its guard alive.
/// Switches and listeners can be changed at any time and affect calls that
/// start afterwards.
pub struct Guard {
    validator: Arc<Validator>,
    listeners: RwLock<Vec<Arc<dyn ConstraintsViolatedListener>>>,
    mode: RwLock<EnforcementMode>,
    active: AtomicBool,
    parameters: AtomicBool,
    preconditions: AtomicBool,
    postconditions: AtomicBool,
    invariants: AtomicBool,
}

/// Which phases run, read once per call.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Phases {
    pub parameters: bool,
    pub preconditions: bool,
    pub postconditions: bool,
    pub invariants: bool,
}

impl Guard {
    /// Guard with the default configuration: every phase on, exception mode.
    pub fn new(validator: Arc<Validator>) -> Arc<Self> {
        GuardConfig::default().build(validator)
    }

    pub(crate) fn from_config(config: GuardConfig, validator: Arc<Validator>) -> Self {
        Self {
            validator,
            listeners: RwLock::new(Vec::new()),
            mode: RwLock::new(config.mode),
            active: AtomicBool::new(true),
            parameters: AtomicBool::new(config.parameters),
            preconditions: AtomicBool::new(config.preconditions),
            postconditions: AtomicBool::new(config.postconditions),
            invariants: AtomicBool::new(config.invariants),
        }
    }

    pub fn validator(&self) -> &Arc<Validator> {
        &self.validator
    }

    /// Wrap `value` so calls through the handle are checked.
    pub fn guard<T: Reflect>(self: &Arc<Self>, value: T) -> Guarded<T> {
        Guarded::new(Arc::new(value), Arc::clone(self))
    }

    /// Wrap an already shared value. The handle shares its identity.
    pub fn guard_arc<T: Reflect>(self: &Arc<Self>, value: Arc<T>) -> Guarded<T> {
        Guarded::new(value, Arc::clone(self))
    }

    /// Check constructor arguments, build the value with `ctor`, then check
    /// the new object if its type asks for it.
    ///
    /// `Ok(None)` means the arguments were rejected in notify mode without
    /// `proceed`, and `ctor` was not called.
    pub fn construct<T, E, F>(
        self: &Arc<Self>,
        args: Vec<Value>,
        ctor: F,
    ) -> Result<Option<Guarded<T>>, GuardError<E>>
    where
        T: Reflect,
        F: FnOnce(&[Value]) -> Result<T, E>,
    {
        if !self.is_active() {
            let value = ctor(&args).map_err(GuardError::Delegate)?;
            return Ok(Some(self.guard(value)));
        }
        let phases = self.phases();
        let descriptor = T::descriptor();

        if phases.parameters {
            let violations = self
                .validator
                .validate_constructor_parameters(&descriptor, &args)?;
            if !self.enforce(violations).map_err(GuardError::Violated)? {
                debug!(type_name = descriptor.name(), "construction suppressed");
                return Ok(None);
            }
        }

        let guarded = self.guard(ctor(&args).map_err(GuardError::Delegate)?);

        if phases.invariants && self.validator.constructor_post_validates(&descriptor)? {
            let violations = self.validator.validate_invariants(guarded.object(), None)?;
            self.enforce(violations).map_err(GuardError::Violated)?;
        }
        Ok(Some(guarded))
    }

    pub fn add_listener(&self, listener: Arc<dyn ConstraintsViolatedListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Remove a listener by identity. Returns whether it was registered.
    pub fn remove_listener(&self, listener: &Arc<dyn ConstraintsViolatedListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn has_listener(&self, listener: &Arc<dyn ConstraintsViolatedListener>) -> bool {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|l| Arc::ptr_eq(l, listener))
    }

    pub fn mode(&self) -> EnforcementMode {
        *self.mode.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_mode(&self, mode: EnforcementMode) {
        *self.mode.write().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Switch contract enforcement off or on entirely.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn set_parameter_checks(&self, enabled: bool) {
        self.parameters.store(enabled, Ordering::Release);
    }

    pub fn set_precondition_checks(&self, enabled: bool) {
        self.preconditions.store(enabled, Ordering::Release);
    }

    pub fn set_postcondition_checks(&self, enabled: bool) {
        self.postconditions.store(enabled, Ordering::Release);
    }

    pub fn set_invariant_checks(&self, enabled: bool) {
        self.invariants.store(enabled, Ordering::Release);
    }

    pub(crate) fn phases(&self) -> Phases {
        Phases {
            parameters: self.parameters.load(Ordering::Acquire),
            preconditions: self.preconditions.load(Ordering::Acquire),
            postconditions: self.postconditions.load(Ordering::Acquire),
            invariants: self.invariants.load(Ordering::Acquire),
        }
    }

    /// Report `violations` and apply the enforcement mode.
    ///
    /// `Ok(true)` lets the call go on, `Ok(false)` suppresses it.
    pub(crate) fn enforce(
        &self,
        violations: Vec<ConstraintViolation>,
    ) -> Result<bool, ConstraintsViolatedError> {
        let Some(error) = ConstraintsViolatedError::new(violations) else {
            return Ok(true);
        };
        self.notify(&error);
        match self.mode() {
            EnforcementMode::Exception => Err(error),
            EnforcementMode::Notify { proceed } => Ok(proceed),
        }
    }

    /// Deliver to every listener in registration order.
    fn notify(&self, error: &ConstraintsViolatedError) {
        // Snapshot so listeners may register or remove listeners themselves.
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (index, listener) in listeners.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_constraints_violated(error))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(listener = index, error = %e, "constraints-violated listener failed"),
                Err(_) => warn!(listener = index, "constraints-violated listener panicked"),
            }
        }
    }
}
