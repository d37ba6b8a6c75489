//! Call interception around guarded objects.
//!
//! A [`Guard`] wraps objects in [`Guarded`] handles. Every call made through
//! [`Guarded::invoke`] runs the method's contract: parameter checks and
//! preconditions before the body, postconditions and invariants after a
//! successful return. What happens on a violation is decided by the
//! guard's [`EnforcementMode`]; registered listeners hear about every one.

pub mod config;
pub mod error;
pub mod guard;
pub mod guarded;
pub mod listener;

#[cfg(test)]
pub(crate) mod fixtures;

pub use config::{EnforcementMode, GuardConfig};
pub use error::{GuardError, ListenerError};
pub use guard::Guard;
pub use guarded::Guarded;
pub use listener::{ConstraintsViolatedAdapter, ConstraintsViolatedListener};
