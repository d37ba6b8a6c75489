use covenant_validator::{ConstraintsViolatedError, ValidationError};
use thiserror::Error;

/// Why a guarded call did not produce a value.
#[derive(Debug, Error)]
pub enum GuardError<E> {
    /// The contract was violated and the guard enforces by failing the call.
    #[error(transparent)]
    Violated(ConstraintsViolatedError),
    /// A declaration could not be evaluated.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The guarded body failed. Postconditions were not evaluated.
    #[error("guarded call failed: {0}")]
    Delegate(E),
}

impl<E> GuardError<E> {
    pub fn violations(&self) -> Option<&ConstraintsViolatedError> {
        match self {
            Self::Violated(e) => Some(e),
            _ => None,
        }
    }
}

/// A listener could not handle a notification.
#[derive(Clone, Debug, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl From<&str> for ListenerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for ListenerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}
