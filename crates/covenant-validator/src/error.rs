use covenant_types::ConfigurationError;
use thiserror::Error;

use crate::violation::ConstraintsViolatedError;

#[derive(Clone, Debug, Error)]
pub enum ValidationError {
    /// The constraint metadata could not be evaluated. Not a data problem.
    #[error("validation of {context} failed: {source}")]
    Failed {
        context: String,
        #[source]
        source: ConfigurationError,
    },
    #[error(transparent)]
    ConstraintsViolated(#[from] ConstraintsViolatedError),
}

impl ValidationError {
    pub(crate) fn failed(context: impl Into<String>, source: ConfigurationError) -> Self {
        Self::Failed {
            context: context.into(),
            source,
        }
    }

    /// The wrapped configuration error, if this is one.
    pub fn configuration_error(&self) -> Option<&ConfigurationError> {
        match self {
            Self::Failed { source, .. } => Some(source),
            Self::ConstraintsViolated(_) => None,
        }
    }
}
