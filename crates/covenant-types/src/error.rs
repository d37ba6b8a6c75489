/// A declaration that cannot be evaluated: the metadata is broken, not the data.
///
/// Never reported as a violation. The engine aborts the current call and
/// wraps this so callers can tell it apart from invalid data.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("field {type_name}.{field} does not exist")]
    UnknownField { type_name: String, field: String },
    #[error("method {type_name}.{method} not found")]
    UnknownMethod { type_name: String, method: String },
    #[error("constraint set '{id}' is not declared by any configurer")]
    UnknownConstraintSet { id: String },
    #[error("constraint set cycle: {}", path.join(" -> "))]
    ConstraintSetCycle { path: Vec<String> },
    #[error("invalid parameter for {check}: {reason}")]
    InvalidParameter { check: String, reason: String },
    #[error("no expression language registered for '{language}'")]
    UnknownLanguage { language: String },
    #[error("invalid {language} expression '{expression}': {reason}")]
    InvalidExpression {
        language: String,
        expression: String,
        reason: String,
    },
    #[error("{language} expression '{expression}' produced {actual}, expected a boolean")]
    NonBooleanResult {
        language: String,
        expression: String,
        actual: String,
    },
    #[error("{check} cannot be evaluated as a member check")]
    UnsupportedCheck { check: String },
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum DomainError {
    #[error("descriptor '{descriptor}' does not describe {actual}")]
    DescriptorMismatch { descriptor: String, actual: String },
}
