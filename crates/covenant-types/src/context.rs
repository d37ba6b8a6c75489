use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a validated value came from.
///
/// Contexts are value types: two violations raised at the same logical
/// location carry equal contexts, which is what violation de-duplication
/// keys on. `Display` renders the stable diagnostic address used as
/// `{context}` in messages.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Context {
    /// Object-level invariant of a type.
    Class { declaring_type: String },
    Field {
        declaring_type: String,
        field: String,
    },
    ConstructorParameter {
        declaring_type: String,
        index: usize,
        name: String,
    },
    MethodParameter {
        declaring_type: String,
        method: String,
        index: usize,
        name: String,
    },
    MethodReturnValue {
        declaring_type: String,
        method: String,
    },
    /// Precondition evaluated before the method body.
    MethodEntry {
        declaring_type: String,
        method: String,
    },
    /// Postcondition evaluated after a successful return.
    MethodExit {
        declaring_type: String,
        method: String,
    },
    /// Object invariant re-checked after the method body ran.
    MethodPostExecution {
        declaring_type: String,
        method: String,
    },
}

impl Context {
    pub fn field(declaring_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Field {
            declaring_type: declaring_type.into(),
            field: field.into(),
        }
    }

    pub fn class(declaring_type: impl Into<String>) -> Self {
        Self::Class {
            declaring_type: declaring_type.into(),
        }
    }

    pub fn declaring_type(&self) -> &str {
        match self {
            Self::Class { declaring_type }
            | Self::Field { declaring_type, .. }
            | Self::ConstructorParameter { declaring_type, .. }
            | Self::MethodParameter { declaring_type, .. }
            | Self::MethodReturnValue { declaring_type, .. }
            | Self::MethodEntry { declaring_type, .. }
            | Self::MethodExit { declaring_type, .. }
            | Self::MethodPostExecution { declaring_type, .. } => declaring_type,
        }
    }

    /// Method name for method-scoped contexts.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::MethodParameter { method, .. }
            | Self::MethodReturnValue { method, .. }
            | Self::MethodEntry { method, .. }
            | Self::MethodExit { method, .. }
            | Self::MethodPostExecution { method, .. } => Some(method),
            _ => None,
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class { declaring_type } => write!(f, "{declaring_type}"),
            Self::Field {
                declaring_type,
                field,
            } => write!(f, "{declaring_type}.{field}"),
            Self::ConstructorParameter {
                declaring_type,
                index,
                name,
            } => write!(f, "{declaring_type}::new parameter {index} ({name})"),
            Self::MethodParameter {
                declaring_type,
                method,
                index,
                name,
            } => write!(f, "{declaring_type}.{method} parameter {index} ({name})"),
            Self::MethodReturnValue {
                declaring_type,
                method,
            } => write!(f, "{declaring_type}.{method} return value"),
            Self::MethodEntry {
                declaring_type,
                method,
            } => write!(f, "{declaring_type}.{method} (entry)"),
            Self::MethodExit {
                declaring_type,
                method,
            } => write!(f, "{declaring_type}.{method} (exit)"),
            Self::MethodPostExecution {
                declaring_type,
                method,
            } => write!(f, "{declaring_type}.{method} (post-execution)"),
        }
    }
}
