//! Object constraint validation.
//!
//! Constraints are declared per type by [`Configurer`]s, resolved through
//! the type's supertype chain, and evaluated by a [`Validator`] against
//! live object graphs. The [`contract`] module exposes the method-level
//! phases a call interceptor needs.

pub mod check;
pub mod composition;
pub mod config;
pub mod contract;
pub mod error;
pub mod expression;
pub mod message;
pub mod metadata;
pub mod profiles;
pub mod validator;
pub mod violation;

#[cfg(test)]
pub(crate) mod fixtures;

pub use check::{Check, CheckKind, CustomCheck, EngineServices};
pub use config::{CascadeReporting, GroupReporting, ValidatorConfig};
pub use contract::{MethodContract, OldValues};
pub use error::ValidationError;
pub use expression::{Bindings, ExpressionLanguage, ExpressionLanguages, FunctionLanguage, PathLanguage};
pub use metadata::{
    ClassConfiguration, ConstraintSet, ConstructorConfiguration, Configurer, FieldConfiguration,
    MethodConfiguration, ParameterConfiguration, PojoConfigurer, ResolvedClass,
};
pub use validator::Validator;
pub use violation::{ConstraintViolation, ConstraintsViolatedError};
