//! Constraint metadata: what is declared, where it comes from, and how it
//! is resolved into the per-type view the engine walks.
//!
//! - Declarations ([`ClassConfiguration`] and friends) are plain data,
//!   produced by any number of [`Configurer`]s.
//! - [`resolve`] merges declarations across configurers and the supertype
//!   chain into an immutable [`ResolvedClass`].
//! - [`store`] caches resolved classes in a snapshot that is replaced, never
//!   mutated, on reload.

mod configurer;
mod resolve;
mod store;

use indexmap::IndexMap;

use crate::check::Check;

pub use configurer::{Configurer, PojoConfigurer};
pub use resolve::{ResolvedClass, ResolvedConstructor, ResolvedLayer, ResolvedMethod, ResolvedParameter};
pub(crate) use store::{ClassCache, MetadataStore};

/// Constraints one configurer declares for one type.
#[derive(Clone, Debug, Default)]
pub struct ClassConfiguration {
    pub type_name: String,
    /// Discard what earlier configurers declared for this type.
    pub overwrite: bool,
    /// Re-validate the object after every guarded method call.
    pub check_invariants: Option<bool>,
    /// Object-level invariants, evaluated against the object itself.
    pub object_checks: Vec<Check>,
    pub fields: IndexMap<String, FieldConfiguration>,
    pub methods: IndexMap<String, MethodConfiguration>,
    pub constructor: Option<ConstructorConfiguration>,
}

impl ClassConfiguration {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn check_invariants(mut self, enabled: bool) -> Self {
        self.check_invariants = Some(enabled);
        self
    }

    pub fn object_check(mut self, check: Check) -> Self {
        self.object_checks.push(check);
        self
    }

    /// Add a field declaration. A second declaration for the same field
    /// in one configurer extends the first.
    pub fn field(mut self, field: FieldConfiguration) -> Self {
        match self.fields.get_mut(&field.name) {
            Some(existing) => existing.merge(field),
            None => {
                self.fields.insert(field.name.clone(), field);
            }
        }
        self
    }

    /// Add a method contract. A second declaration for the same method
    /// in one configurer extends the first.
    pub fn method(mut self, method: MethodConfiguration) -> Self {
        match self.methods.get_mut(&method.name) {
            Some(existing) => existing.merge(method),
            None => {
                self.methods.insert(method.name.clone(), method);
            }
        }
        self
    }

    pub fn constructor(mut self, constructor: ConstructorConfiguration) -> Self {
        self.constructor = Some(constructor);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct FieldConfiguration {
    pub name: String,
    pub overwrite: bool,
    pub checks: Vec<Check>,
    /// Ids of constraint sets whose checks apply to this field.
    pub constraint_sets: Vec<String>,
}

impl FieldConfiguration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn checks(mut self, checks: impl IntoIterator<Item = Check>) -> Self {
        self.checks.extend(checks);
        self
    }

    pub fn constraint_set(mut self, id: impl Into<String>) -> Self {
        self.constraint_sets.push(id.into());
        self
    }

    pub(crate) fn merge(&mut self, other: FieldConfiguration) {
        if other.overwrite {
            *self = other;
        } else {
            self.checks.extend(other.checks);
            self.constraint_sets.extend(other.constraint_sets);
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ParameterConfiguration {
    pub name: String,
    pub checks: Vec<Check>,
    pub constraint_sets: Vec<String>,
    /// Apply the checks declared on this field of the declaring type.
    pub field_constraints: Option<String>,
}

impl ParameterConfiguration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn constraint_set(mut self, id: impl Into<String>) -> Self {
        self.constraint_sets.push(id.into());
        self
    }

    pub fn field_constraints(mut self, field: impl Into<String>) -> Self {
        self.field_constraints = Some(field.into());
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct MethodConfiguration {
    pub name: String,
    pub overwrite: bool,
    pub parameters: Vec<ParameterConfiguration>,
    pub preconditions: Vec<Check>,
    pub postconditions: Vec<Check>,
    pub return_value_checks: Vec<Check>,
    /// Validate the receiver before the body runs.
    pub pre_validate_this: bool,
    /// Validate the receiver after the body returned.
    pub post_validate_this: bool,
}

impl MethodConfiguration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn parameter(mut self, parameter: ParameterConfiguration) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn precondition(mut self, check: Check) -> Self {
        self.preconditions.push(check);
        self
    }

    pub fn postcondition(mut self, check: Check) -> Self {
        self.postconditions.push(check);
        self
    }

    pub fn return_value(mut self, check: Check) -> Self {
        self.return_value_checks.push(check);
        self
    }

    pub fn pre_validate_this(mut self, enabled: bool) -> Self {
        self.pre_validate_this = enabled;
        self
    }

    pub fn post_validate_this(mut self, enabled: bool) -> Self {
        self.post_validate_this = enabled;
        self
    }

    pub(crate) fn merge(&mut self, other: MethodConfiguration) {
        if other.overwrite {
            *self = other;
            return;
        }
        merge_parameters(&mut self.parameters, other.parameters);
        self.preconditions.extend(other.preconditions);
        self.postconditions.extend(other.postconditions);
        self.return_value_checks.extend(other.return_value_checks);
        self.pre_validate_this |= other.pre_validate_this;
        self.post_validate_this |= other.post_validate_this;
    }
}

/// Parameters merge by position.
pub(crate) fn merge_parameters(
    acc: &mut Vec<ParameterConfiguration>,
    next: Vec<ParameterConfiguration>,
) {
    for (i, param) in next.into_iter().enumerate() {
        match acc.get_mut(i) {
            Some(existing) => {
                existing.checks.extend(param.checks);
                existing.constraint_sets.extend(param.constraint_sets);
                if param.field_constraints.is_some() {
                    existing.field_constraints = param.field_constraints;
                }
            }
            None => acc.push(param),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConstructorConfiguration {
    pub parameters: Vec<ParameterConfiguration>,
    pub post_validate_this: bool,
}

impl ConstructorConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parameter(mut self, parameter: ParameterConfiguration) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn post_validate_this(mut self, enabled: bool) -> Self {
        self.post_validate_this = enabled;
        self
    }
}

/// A reusable, named bundle of checks.
#[derive(Clone, Debug, Default)]
pub struct ConstraintSet {
    pub id: String,
    pub checks: Vec<Check>,
    /// Other sets whose checks are pulled in, in order, after these.
    pub includes: Vec<String>,
}

impl ConstraintSet {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn include(mut self, id: impl Into<String>) -> Self {
        self.includes.push(id.into());
        self
    }
}
