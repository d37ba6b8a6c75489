//! Turning declarations into the per-type view the engine walks.
//!
//! For a type `T` with supertypes `S1, S2, ...` (nearest first):
//! 1. each type in the chain is looked up in every configurer, and the
//!    contributions are merged in registration order (append, or replace
//!    where `overwrite` is set);
//! 2. constraint-set references are expanded, depth first, with cycle
//!    detection;
//! 3. parameter `field_constraints` are resolved against the expanded
//!    field checks of the whole chain.
//!
//! The result is immutable and shared behind an `Arc`.

use std::collections::HashSet;
use std::sync::Arc;

use covenant_types::ConfigurationError;
use indexmap::IndexMap;

use super::{
    ClassConfiguration, Configurer, ConstructorConfiguration, MethodConfiguration,
    ParameterConfiguration, merge_parameters,
};
use crate::check::Check;

/// Effective constraints for one runtime type.
#[derive(Clone, Debug, Default)]
pub struct ResolvedClass {
    pub type_name: String,
    /// One layer per type in the chain that declared anything,
    /// most-derived first.
    pub layers: Vec<ResolvedLayer>,
    pub check_invariants: bool,
    /// Method contracts merged across the chain.
    pub methods: IndexMap<String, ResolvedMethod>,
    /// Constructors are not inherited: only the type's own declaration.
    pub constructor: Option<ResolvedConstructor>,
}

impl ResolvedClass {
    pub fn method(&self, name: &str) -> Option<&ResolvedMethod> {
        self.methods.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty() && self.methods.is_empty() && self.constructor.is_none()
    }

    /// Expanded checks of `field`, from every layer declaring it.
    pub fn field_checks(&self, field: &str) -> Vec<Arc<Check>> {
        self.layers
            .iter()
            .filter_map(|layer| layer.fields.get(field))
            .flatten()
            .cloned()
            .collect()
    }
}

/// Constraints one type in the chain contributes.
#[derive(Clone, Debug, Default)]
pub struct ResolvedLayer {
    pub declaring_type: String,
    pub object_checks: Vec<Arc<Check>>,
    pub fields: IndexMap<String, Vec<Arc<Check>>>,
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedMethod {
    pub name: String,
    /// Most-derived type declaring the method.
    pub declaring_type: String,
    pub parameters: Vec<ResolvedParameter>,
    pub preconditions: Vec<Arc<Check>>,
    pub postconditions: Vec<Arc<Check>>,
    pub return_value_checks: Vec<Arc<Check>>,
    pub pre_validate_this: bool,
    pub post_validate_this: bool,
}

impl ResolvedMethod {
    pub fn has_contract(&self) -> bool {
        self.parameters.iter().any(|p| !p.checks.is_empty())
            || !self.preconditions.is_empty()
            || !self.postconditions.is_empty()
            || !self.return_value_checks.is_empty()
            || self.pre_validate_this
            || self.post_validate_this
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedParameter {
    pub name: String,
    pub checks: Vec<Arc<Check>>,
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedConstructor {
    pub declaring_type: String,
    pub parameters: Vec<ResolvedParameter>,
    pub post_validate_this: bool,
}

/// Resolve `type_name` and its `supertypes` against `configurers`.
pub fn resolve_class(
    type_name: &str,
    supertypes: &[String],
    configurers: &[Arc<dyn Configurer>],
) -> Result<ResolvedClass, ConfigurationError> {
    let mut seen = HashSet::new();
    let chain: Vec<&str> = std::iter::once(type_name)
        .chain(supertypes.iter().map(String::as_str))
        .filter(|name| seen.insert(*name))
        .collect();

    let mut resolved = ResolvedClass {
        type_name: type_name.to_string(),
        ..ResolvedClass::default()
    };
    let mut declarations: Vec<ClassConfiguration> = Vec::new();
    let mut check_invariants = None;

    for name in chain {
        let Some(class) = merge_configurers(name, configurers) else {
            continue;
        };
        check_invariants = check_invariants.or(class.check_invariants);

        let mut layer = ResolvedLayer {
            declaring_type: name.to_string(),
            object_checks: class.object_checks.iter().cloned().map(Arc::new).collect(),
            fields: IndexMap::new(),
        };
        for (field, config) in &class.fields {
            let mut checks: Vec<Arc<Check>> = config.checks.iter().cloned().map(Arc::new).collect();
            expand_sets(&config.constraint_sets, configurers, &mut Vec::new(), &mut checks)?;
            layer.fields.insert(field.clone(), checks);
        }
        resolved.layers.push(layer);
        declarations.push(class);
    }
    resolved.check_invariants = check_invariants.unwrap_or(false);

    // Parameters may borrow field checks from anywhere in the chain, so
    // methods are resolved once every layer's fields are expanded.
    for class in &declarations {
        for (name, method) in &class.methods {
            let contract = resolve_method(&resolved, &class.type_name, method, configurers)?;
            match resolved.methods.get_mut(name) {
                Some(existing) => extend_method(existing, contract),
                None => {
                    resolved.methods.insert(name.clone(), contract);
                }
            }
        }
    }

    let own = declarations.first().filter(|class| class.type_name == type_name);
    if let Some(constructor) = own.and_then(|class| class.constructor.as_ref()) {
        resolved.constructor = Some(resolve_constructor(&resolved, constructor, configurers)?);
    }

    Ok(resolved)
}

/// Merge what every configurer declares for `type_name`.
fn merge_configurers(
    type_name: &str,
    configurers: &[Arc<dyn Configurer>],
) -> Option<ClassConfiguration> {
    let mut merged: Option<ClassConfiguration> = None;
    for configurer in configurers {
        let Some(next) = configurer.class_configuration(type_name) else {
            continue;
        };
        merged = Some(match merged {
            Some(acc) if !next.overwrite => merge_class(acc, next),
            _ => next,
        });
    }
    merged
}

fn merge_class(mut acc: ClassConfiguration, next: ClassConfiguration) -> ClassConfiguration {
    acc.check_invariants = next.check_invariants.or(acc.check_invariants);
    acc.object_checks.extend(next.object_checks);
    for (name, field) in next.fields {
        match acc.fields.get_mut(&name) {
            Some(existing) => existing.merge(field),
            None => {
                acc.fields.insert(name, field);
            }
        }
    }
    for (name, method) in next.methods {
        match acc.methods.get_mut(&name) {
            Some(existing) => existing.merge(method),
            None => {
                acc.methods.insert(name, method);
            }
        }
    }
    acc.constructor = match (acc.constructor, next.constructor) {
        (Some(mut existing), Some(next)) => {
            merge_parameters(&mut existing.parameters, next.parameters);
            existing.post_validate_this |= next.post_validate_this;
            Some(existing)
        }
        (existing, next) => next.or(existing),
    };
    acc
}

fn resolve_method(
    class: &ResolvedClass,
    declaring_type: &str,
    method: &MethodConfiguration,
    configurers: &[Arc<dyn Configurer>],
) -> Result<ResolvedMethod, ConfigurationError> {
    let arcs = |checks: &[Check]| checks.iter().cloned().map(Arc::new).collect::<Vec<_>>();
    Ok(ResolvedMethod {
        name: method.name.clone(),
        declaring_type: declaring_type.to_string(),
        parameters: resolve_parameters(class, &method.parameters, configurers)?,
        preconditions: arcs(&method.preconditions),
        postconditions: arcs(&method.postconditions),
        return_value_checks: arcs(&method.return_value_checks),
        pre_validate_this: method.pre_validate_this,
        post_validate_this: method.post_validate_this,
    })
}

/// Fold a supertype's contract into the more derived one already present.
fn extend_method(acc: &mut ResolvedMethod, next: ResolvedMethod) {
    for (i, param) in next.parameters.into_iter().enumerate() {
        match acc.parameters.get_mut(i) {
            Some(existing) => existing.checks.extend(param.checks),
            None => acc.parameters.push(param),
        }
    }
    acc.preconditions.extend(next.preconditions);
    acc.postconditions.extend(next.postconditions);
    acc.return_value_checks.extend(next.return_value_checks);
    acc.pre_validate_this |= next.pre_validate_this;
    acc.post_validate_this |= next.post_validate_this;
}

fn resolve_constructor(
    class: &ResolvedClass,
    constructor: &ConstructorConfiguration,
    configurers: &[Arc<dyn Configurer>],
) -> Result<ResolvedConstructor, ConfigurationError> {
    Ok(ResolvedConstructor {
        declaring_type: class.type_name.clone(),
        parameters: resolve_parameters(class, &constructor.parameters, configurers)?,
        post_validate_this: constructor.post_validate_this,
    })
}

fn resolve_parameters(
    class: &ResolvedClass,
    parameters: &[ParameterConfiguration],
    configurers: &[Arc<dyn Configurer>],
) -> Result<Vec<ResolvedParameter>, ConfigurationError> {
    parameters
        .iter()
        .map(|param| {
            let mut checks: Vec<Arc<Check>> = param.checks.iter().cloned().map(Arc::new).collect();
            expand_sets(&param.constraint_sets, configurers, &mut Vec::new(), &mut checks)?;
            if let Some(field) = &param.field_constraints {
                if !class.layers.iter().any(|l| l.fields.contains_key(field)) {
                    return Err(ConfigurationError::UnknownField {
                        type_name: class.type_name.clone(),
                        field: field.clone(),
                    });
                }
                checks.extend(class.field_checks(field));
            }
            Ok(ResolvedParameter {
                name: param.name.clone(),
                checks,
            })
        })
        .collect()
}

/// Append the checks of the sets in `ids`, following includes.
///
/// `stack` holds the sets currently being expanded; meeting one of them
/// again is a cycle. The first configurer declaring a set wins.
fn expand_sets(
    ids: &[String],
    configurers: &[Arc<dyn Configurer>],
    stack: &mut Vec<String>,
    out: &mut Vec<Arc<Check>>,
) -> Result<(), ConfigurationError> {
    for id in ids {
        if stack.contains(id) {
            let mut path = stack.clone();
            path.push(id.clone());
            return Err(ConfigurationError::ConstraintSetCycle { path });
        }
        let set = configurers
            .iter()
            .find_map(|c| c.constraint_set(id))
            .ok_or_else(|| ConfigurationError::UnknownConstraintSet { id: id.clone() })?;

        out.extend(set.checks.into_iter().map(Arc::new));
        stack.push(id.clone());
        expand_sets(&set.includes, configurers, stack, out)?;
        stack.pop();
    }
    Ok(())
}
