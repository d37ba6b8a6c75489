//! The validation engine.
//!
//! [`Validator::validate`] walks an object graph and collects every
//! violation it finds. Each call works in its own [`ValidationRun`]: one
//! metadata snapshot, one profile decision, one visited set. Violations are
//! returned, never raised; only a broken declaration aborts the call, as
//! [`ValidationError::Failed`].

use std::collections::HashSet;
use std::sync::Arc;

use covenant_types::{
    ConfigurationError, ConstraintTarget, Context, ObjectRef, TypeDescriptor, Value,
};
use tracing::{debug, trace};

use crate::check::{Check, CheckKind, EngineServices, XOR_MANY_MESSAGE};
use crate::composition::{GroupOp, evaluate_group};
use crate::config::{CascadeReporting, GroupReporting, ValidatorConfig};
use crate::error::ValidationError;
use crate::expression::{Bindings, ExpressionLanguages};
use crate::message;
use crate::metadata::{ClassCache, Configurer, MetadataStore, ResolvedClass};
use crate::profiles::{ProfileFilter, Profiles};
use crate::violation::{ConstraintViolation, ConstraintsViolatedError, Position};

pub struct Validator {
    store: MetadataStore,
    languages: ExpressionLanguages,
    profiles: Profiles,
    group_reporting: GroupReporting,
    cascade_reporting: CascadeReporting,
    deduplicate: bool,
}

impl Default for Validator {
    fn default() -> Self {
        ValidatorConfig::default().build()
    }
}

impl EngineServices for Validator {
    fn languages(&self) -> &ExpressionLanguages {
        &self.languages
    }
}

impl Validator {
    /// Validator reading constraints from a single configurer.
    pub fn new(configurer: impl Configurer + 'static) -> Self {
        ValidatorConfig::default().configurer(configurer).build()
    }

    pub fn builder() -> ValidatorConfig {
        ValidatorConfig::default()
    }

    pub(crate) fn from_config(config: ValidatorConfig) -> Self {
        Self {
            store: MetadataStore::new(config.configurers),
            languages: config.languages,
            profiles: Profiles::default(),
            group_reporting: config.group_reporting,
            cascade_reporting: config.cascade_reporting,
            deduplicate: config.deduplicate,
        }
    }

    /// Every violation found in the graph reachable from `value`.
    ///
    /// Objects are validated against their resolved class configuration;
    /// lists and maps are validated element by element. `Null` and plain
    /// scalars have nothing to check.
    pub fn validate(
        &self,
        value: impl Into<Value>,
    ) -> Result<Vec<ConstraintViolation>, ValidationError> {
        self.validate_filtered(value.into(), self.profiles.filter())
    }

    /// Like [`validate`](Self::validate), with exactly `profiles` enabled
    /// for this call. The validator's profile state is left untouched.
    pub fn validate_with_profiles<S: Into<String>>(
        &self,
        value: impl Into<Value>,
        profiles: impl IntoIterator<Item = S>,
    ) -> Result<Vec<ConstraintViolation>, ValidationError> {
        self.validate_filtered(value.into(), ProfileFilter::only(profiles))
    }

    /// `Ok` when `value` is valid, otherwise the violations as an error.
    pub fn assert_valid(&self, value: impl Into<Value>) -> Result<(), ValidationError> {
        match ConstraintsViolatedError::new(self.validate(value)?) {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    fn validate_filtered(
        &self,
        root: Value,
        profiles: ProfileFilter,
    ) -> Result<Vec<ConstraintViolation>, ValidationError> {
        let mut run = self.run(root.clone(), profiles);
        let mut violations = Vec::new();
        run.validate_value(&root, &mut violations)?;
        Ok(self.finish(violations))
    }

    /// Replace the configurers. Calls already running finish against the
    /// configuration they started with.
    pub fn reload(&self, configurers: Vec<Arc<dyn Configurer>>) {
        self.store.reload(configurers);
    }

    /// Drop resolved classes so they are rebuilt from the configurers.
    pub fn clear_cache(&self) {
        self.store.clear_cache();
    }

    pub fn set_enabled_profiles<S: Into<String>>(&self, profiles: impl IntoIterator<Item = S>) {
        self.profiles.set_enabled(profiles);
    }

    pub fn enable_profile(&self, profile: &str) {
        self.profiles.enable(profile);
    }

    pub fn disable_profile(&self, profile: &str) {
        self.profiles.disable(profile);
    }

    pub fn enable_all_profiles(&self) {
        self.profiles.enable_all();
    }

    pub fn disable_all_profiles(&self) {
        self.profiles.disable_all();
    }

    pub fn is_profile_enabled(&self, profile: &str) -> bool {
        self.profiles.is_enabled(profile)
    }

    pub fn languages(&self) -> &ExpressionLanguages {
        &self.languages
    }

    /// Effective constraints for a type, resolving and caching them if
    /// needed.
    pub fn resolve_class(
        &self,
        descriptor: &TypeDescriptor,
    ) -> Result<Arc<ResolvedClass>, ConfigurationError> {
        self.store.session().resolve(descriptor)
    }

    pub(crate) fn run(&self, root: Value, profiles: ProfileFilter) -> ValidationRun<'_> {
        ValidationRun {
            validator: self,
            classes: self.store.session(),
            profiles,
            visited: HashSet::new(),
            root,
        }
    }

    pub(crate) fn current_profiles(&self) -> ProfileFilter {
        self.profiles.filter()
    }

    /// Drop repeated reports of the same violation, keeping the first.
    ///
    /// Two reports are the same when they fail with the same code and
    /// message at the same position of the same member of the same object.
    /// Equal values at different list positions stay distinct.
    pub(crate) fn finish(&self, violations: Vec<ConstraintViolation>) -> Vec<ConstraintViolation> {
        if !self.deduplicate {
            return violations;
        }
        let mut seen = HashSet::new();
        violations
            .into_iter()
            .filter(|v| {
                seen.insert((
                    v.validated_object.as_object().map(ObjectRef::id),
                    v.context.clone(),
                    v.position,
                    v.error_code.clone(),
                    v.message.clone(),
                ))
            })
            .collect()
    }
}

/// State of one validation call.
pub(crate) struct ValidationRun<'a> {
    validator: &'a Validator,
    classes: ClassCache<'a>,
    profiles: ProfileFilter,
    /// Identities of objects already validated in this call.
    visited: HashSet<usize>,
    root: Value,
}

fn failed_at(context: &Context) -> impl Fn(ConfigurationError) -> ValidationError + '_ {
    move |source| ValidationError::failed(context.to_string(), source)
}

impl ValidationRun<'_> {
    pub(crate) fn admits(&self, check: &Check) -> bool {
        self.profiles.admits(check)
    }

    pub(crate) fn resolve(
        &mut self,
        descriptor: &TypeDescriptor,
    ) -> Result<Arc<ResolvedClass>, ValidationError> {
        self.classes
            .resolve(descriptor)
            .map_err(|source| ValidationError::failed(descriptor.name(), source))
    }

    pub(crate) fn validate_value(
        &mut self,
        value: &Value,
        out: &mut Vec<ConstraintViolation>,
    ) -> Result<(), ValidationError> {
        match value {
            Value::Object(object) => self.validate_object(object, None, out),
            Value::List(_) | Value::Map(_) => {
                for element in value.elements() {
                    self.validate_value(element, out)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Object invariants of every layer, then every layer's fields.
    ///
    /// With `after_method`, invariant violations are reported in a
    /// post-execution context for that method.
    pub(crate) fn validate_object(
        &mut self,
        object: &ObjectRef,
        after_method: Option<&str>,
        out: &mut Vec<ConstraintViolation>,
    ) -> Result<(), ValidationError> {
        if !self.visited.insert(object.id()) {
            debug!(object = %object, "already validated in this call, skipping");
            return Ok(());
        }

        let class = self.resolve(object.descriptor())?;
        let this = Value::Object(object.clone());

        for layer in &class.layers {
            let context = match after_method {
                Some(method) => Context::MethodPostExecution {
                    declaring_type: layer.declaring_type.clone(),
                    method: method.to_string(),
                },
                None => Context::class(&layer.declaring_type),
            };
            for check in &layer.object_checks {
                self.check_member(check, &this, &this, &context, out)?;
            }
        }

        for layer in &class.layers {
            for (field, checks) in &layer.fields {
                let context = Context::field(&layer.declaring_type, field);
                let value = object.field(field).map_err(failed_at(&context))?;
                for check in checks {
                    self.check_member(check, &this, &value, &context, out)?;
                }
            }
        }
        Ok(())
    }

    /// Apply one declared check to a member value owned by `owner`.
    pub(crate) fn check_member(
        &mut self,
        check: &Arc<Check>,
        owner: &Value,
        value: &Value,
        context: &Context,
        out: &mut Vec<ConstraintViolation>,
    ) -> Result<(), ValidationError> {
        if !self.admits(check) {
            trace!(check = check.name(), %context, "check not in an enabled profile");
            return Ok(());
        }
        out.extend(self.evaluate(check, owner, value, context)?);
        Ok(())
    }

    /// Evaluate `check` with its activation condition, target selector and
    /// container targeting applied.
    fn evaluate(
        &mut self,
        check: &Arc<Check>,
        owner: &Value,
        value: &Value,
        context: &Context,
    ) -> Result<Vec<ConstraintViolation>, ValidationError> {
        if let Some(condition) = check.when_condition() {
            let mut bindings = Bindings::new();
            bindings.insert("_this".into(), owner.clone());
            bindings.insert("_value".into(), value.clone());
            let active = self
                .validator
                .languages
                .evaluate_tagged_bool(condition, &bindings)
                .map_err(failed_at(context))?;
            if !active {
                trace!(check = check.name(), %context, "activation condition is false");
                return Ok(Vec::new());
            }
        }

        let nodes = match check.target() {
            Some(target) => self
                .validator
                .languages
                .resolve_target(target, &self.root, value)
                .map_err(failed_at(context))?,
            None => vec![value.clone()],
        };

        let applies_to = check.effective_applies_to();
        let mut violations = Vec::new();
        for (index, node) in nodes.iter().enumerate() {
            let at = Position::node(index);
            if !node.is_container() {
                violations.extend(self.evaluate_node(check, owner, node, context, at)?);
                continue;
            }
            if applies_to.contains(&ConstraintTarget::Container) {
                violations.extend(self.evaluate_node(check, owner, node, context, at)?);
            }
            if applies_to.contains(&ConstraintTarget::Values) {
                for (i, element) in node.elements().into_iter().enumerate() {
                    let at = at.element(i);
                    violations.extend(self.evaluate_node(check, owner, element, context, at)?);
                }
            }
        }
        Ok(violations)
    }

    fn evaluate_node(
        &mut self,
        check: &Arc<Check>,
        owner: &Value,
        value: &Value,
        context: &Context,
        at: Position,
    ) -> Result<Vec<ConstraintViolation>, ValidationError> {
        if matches!(check.kind(), CheckKind::AssertValid) {
            return self.cascade(check, owner, value, context, at);
        }

        if let Some((op, children)) = GroupOp::of(check.kind()) {
            // Children outside the enabled profiles take no part in the group.
            let children: Vec<_> = children.iter().filter(|c| self.admits(c)).cloned().collect();
            if children.is_empty() {
                trace!(check = check.name(), %context, "no group member in an enabled profile");
                return Ok(Vec::new());
            }
            let reporting = self.validator.group_reporting;
            let outcome = evaluate_group(op, &children, reporting, |child| {
                self.evaluate(child, owner, value, context)
            })?;
            trace!(check = check.name(), %context, satisfied = outcome.satisfied, "evaluated group");
            if outcome.satisfied {
                return Ok(Vec::new());
            }
            let template = if op == GroupOp::Xor
                && outcome.satisfied_count > 1
                && check.message().is_none()
            {
                XOR_MANY_MESSAGE
            } else {
                check.message_template()
            };
            let extra = vec![("satisfied", outcome.satisfied_count.to_string())];
            let mut violation =
                self.violation_with_template(check, template, owner, value, context, extra);
            violation.causes = outcome.causes;
            violation.position = at;
            return Ok(vec![violation]);
        }

        let satisfied = check
            .is_satisfied(owner, value, context, self.validator)
            .map_err(failed_at(context))?;
        trace!(check = check.name(), %context, satisfied, "evaluated check");
        if satisfied {
            Ok(Vec::new())
        } else {
            let mut violation = self.violation(check, owner, value, context, Vec::new());
            violation.position = at;
            Ok(vec![violation])
        }
    }

    /// Validate the object(s) referenced by `value` within this call.
    fn cascade(
        &mut self,
        check: &Arc<Check>,
        owner: &Value,
        value: &Value,
        context: &Context,
        at: Position,
    ) -> Result<Vec<ConstraintViolation>, ValidationError> {
        let mut nested = Vec::new();
        self.validate_value(value, &mut nested)?;
        match self.validator.cascade_reporting {
            CascadeReporting::Flatten => Ok(nested),
            CascadeReporting::Nest if nested.is_empty() => Ok(nested),
            CascadeReporting::Nest => {
                let mut violation = self.violation(check, owner, value, context, Vec::new());
                violation.causes = nested;
                violation.position = at;
                Ok(vec![violation])
            }
        }
    }

    pub(crate) fn violation(
        &self,
        check: &Arc<Check>,
        owner: &Value,
        value: &Value,
        context: &Context,
        extra: Vec<(&'static str, String)>,
    ) -> ConstraintViolation {
        self.violation_with_template(check, check.message_template(), owner, value, context, extra)
    }

    fn violation_with_template(
        &self,
        check: &Arc<Check>,
        template: &str,
        owner: &Value,
        value: &Value,
        context: &Context,
        extra: Vec<(&'static str, String)>,
    ) -> ConstraintViolation {
        let mut variables = vec![
            ("context", context.to_string()),
            ("invalidValue", value.to_string()),
        ];
        variables.extend(check.kind().message_variables());
        variables.extend(extra);
        ConstraintViolation {
            message: message::render(template, &variables),
            message_template: template.to_string(),
            error_code: check.error_code(),
            severity: check.severity(),
            context: context.clone(),
            validated_object: owner.clone(),
            root: self.root.clone(),
            invalid_value: value.clone(),
            check: Arc::clone(check),
            causes: Vec::new(),
            position: Position::default(),
        }
    }
}
