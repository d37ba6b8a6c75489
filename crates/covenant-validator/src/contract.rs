//! Method and constructor contracts.
//!
//! These are the phases the guard drives around a call: parameter checks
//! and preconditions before the body, old-value capture right before it,
//! and return-value checks, postconditions and invariants after a
//! successful return. Each phase returns violations; deciding whether to
//! raise them is the caller's business.
//!
//! Expressions see `_this`, `_args` (all arguments as a list), one binding
//! per declared parameter name, and after the call `_returns` and `_old`.

use std::sync::Arc;

use covenant_types::{ConfigurationError, Context, ObjectRef, TypeDescriptor, Value};
use indexmap::IndexMap;
use tracing::trace;

use crate::check::{Check, CheckKind};
use crate::error::ValidationError;
use crate::expression::Bindings;
use crate::metadata::{ResolvedClass, ResolvedMethod, ResolvedParameter};
use crate::validator::{ValidationRun, Validator};
use crate::violation::ConstraintViolation;

/// Values of postcondition `old` expressions, captured before the call and
/// keyed by expression.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OldValues {
    values: IndexMap<String, Value>,
}

impl OldValues {
    pub fn get(&self, expression: &str) -> Option<&Value> {
        self.values.get(expression)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The contract of one method on one receiver.
pub struct MethodContract<'v> {
    validator: &'v Validator,
    class: Arc<ResolvedClass>,
    method: Option<ResolvedMethod>,
    name: String,
    this: ObjectRef,
}

impl Validator {
    /// Contract of `method` on `this`. A method nobody declared anything for
    /// has an empty contract.
    pub fn method_contract(
        &self,
        this: &ObjectRef,
        method: &str,
    ) -> Result<MethodContract<'_>, ValidationError> {
        let class = self
            .resolve_class(this.descriptor())
            .map_err(|source| ValidationError::failed(this.type_name(), source))?;
        Ok(MethodContract {
            validator: self,
            method: class.method(method).cloned(),
            class,
            name: method.to_string(),
            this: this.clone(),
        })
    }

    /// Check constructor arguments for the type `descriptor` describes.
    pub fn validate_constructor_parameters(
        &self,
        descriptor: &TypeDescriptor,
        args: &[Value],
    ) -> Result<Vec<ConstraintViolation>, ValidationError> {
        let class = self
            .resolve_class(descriptor)
            .map_err(|source| ValidationError::failed(descriptor.name(), source))?;
        let Some(constructor) = &class.constructor else {
            return Ok(Vec::new());
        };

        let mut run = self.run(Value::Null, self.current_profiles());
        let mut out = Vec::new();
        let context_for = |index, name: &str| Context::ConstructorParameter {
            declaring_type: constructor.declaring_type.clone(),
            index,
            name: name.to_string(),
        };
        let params = &constructor.parameters;
        validate_parameters(&mut run, params, args, &Value::Null, &mut out, context_for)?;
        Ok(self.finish(out))
    }

    /// Whether the object should be validated right after construction.
    pub fn constructor_post_validates(
        &self,
        descriptor: &TypeDescriptor,
    ) -> Result<bool, ValidationError> {
        let class = self
            .resolve_class(descriptor)
            .map_err(|source| ValidationError::failed(descriptor.name(), source))?;
        Ok(class
            .constructor
            .as_ref()
            .is_some_and(|c| c.post_validate_this))
    }

    /// Validate `this`; with `after_method`, object invariants are reported
    /// in that method's post-execution context.
    pub fn validate_invariants(
        &self,
        this: &ObjectRef,
        after_method: Option<&str>,
    ) -> Result<Vec<ConstraintViolation>, ValidationError> {
        let root = Value::Object(this.clone());
        let mut run = self.run(root, self.current_profiles());
        let mut out = Vec::new();
        run.validate_object(this, after_method, &mut out)?;
        Ok(self.finish(out))
    }
}

impl MethodContract<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolved(&self) -> Option<&ResolvedMethod> {
        self.method.as_ref()
    }

    pub fn pre_validate_this(&self) -> bool {
        self.method.as_ref().is_some_and(|m| m.pre_validate_this)
    }

    /// Whether the receiver is re-validated after a successful call.
    pub fn post_validate_this(&self) -> bool {
        self.class.check_invariants || self.method.as_ref().is_some_and(|m| m.post_validate_this)
    }

    fn declaring_type(&self) -> &str {
        self.method
            .as_ref()
            .map_or(self.this.type_name(), |m| m.declaring_type.as_str())
    }

    fn this_value(&self) -> Value {
        Value::Object(self.this.clone())
    }

    fn run(&self) -> ValidationRun<'_> {
        self.validator
            .run(self.this_value(), self.validator.current_profiles())
    }

    fn bindings(&self, args: &[Value]) -> Bindings {
        let mut bindings = Bindings::new();
        bindings.insert("_this".into(), self.this_value());
        bindings.insert("_args".into(), Value::List(args.to_vec()));
        if let Some(method) = &self.method {
            for (param, arg) in method.parameters.iter().zip(args) {
                bindings.insert(param.name.clone(), arg.clone());
            }
        }
        bindings
    }

    pub fn validate_parameters(
        &self,
        args: &[Value],
    ) -> Result<Vec<ConstraintViolation>, ValidationError> {
        let Some(method) = &self.method else {
            return Ok(Vec::new());
        };
        let mut run = self.run();
        let mut out = Vec::new();
        let owner = self.this_value();
        let context_for = |index, name: &str| Context::MethodParameter {
            declaring_type: method.declaring_type.clone(),
            method: self.name.clone(),
            index,
            name: name.to_string(),
        };
        validate_parameters(&mut run, &method.parameters, args, &owner, &mut out, context_for)?;
        Ok(self.validator.finish(out))
    }

    pub fn check_preconditions(
        &self,
        args: &[Value],
    ) -> Result<Vec<ConstraintViolation>, ValidationError> {
        let Some(method) = &self.method else {
            return Ok(Vec::new());
        };
        let context = Context::MethodEntry {
            declaring_type: self.declaring_type().to_string(),
            method: self.name.clone(),
        };
        let bindings = self.bindings(args);
        self.evaluate_conditions(&method.preconditions, &context, &bindings, &Value::Null)
    }

    /// Evaluate every postcondition `old` expression against the current
    /// state. Call once, right before the body runs.
    pub fn capture_old_values(&self, args: &[Value]) -> Result<OldValues, ValidationError> {
        let mut old = OldValues::default();
        let Some(method) = &self.method else {
            return Ok(old);
        };
        let context = Context::MethodEntry {
            declaring_type: self.declaring_type().to_string(),
            method: self.name.clone(),
        };
        let bindings = self.bindings(args);
        let profiles = self.validator.current_profiles();
        for check in &method.postconditions {
            let CheckKind::Post {
                language,
                old: Some(expression),
                ..
            } = check.kind()
            else {
                continue;
            };
            if !profiles.admits(check) || old.values.contains_key(expression) {
                continue;
            }
            let value = self
                .validator
                .languages()
                .evaluate(language, expression, &bindings)
                .map_err(|source| ValidationError::failed(context.to_string(), source))?;
            trace!(method = %self.name, %expression, %value, "captured old value");
            old.values.insert(expression.clone(), value);
        }
        Ok(old)
    }

    pub fn validate_return_value(
        &self,
        returned: &Value,
    ) -> Result<Vec<ConstraintViolation>, ValidationError> {
        let Some(method) = &self.method else {
            return Ok(Vec::new());
        };
        let context = Context::MethodReturnValue {
            declaring_type: self.declaring_type().to_string(),
            method: self.name.clone(),
        };
        let mut run = self.run();
        let mut out = Vec::new();
        let owner = self.this_value();
        for check in &method.return_value_checks {
            run.check_member(check, &owner, returned, &context, &mut out)?;
        }
        Ok(self.validator.finish(out))
    }

    pub fn check_postconditions(
        &self,
        args: &[Value],
        returned: &Value,
        old: &OldValues,
    ) -> Result<Vec<ConstraintViolation>, ValidationError> {
        let Some(method) = &self.method else {
            return Ok(Vec::new());
        };
        let context = Context::MethodExit {
            declaring_type: self.declaring_type().to_string(),
            method: self.name.clone(),
        };
        let mut bindings = self.bindings(args);
        bindings.insert("_returns".into(), returned.clone());

        let mut out = Vec::new();
        for check in &method.postconditions {
            let mut scoped = bindings.clone();
            if let CheckKind::Post {
                old: Some(expression),
                ..
            } = check.kind()
            {
                scoped.insert(
                    "_old".into(),
                    old.get(expression).cloned().unwrap_or_default(),
                );
            }
            out.extend(self.evaluate_conditions(
                std::slice::from_ref(check),
                &context,
                &scoped,
                returned,
            )?);
        }
        Ok(out)
    }

    /// Validate the receiver after the call, invariants in post-execution
    /// context.
    pub fn validate_invariants(&self) -> Result<Vec<ConstraintViolation>, ValidationError> {
        self.validator.validate_invariants(&self.this, Some(&self.name))
    }

    /// Validate the receiver as a whole, before the call.
    pub fn validate_this(&self) -> Result<Vec<ConstraintViolation>, ValidationError> {
        self.validator.validate_invariants(&self.this, None)
    }

    fn evaluate_conditions(
        &self,
        checks: &[Arc<Check>],
        context: &Context,
        bindings: &Bindings,
        invalid_value: &Value,
    ) -> Result<Vec<ConstraintViolation>, ValidationError> {
        let run = self.run();
        let languages = self.validator.languages();
        let failed = |source: ConfigurationError| ValidationError::failed(context.to_string(), source);
        let mut out = Vec::new();

        for check in checks {
            if !run.admits(check) {
                continue;
            }
            let active = match check.when_condition() {
                Some(condition) => languages
                    .evaluate_tagged_bool(condition, bindings)
                    .map_err(failed)?,
                None => true,
            };
            if !active {
                continue;
            }
            let (language, expression) = match check.kind() {
                CheckKind::Pre {
                    language,
                    expression,
                }
                | CheckKind::Post {
                    language,
                    expression,
                    ..
                } => (language, expression),
                _ => {
                    return Err(failed(ConfigurationError::UnsupportedCheck {
                        check: check.name().to_string(),
                    }));
                }
            };
            let satisfied = languages
                .evaluate_bool(language, expression, bindings)
                .map_err(failed)?;
            trace!(check = check.name(), %context, satisfied, "evaluated method condition");
            if !satisfied {
                out.push(run.violation(check, &self.this_value(), invalid_value, context, Vec::new()));
            }
        }
        Ok(self.validator.finish(out))
    }
}

/// Apply parameter checks positionally. Missing arguments are `Null`.
fn validate_parameters<F>(
    run: &mut ValidationRun<'_>,
    parameters: &[ResolvedParameter],
    args: &[Value],
    owner: &Value,
    out: &mut Vec<ConstraintViolation>,
    context_for: F,
) -> Result<(), ValidationError>
where
    F: Fn(usize, &str) -> Context,
{
    for (index, param) in parameters.iter().enumerate() {
        let value = args.get(index).cloned().unwrap_or_default();
        let context = context_for(index, &param.name);
        for check in &param.checks {
            run.check_member(check, owner, &value, &context, out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::config::ValidatorConfig;
    use crate::expression::FunctionLanguage;
    use crate::fixtures::{Account, account};
    use crate::metadata::{
        ClassConfiguration, ConstructorConfiguration, FieldConfiguration, MethodConfiguration,
        ParameterConfiguration, PojoConfigurer,
    };

    fn balance(b: &Bindings) -> i64 {
        b.get("_this")
            .and_then(Value::as_object)
            .and_then(|o| o.downcast_ref::<Account>())
            .map_or(0, Account::balance)
    }

    fn amount(b: &Bindings) -> f64 {
        b.get("amount").and_then(Value::as_f64).unwrap_or(0.0)
    }

    fn bank() -> Validator {
        let functions = FunctionLanguage::new("fn")
            .function("has_funds", |b| Value::from(balance(b) as f64 >= amount(b)))
            .function("balance", |b| Value::from(balance(b)))
            .function("debited", |b| {
                let old = b.get("_old").and_then(Value::as_f64).unwrap_or(0.0);
                Value::from(balance(b) as f64 == old - amount(b))
            });
        let config = PojoConfigurer::new().with_class(
            ClassConfiguration::new("Account")
                .field(FieldConfiguration::new("owner").check(Check::not_blank()))
                .field(FieldConfiguration::new("balance").check(Check::min(0.0, true)))
                .method(
                    MethodConfiguration::new("withdraw")
                        .parameter(
                            ParameterConfiguration::new("amount").check(Check::min(0.0, false)),
                        )
                        .precondition(Check::pre("fn", "has_funds"))
                        .postcondition(Check::post("fn", "debited").with_old("balance"))
                        .return_value(Check::not_null()),
                )
                .method(
                    MethodConfiguration::new("rename").parameter(
                        ParameterConfiguration::new("owner").field_constraints("owner"),
                    ),
                )
                .constructor(
                    ConstructorConfiguration::new()
                        .parameter(ParameterConfiguration::new("owner").check(Check::not_blank()))
                        .post_validate_this(true),
                ),
        );
        ValidatorConfig::default()
            .language(functions)
            .configurer(config)
            .build()
    }

    #[test]
    fn parameters_are_checked_in_method_context() {
        let validator = bank();
        let acct = account("ann", 100);
        let contract = validator.method_contract(&acct, "withdraw").unwrap();
        let violations = contract.validate_parameters(&[Value::Int(-5)]).unwrap();
        assert_eq!(violations.len(), 1);
        assert_snapshot!(violations[0].context().to_string(), @"Account.withdraw parameter 0 (amount)");
    }

    #[test]
    fn preconditions_see_receiver_and_named_arguments() {
        let validator = bank();
        let acct = account("ann", 100);
        let contract = validator.method_contract(&acct, "withdraw").unwrap();
        assert!(contract.check_preconditions(&[Value::Int(50)]).unwrap().is_empty());

        let violations = contract.check_preconditions(&[Value::Int(500)]).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].error_code(), "covenant.Pre");
        assert_eq!(violations[0].invalid_value(), &Value::Null);
        assert_snapshot!(
            violations[0].message(),
            @"Account.withdraw (entry): precondition has_funds is not satisfied"
        );
    }

    #[test]
    fn postconditions_observe_captured_old_values() {
        let validator = bank();
        let acct = account("ann", 100);
        let contract = validator.method_contract(&acct, "withdraw").unwrap();
        let args = [Value::Int(30)];

        let old = contract.capture_old_values(&args).unwrap();
        assert_eq!(old.get("balance"), Some(&Value::Int(100)));

        // The body debits correctly.
        *acct.downcast_ref::<Account>().unwrap().balance.lock().unwrap() = 70;
        let returned = Value::Int(70);
        assert!(contract.check_postconditions(&args, &returned, &old).unwrap().is_empty());

        // A buggy body debits twice.
        *acct.downcast_ref::<Account>().unwrap().balance.lock().unwrap() = 40;
        let violations = contract.check_postconditions(&args, &returned, &old).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].context().to_string(), "Account.withdraw (exit)");
        assert_eq!(violations[0].invalid_value(), &returned);
    }

    #[test]
    fn return_values_are_checked() {
        let validator = bank();
        let acct = account("ann", 100);
        let contract = validator.method_contract(&acct, "withdraw").unwrap();
        let violations = contract.validate_return_value(&Value::Null).unwrap();
        assert_eq!(violations[0].context().to_string(), "Account.withdraw return value");
    }

    #[test]
    fn parameters_can_borrow_field_constraints() {
        let validator = bank();
        let acct = account("ann", 100);
        let contract = validator.method_contract(&acct, "rename").unwrap();
        assert_eq!(contract.validate_parameters(&[Value::from("  ")]).unwrap().len(), 1);
        assert!(contract.validate_parameters(&[Value::from("bob")]).unwrap().is_empty());
    }

    #[test]
    fn undeclared_methods_have_empty_contracts() {
        let validator = bank();
        let acct = account("ann", 100);
        let contract = validator.method_contract(&acct, "deposit").unwrap();
        assert!(contract.resolved().is_none());
        assert!(contract.check_preconditions(&[]).unwrap().is_empty());
        assert!(contract.capture_old_values(&[]).unwrap().is_empty());
        assert!(!contract.post_validate_this());
    }

    #[test]
    fn invariants_after_a_method_use_post_execution_context() {
        let validator = ValidatorConfig::default()
            .language(FunctionLanguage::new("fn").function("solvent", |b| {
                Value::from(balance(b) >= 0)
            }))
            .configurer(PojoConfigurer::new().with_class(
                ClassConfiguration::new("Account")
                    .check_invariants(true)
                    .object_check(Check::assert("fn", "solvent")),
            ))
            .build();
        let acct = account("ann", -1);
        let contract = validator.method_contract(&acct, "withdraw").unwrap();
        assert!(contract.post_validate_this());

        let violations = contract.validate_invariants().unwrap();
        assert_eq!(
            violations[0].context(),
            &Context::MethodPostExecution {
                declaring_type: "Account".into(),
                method: "withdraw".into(),
            }
        );
        let before = contract.validate_this().unwrap();
        assert_eq!(before[0].context(), &Context::class("Account"));
    }

    #[test]
    fn constructor_parameters_use_constructor_context() {
        let validator = bank();
        let descriptor = <Account as covenant_types::Reflect>::descriptor();
        let violations = validator
            .validate_constructor_parameters(&descriptor, &[Value::from("")])
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert_snapshot!(violations[0].context().to_string(), @"Account::new parameter 0 (owner)");
        assert!(validator.constructor_post_validates(&descriptor).unwrap());
    }

    #[test]
    fn plain_checks_are_not_preconditions() {
        let validator = validator_with_bad_precondition();
        let acct = account("ann", 1);
        let err = validator
            .method_contract(&acct, "close")
            .unwrap()
            .check_preconditions(&[])
            .unwrap_err();
        assert!(matches!(
            err.configuration_error(),
            Some(ConfigurationError::UnsupportedCheck { .. })
        ));
    }

    #[test]
    fn repeated_method_declarations_accumulate() {
        let functions = FunctionLanguage::new("fn")
            .function("has_funds", |b| Value::from(balance(b) as f64 >= amount(b)))
            .function("small", |b| Value::from(amount(b) <= 100.0));
        let withdraw = || {
            MethodConfiguration::new("withdraw")
                .parameter(ParameterConfiguration::new("amount"))
                .precondition(Check::pre("fn", "has_funds"))
        };
        let class = ClassConfiguration::new("Account")
            .method(withdraw())
            .method(MethodConfiguration::new("withdraw").precondition(Check::pre("fn", "small")));
        let validator = ValidatorConfig::default()
            .language(functions.clone())
            .configurer(PojoConfigurer::new().with_class(class.clone()))
            .build();

        let acct = account("ann", 50);
        let contract = validator.method_contract(&acct, "withdraw").unwrap();
        let violations = contract.check_preconditions(&[Value::Int(500)]).unwrap();
        let messages: Vec<_> = violations.iter().map(|v| v.message()).collect();
        assert_eq!(
            messages,
            vec![
                "Account.withdraw (entry): precondition has_funds is not satisfied",
                "Account.withdraw (entry): precondition small is not satisfied",
            ]
        );

        let replaced = ValidatorConfig::default()
            .language(functions)
            .configurer(PojoConfigurer::new().with_class(
                class.method(withdraw().overwrite(true)),
            ))
            .build();
        let contract = replaced.method_contract(&acct, "withdraw").unwrap();
        assert_eq!(contract.check_preconditions(&[Value::Int(500)]).unwrap().len(), 1);
    }

    fn validator_with_bad_precondition() -> Validator {
        Validator::new(PojoConfigurer::new().with_class(
            ClassConfiguration::new("Account")
                .method(MethodConfiguration::new("close").precondition(Check::not_null())),
        ))
    }
}
