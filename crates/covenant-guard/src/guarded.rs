use std::sync::Arc;

use covenant_types::{ObjectRef, Reflect, Value};
use covenant_validator::OldValues;
use tracing::debug;

use crate::error::GuardError;
use crate::guard::Guard;

/// A guarded object. Calls made through [`invoke`](Self::invoke) are checked
/// against the method contracts declared for `T`.
pub struct Guarded<T> {
    value: Arc<T>,
    object: ObjectRef,
    guard: Arc<Guard>,
}

impl<T> Clone for Guarded<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            object: self.object.clone(),
            guard: Arc::clone(&self.guard),
        }
    }
}

impl<T> std::fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guarded")
            .field("object", &self.object)
            .finish_non_exhaustive()
    }
}

impl<T: Reflect> Guarded<T> {
    pub(crate) fn new(value: Arc<T>, guard: Arc<Guard>) -> Self {
        Self {
            object: ObjectRef::from_arc(Arc::clone(&value)),
            value,
            guard,
        }
    }

    /// Direct, unchecked access to the wrapped value.
    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn guard(&self) -> &Arc<Guard> {
        &self.guard
    }

    /// Call `body` under the contract of `method`.
    ///
    /// Before the call: parameter checks, preconditions and, if the method
    /// asks for it, validation of the receiver. Then old values are captured
    /// and `body` runs. After a successful return: return-value checks,
    /// postconditions and invariants. A failing body skips the post phase
    /// and its error comes back as [`GuardError::Delegate`].
    ///
    /// `Ok(None)` means an entry violation suppressed the call in notify
    /// mode without `proceed`. Exit violations in notify mode never withhold
    /// the result: the body already ran.
    pub fn invoke<R, E, F>(
        &self,
        method: &str,
        args: Vec<Value>,
        body: F,
    ) -> Result<Option<R>, GuardError<E>>
    where
        R: Clone + Into<Value>,
        F: FnOnce(&T, &[Value]) -> Result<R, E>,
    {
        if !self.guard.is_active() {
            return body(self.get(), &args).map(Some).map_err(GuardError::Delegate);
        }

        let phases = self.guard.phases();
        let validator = self.guard.validator();
        let contract = validator.method_contract(&self.object, method)?;

        let mut entry = Vec::new();
        if phases.parameters {
            entry.extend(contract.validate_parameters(&args)?);
        }
        if phases.preconditions {
            entry.extend(contract.check_preconditions(&args)?);
        }
        if phases.invariants && contract.pre_validate_this() {
            entry.extend(contract.validate_this()?);
        }
        if !self.guard.enforce(entry).map_err(GuardError::Violated)? {
            debug!(object = %self.object, method, "call suppressed by contract violation");
            return Ok(None);
        }

        let old = if phases.postconditions {
            contract.capture_old_values(&args)?
        } else {
            OldValues::default()
        };

        let result = body(self.get(), &args).map_err(GuardError::Delegate)?;
        let returned: Value = result.clone().into();

        let mut exit = Vec::new();
        if phases.postconditions {
            exit.extend(contract.validate_return_value(&returned)?);
            exit.extend(contract.check_postconditions(&args, &returned, &old)?);
        }
        if phases.invariants && contract.post_validate_this() {
            exit.extend(contract.validate_invariants()?);
        }
        self.guard.enforce(exit).map_err(GuardError::Violated)?;
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use covenant_types::Context;
    use insta::assert_snapshot;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::config::{EnforcementMode, GuardConfig};
    use crate::fixtures::{Account, bank_validator};
    use crate::listener::{ConstraintsViolatedAdapter, ConstraintsViolatedListener};

    fn withdraw(account: &Account, args: &[Value]) -> Result<i64, String> {
        let amount = args.first().and_then(Value::as_f64).unwrap_or(0.0) as i64;
        Ok(account.withdraw(amount))
    }

    #[test]
    fn failed_precondition_never_runs_the_body() {
        let guard = Guard::new(Arc::new(bank_validator()));
        let account = guard.guard(Account::new("ann", 10));
        let calls = AtomicUsize::new(0);

        let err = account
            .invoke("withdraw", vec![Value::Int(50)], |a, args| {
                calls.fetch_add(1, Ordering::SeqCst);
                withdraw(a, args)
            })
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(account.get().balance(), 10);
        let violations = err.violations().unwrap().violations();
        assert_eq!(violations.len(), 1);
        assert_snapshot!(
            violations[0].message(),
            @"Account.withdraw (entry): precondition has_funds is not satisfied"
        );
    }

    #[test]
    fn satisfied_contract_returns_the_result() {
        let guard = Guard::new(Arc::new(bank_validator()));
        let account = guard.guard(Account::new("ann", 10));
        let result = account.invoke("withdraw", vec![Value::Int(4)], withdraw).unwrap();
        assert_eq!(result, Some(6));
    }

    #[test]
    fn postconditions_compare_against_pre_call_state() {
        let guard = GuardConfig::default()
            .mode(EnforcementMode::Notify { proceed: true })
            .build(Arc::new(bank_validator()));
        let adapter = Arc::new(ConstraintsViolatedAdapter::new());
        guard.add_listener(adapter.clone());
        let account = guard.guard(Account::new("ann", 10));

        // Debits twice: the body mutates state the postcondition checks.
        let result = account
            .invoke("withdraw", vec![Value::Int(3)], |a, args| {
                withdraw(a, args)?;
                withdraw(a, args)
            })
            .unwrap();

        assert_eq!(result, Some(4));
        let violations = adapter.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].context(),
            &Context::MethodExit {
                declaring_type: "Account".into(),
                method: "withdraw".into(),
            }
        );
    }

    #[test]
    fn delegate_failure_skips_postconditions() {
        let guard = Guard::new(Arc::new(bank_validator()));
        let adapter = Arc::new(ConstraintsViolatedAdapter::new());
        guard.add_listener(adapter.clone());
        let account = guard.guard(Account::new("ann", 10));

        let err = account
            .invoke("withdraw", vec![Value::Int(3)], |_, _| Err::<i64, _>("ledger offline"))
            .unwrap_err();

        assert!(matches!(err, GuardError::Delegate("ledger offline")));
        assert!(adapter.errors().is_empty());
    }

    #[test]
    fn notify_without_proceed_suppresses_the_call() {
        let guard = GuardConfig::default()
            .mode(EnforcementMode::Notify { proceed: false })
            .build(Arc::new(bank_validator()));
        let adapter = Arc::new(ConstraintsViolatedAdapter::new());
        guard.add_listener(adapter.clone());
        let account = guard.guard(Account::new("ann", 10));

        let result = account.invoke("withdraw", vec![Value::Int(-2)], withdraw).unwrap();

        assert!(result.is_none());
        assert_eq!(account.get().balance(), 10);
        assert_eq!(adapter.errors().len(), 1);
        assert_eq!(adapter.violations()[0].error_code(), "covenant.Min");

        adapter.clear();
        assert!(adapter.violations().is_empty());
    }

    #[test]
    fn inactive_guard_checks_nothing() {
        let guard = Guard::new(Arc::new(bank_validator()));
        guard.set_active(false);
        let account = guard.guard(Account::new("ann", 10));
        let result = account.invoke("withdraw", vec![Value::Int(50)], withdraw).unwrap();
        assert_eq!(result, Some(-40));
    }

    #[test]
    fn phase_switches_are_honored() {
        let guard = Guard::new(Arc::new(bank_validator()));
        guard.set_precondition_checks(false);
        guard.set_parameter_checks(false);
        guard.set_postcondition_checks(false);
        let account = guard.guard(Account::new("ann", 10));

        // Overdraws, breaking the balance invariant checked after the call.
        let err = account
            .invoke("withdraw", vec![Value::Int(50)], withdraw)
            .unwrap_err();
        let violations = err.violations().unwrap().violations();
        assert_eq!(violations[0].context(), &Context::field("Account", "balance"));

        guard.set_invariant_checks(false);
        let result = account.invoke("withdraw", vec![Value::Int(1)], withdraw).unwrap();
        assert_eq!(result, Some(-41));
    }

    #[test]
    fn concurrent_calls_all_reach_the_body() {
        let guard = GuardConfig::default()
            .mode(EnforcementMode::Notify { proceed: true })
            .build(Arc::new(bank_validator()));
        let account = guard.guard(Account::new("ann", 1_000));

        thread::scope(|s| {
            for _ in 0..4 {
                let account = account.clone();
                s.spawn(move || {
                    for _ in 0..25 {
                        // Interleaved debits may trip the postcondition; notify mode keeps going.
                        let result = account.invoke("withdraw", vec![Value::Int(1)], withdraw);
                        assert!(matches!(result, Ok(Some(_))));
                    }
                });
            }
        });

        assert_eq!(account.get().balance(), 900);
    }

    #[test]
    fn listener_trait_objects_can_be_shared() {
        let adapter: Arc<dyn ConstraintsViolatedListener> = Arc::new(ConstraintsViolatedAdapter::new());
        let guard = Guard::new(Arc::new(bank_validator()));
        guard.add_listener(Arc::clone(&adapter));
        assert!(guard.has_listener(&adapter));
    }
}
