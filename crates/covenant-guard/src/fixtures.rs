//! A small bank account with a withdraw contract, shared by the unit tests.

use std::sync::{Arc, LazyLock, Mutex};

use covenant_types::{Reflect, TypeDescriptor, Value};
use covenant_validator::{
    Bindings, Check, ClassConfiguration, FieldConfiguration, FunctionLanguage,
    MethodConfiguration, ParameterConfiguration, PojoConfigurer, Validator, ValidatorConfig,
};

pub(crate) struct Account {
    owner: String,
    balance: Mutex<i64>,
}

impl Account {
    pub fn new(owner: &str, balance: i64) -> Self {
        Self {
            owner: owner.to_string(),
            balance: Mutex::new(balance),
        }
    }

    pub fn balance(&self) -> i64 {
        *self.balance.lock().unwrap()
    }

    /// Debit `amount` and return the new balance.
    pub fn withdraw(&self, amount: i64) -> i64 {
        let mut balance = self.balance.lock().unwrap();
        *balance -= amount;
        *balance
    }
}

impl Reflect for Account {
    fn descriptor() -> Arc<TypeDescriptor> {
        static DESCRIPTOR: LazyLock<Arc<TypeDescriptor>> = LazyLock::new(|| {
            TypeDescriptor::builder::<Account>("Account")
                .field("owner", |a| Value::from(&a.owner))
                .field("balance", |a| Value::from(a.balance()))
                .build()
        });
        DESCRIPTOR.clone()
    }
}

fn balance(b: &Bindings) -> i64 {
    b.get("_this")
        .and_then(Value::as_object)
        .and_then(|o| o.downcast_ref::<Account>())
        .map_or(0, Account::balance)
}

fn amount(b: &Bindings) -> f64 {
    b.get("amount").and_then(Value::as_f64).unwrap_or(0.0)
}

/// `withdraw(amount)` requires a positive amount covered by the balance and
/// promises the balance drops by exactly that amount. A negative balance
/// breaks the class invariant.
pub(crate) fn bank_validator() -> Validator {
    let functions = FunctionLanguage::new("fn")
        .function("has_funds", |b| Value::from(balance(b) as f64 >= amount(b)))
        .function("balance", |b| Value::from(balance(b)))
        .function("debited", |b| {
            let old = b.get("_old").and_then(Value::as_f64).unwrap_or(0.0);
            Value::from(balance(b) as f64 == old - amount(b))
        });
    let configurer = PojoConfigurer::new().with_class(
        ClassConfiguration::new("Account")
            .check_invariants(true)
            .field(FieldConfiguration::new("owner").check(Check::not_blank()))
            .field(FieldConfiguration::new("balance").check(Check::min(0.0, true)))
            .method(
                MethodConfiguration::new("withdraw")
                    .parameter(ParameterConfiguration::new("amount").check(Check::min(0.0, false)))
                    .precondition(Check::pre("fn", "has_funds"))
                    .postcondition(Check::post("fn", "debited").with_old("balance")),
            ),
    );
    ValidatorConfig::default()
        .language(functions)
        .configurer(configurer)
        .build()
}
