//! Object graphs shared by the unit tests.

use std::sync::{Arc, LazyLock, Mutex};

use covenant_types::{ObjectRef, Reflect, TypeDescriptor, Value};

use crate::metadata::{Configurer, PojoConfigurer};
use crate::validator::Validator;
use crate::ValidatorConfig;

macro_rules! reflect {
    ($ty:ty, $builder:expr) => {
        impl Reflect for $ty {
            fn descriptor() -> Arc<TypeDescriptor> {
                static DESCRIPTOR: LazyLock<Arc<TypeDescriptor>> = LazyLock::new(|| $builder);
                DESCRIPTOR.clone()
            }
        }
    };
}

pub(crate) struct Level1 {
    pub level2a: Value,
    pub level2b: Value,
    pub things: Vec<Value>,
}

reflect!(
    Level1,
    TypeDescriptor::builder::<Level1>("Level1")
        .field("level2a", |l| l.level2a.clone())
        .field("level2b", |l| l.level2b.clone())
        .field("things", |l| Value::List(l.things.clone()))
        .build()
);

pub(crate) struct Level2 {
    pub level3: Value,
}

reflect!(
    Level2,
    TypeDescriptor::builder::<Level2>("Level2")
        .field("level3", |l| l.level3.clone())
        .build()
);

pub(crate) struct Level3 {
    pub name: Option<String>,
    pub array: Option<Vec<String>>,
}

reflect!(
    Level3,
    TypeDescriptor::builder::<Level3>("Level3")
        .field("name", |l| Value::from(l.name.clone()))
        .field("array", |l| Value::from(l.array.clone()))
        .build()
);

pub(crate) struct Thing {
    pub visible: bool,
}

reflect!(
    Thing,
    TypeDescriptor::builder::<Thing>("Thing")
        .field("visible", |t| Value::from(t.visible))
        .build()
);

pub(crate) fn level1(level2a: Option<Value>, level2b: Option<Value>, things: Vec<Value>) -> Value {
    ObjectRef::new(Level1 {
        level2a: level2a.unwrap_or_default(),
        level2b: level2b.unwrap_or_default(),
        things,
    })
    .into()
}

pub(crate) fn level2(level3: Option<Value>) -> Value {
    ObjectRef::new(Level2 {
        level3: level3.unwrap_or_default(),
    })
    .into()
}

pub(crate) fn level3(name: Option<&str>, array: Option<&[&str]>) -> Value {
    ObjectRef::new(Level3 {
        name: name.map(str::to_string),
        array: array.map(|a| a.iter().map(|s| s.to_string()).collect()),
    })
    .into()
}

pub(crate) fn thing(visible: bool) -> Value {
    ObjectRef::new(Thing { visible }).into()
}

pub(crate) struct Order {
    pub count: i64,
}

reflect!(
    Order,
    TypeDescriptor::builder::<Order>("Order")
        .field("count", |o| Value::from(o.count))
        .build()
);

pub(crate) struct Basket {
    pub items: Vec<String>,
}

reflect!(
    Basket,
    TypeDescriptor::builder::<Basket>("Basket")
        .field("items", |b| Value::from(b.items.clone()))
        .build()
);

/// Linked node whose successor can be set after construction, so tests
/// can close a cycle.
pub(crate) struct Node {
    pub name: String,
    pub next: Mutex<Option<ObjectRef>>,
}

reflect!(
    Node,
    TypeDescriptor::builder::<Node>("Node")
        .field("name", |n| Value::from(&n.name))
        .field("next", |n| {
            Value::from(n.next.lock().unwrap_or_else(|e| e.into_inner()).clone())
        })
        .build()
);

pub(crate) fn node(name: &str) -> ObjectRef {
    ObjectRef::new(Node {
        name: name.to_string(),
        next: Mutex::new(None),
    })
}

pub(crate) fn link(from: &ObjectRef, to: &ObjectRef) {
    if let Some(node) = from.downcast_ref::<Node>() {
        *node.next.lock().unwrap() = Some(to.clone());
    }
}

pub(crate) struct Person {
    pub name: Option<String>,
    pub age: i64,
}

reflect!(
    Person,
    TypeDescriptor::builder::<Person>("Person")
        .extends("Named")
        .field("name", |p| Value::from(p.name.clone()))
        .field("age", |p| Value::from(p.age))
        .predicate("is_adult_age", |_, v| v.as_f64().is_some_and(|a| a >= 18.0))
        .build()
);

/// Account with interior mutability so method bodies can change state.
pub(crate) struct Account {
    pub owner: String,
    pub balance: Mutex<i64>,
}

impl Account {
    pub fn balance(&self) -> i64 {
        *self.balance.lock().unwrap()
    }
}

reflect!(
    Account,
    TypeDescriptor::builder::<Account>("Account")
        .field("owner", |a| Value::from(&a.owner))
        .field("balance", |a| Value::from(a.balance()))
        .build()
);

pub(crate) fn account(owner: &str, balance: i64) -> ObjectRef {
    ObjectRef::new(Account {
        owner: owner.to_string(),
        balance: Mutex::new(balance),
    })
}

pub(crate) fn validator(configurer: PojoConfigurer) -> Validator {
    ValidatorConfig::default().configurer(configurer).build()
}

pub(crate) fn shared(configurer: PojoConfigurer) -> Arc<dyn Configurer> {
    Arc::new(configurer)
}
