use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ConfigurationError, DomainError};
use crate::value::Value;

type AnyObject = dyn Any + Send + Sync;
type FieldGetter = Arc<dyn Fn(&AnyObject) -> Value + Send + Sync>;
type Predicate = Arc<dyn Fn(&AnyObject, &Value) -> bool + Send + Sync>;

/// Accessor registry for one application type.
///
/// Built once per type and shared. Field getters must be side-effect free:
/// the engine calls them freely while walking a graph. Predicates are the
/// named boolean methods that `ValidateWithMethod` checks invoke.
pub struct TypeDescriptor {
    name: String,
    type_id: TypeId,
    supertypes: Vec<String>,
    fields: IndexMap<String, FieldGetter>,
    predicates: IndexMap<String, Predicate>,
}

impl TypeDescriptor {
    /// Start describing the concrete Rust type `T` under a configuration name.
    pub fn builder<T: Any + Send + Sync>(name: impl Into<String>) -> TypeDescriptorBuilder<T> {
        TypeDescriptorBuilder {
            descriptor: TypeDescriptor {
                name: name.into(),
                type_id: TypeId::of::<T>(),
                supertypes: Vec::new(),
                fields: IndexMap::new(),
                predicates: IndexMap::new(),
            },
            _marker: std::marker::PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Every ancestor type and implemented interface, nearest first.
    ///
    /// Configuration lookup does not recurse through these names, so the list
    /// must be complete.
    pub fn supertypes(&self) -> &[String] {
        &self.supertypes
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn has_predicate(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("supertypes", &self.supertypes)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct TypeDescriptorBuilder<T> {
    descriptor: TypeDescriptor,
    _marker: std::marker::PhantomData<fn(&T)>,
}

impl<T: Any + Send + Sync> TypeDescriptorBuilder<T> {
    /// Declare an ancestor or implemented interface by configuration name.
    pub fn extends(mut self, supertype: impl Into<String>) -> Self {
        self.descriptor.supertypes.push(supertype.into());
        self
    }

    /// Register a field getter.
    pub fn field<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let getter: FieldGetter = Arc::new(move |any: &AnyObject| {
            any.downcast_ref::<T>().map_or(Value::Null, &getter)
        });
        self.descriptor.fields.insert(name.into(), getter);
        self
    }

    /// Register a named boolean method taking the value under validation.
    pub fn predicate<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&T, &Value) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate = Arc::new(move |any: &AnyObject, value: &Value| {
            any.downcast_ref::<T>()
                .is_some_and(|target| predicate(target, value))
        });
        self.descriptor.predicates.insert(name.into(), predicate);
        self
    }

    pub fn build(self) -> Arc<TypeDescriptor> {
        Arc::new(self.descriptor)
    }
}

/// Implemented by application types that publish a [`TypeDescriptor`].
///
/// Implementations typically cache the descriptor in a `static LazyLock`
/// so it is resolved once per process.
pub trait Reflect: Any + Send + Sync {
    fn descriptor() -> Arc<TypeDescriptor>;
}

/// Shared, identity-comparable handle to an application object.
#[derive(Clone)]
pub struct ObjectRef {
    inner: Arc<AnyObject>,
    descriptor: Arc<TypeDescriptor>,
}

impl ObjectRef {
    pub fn new<T: Reflect>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an existing shared allocation. Identity is that of `value`.
    pub fn from_arc<T: Reflect>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            descriptor: T::descriptor(),
        }
    }

    /// Pair a value with an explicitly supplied descriptor.
    pub fn with_descriptor<T: Any + Send + Sync>(
        value: Arc<T>,
        descriptor: Arc<TypeDescriptor>,
    ) -> Result<Self, DomainError> {
        if descriptor.type_id() != TypeId::of::<T>() {
            return Err(DomainError::DescriptorMismatch {
                descriptor: descriptor.name().to_string(),
                actual: std::any::type_name::<T>().to_string(),
            });
        }
        Ok(Self {
            inner: value,
            descriptor,
        })
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn type_name(&self) -> &str {
        self.descriptor.name()
    }

    /// Identity of the underlying allocation.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        self.id() == other.id()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.as_ref().downcast_ref::<T>()
    }

    /// Read a member through the accessor registry.
    pub fn field(&self, name: &str) -> Result<Value, ConfigurationError> {
        let getter =
            self.descriptor
                .fields
                .get(name)
                .ok_or_else(|| ConfigurationError::UnknownField {
                    type_name: self.type_name().to_string(),
                    field: name.to_string(),
                })?;
        Ok(getter(self.inner.as_ref()))
    }

    /// Invoke a registered predicate with `argument`.
    pub fn call_predicate(&self, name: &str, argument: &Value) -> Result<bool, ConfigurationError> {
        let predicate =
            self.descriptor
                .predicates
                .get(name)
                .ok_or_else(|| ConfigurationError::UnknownMethod {
                    type_name: self.type_name().to_string(),
                    method: name.to_string(),
                })?;
        Ok(predicate(self.inner.as_ref(), argument))
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({}@{:#x})", self.type_name(), self.id())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.type_name(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;

    struct Point {
        x: i64,
        label: Option<String>,
    }

    impl Reflect for Point {
        fn descriptor() -> Arc<TypeDescriptor> {
            static DESCRIPTOR: LazyLock<Arc<TypeDescriptor>> = LazyLock::new(|| {
                TypeDescriptor::builder::<Point>("Point")
                    .extends("Shape")
                    .field("x", |p| Value::from(p.x))
                    .field("label", |p| Value::from(p.label.clone()))
                    .predicate("is_positive", |p, _| p.x > 0)
                    .build()
            });
            DESCRIPTOR.clone()
        }
    }

    #[test]
    fn field_access_goes_through_descriptor() {
        let p = ObjectRef::new(Point { x: 4, label: None });
        assert_eq!(p.field("x").unwrap(), Value::Int(4));
        assert_eq!(p.field("label").unwrap(), Value::Null);
        assert_eq!(p.type_name(), "Point");
        assert_eq!(p.descriptor().supertypes(), ["Shape".to_string()]);
    }

    #[test]
    fn unknown_field_is_configuration_error() {
        let p = ObjectRef::new(Point { x: 1, label: None });
        let err = p.field("y").unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnknownField { ref type_name, ref field }
                if type_name == "Point" && field == "y"
        ));
    }

    #[test]
    fn identity_is_shared_by_clones_only() {
        let a = ObjectRef::new(Point { x: 1, label: None });
        let b = a.clone();
        let c = ObjectRef::new(Point { x: 1, label: None });
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_ne!(Value::from(&a), Value::from(&c));
    }

    #[test]
    fn predicates_are_invoked_with_the_target() {
        let p = ObjectRef::new(Point { x: -2, label: None });
        assert!(!p.call_predicate("is_positive", &Value::Null).unwrap());
        assert!(p.call_predicate("missing", &Value::Null).is_err());
    }

    #[test]
    fn mismatched_descriptor_is_rejected() {
        let err = ObjectRef::with_descriptor(Arc::new(42u8), Point::descriptor()).unwrap_err();
        assert!(matches!(err, DomainError::DescriptorMismatch { .. }));
    }
}
