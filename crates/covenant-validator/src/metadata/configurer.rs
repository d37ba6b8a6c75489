use std::collections::HashMap;

use super::{ClassConfiguration, ConstraintSet};

/// A source of constraint declarations.
///
/// Absence means "nothing declared here", never an error. Several
/// configurers can contribute to the same type; they are merged in
/// registration order.
pub trait Configurer: Send + Sync {
    fn class_configuration(&self, type_name: &str) -> Option<ClassConfiguration>;

    fn constraint_set(&self, id: &str) -> Option<ConstraintSet>;
}

/// In-memory configurer populated programmatically.
#[derive(Clone, Debug, Default)]
pub struct PojoConfigurer {
    classes: HashMap<String, ClassConfiguration>,
    constraint_sets: HashMap<String, ConstraintSet>,
}

impl PojoConfigurer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class configuration. Registering the same type twice
    /// replaces the earlier declaration.
    pub fn with_class(mut self, class: ClassConfiguration) -> Self {
        self.classes.insert(class.type_name.clone(), class);
        self
    }

    pub fn with_constraint_set(mut self, set: ConstraintSet) -> Self {
        self.constraint_sets.insert(set.id.clone(), set);
        self
    }
}

impl Configurer for PojoConfigurer {
    fn class_configuration(&self, type_name: &str) -> Option<ClassConfiguration> {
        self.classes.get(type_name).cloned()
    }

    fn constraint_set(&self, id: &str) -> Option<ConstraintSet> {
        self.constraint_sets.get(id).cloned()
    }
}
