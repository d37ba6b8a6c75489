//! Shared cache of resolved classes.
//!
//! The cache is an immutable [`Snapshot`] behind an [`ArcSwap`]. Readers
//! load it once per validation call and never see a half-merged class;
//! writers publish a copy with the new entry. A reload swaps in an empty
//! snapshot with a bumped generation, and resolutions that started against
//! the old generation are not published into the new one.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use covenant_types::{ConfigurationError, TypeDescriptor};
use tracing::{debug, info};

use super::resolve::{ResolvedClass, resolve_class};
use super::Configurer;

pub(crate) struct Snapshot {
    generation: u64,
    configurers: Arc<[Arc<dyn Configurer>]>,
    classes: HashMap<String, Arc<ResolvedClass>>,
}

pub(crate) struct MetadataStore {
    current: ArcSwap<Snapshot>,
}

impl MetadataStore {
    pub(crate) fn new(configurers: Vec<Arc<dyn Configurer>>) -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot {
                generation: 0,
                configurers: configurers.into(),
                classes: HashMap::new(),
            }),
        }
    }

    /// Per-call view: one snapshot plus classes resolved during the call.
    pub(crate) fn session(&self) -> ClassCache<'_> {
        ClassCache {
            store: self,
            snapshot: self.current.load_full(),
            local: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.current.load().generation
    }

    /// Replace the configurers and drop every cached class.
    pub(crate) fn reload(&self, configurers: Vec<Arc<dyn Configurer>>) {
        let configurers: Arc<[Arc<dyn Configurer>]> = configurers.into();
        let previous = self.current.rcu(|current| Snapshot {
            generation: current.generation + 1,
            configurers: Arc::clone(&configurers),
            classes: HashMap::new(),
        });
        info!(
            generation = previous.generation + 1,
            configurers = configurers.len(),
            "constraint configuration reloaded"
        );
    }

    /// Drop cached classes, keeping the configurers.
    pub(crate) fn clear_cache(&self) {
        let previous = self.current.rcu(|current| Snapshot {
            generation: current.generation + 1,
            configurers: Arc::clone(&current.configurers),
            classes: HashMap::new(),
        });
        debug!(generation = previous.generation + 1, "class configuration cache cleared");
    }

    fn publish(&self, generation: u64, class: &Arc<ResolvedClass>) {
        self.current.rcu(|current| {
            if current.generation != generation || current.classes.contains_key(&class.type_name) {
                return Arc::clone(current);
            }
            let mut classes = current.classes.clone();
            classes.insert(class.type_name.clone(), Arc::clone(class));
            Arc::new(Snapshot {
                generation,
                configurers: Arc::clone(&current.configurers),
                classes,
            })
        });
        debug!(type_name = %class.type_name, generation, "class configuration published");
    }
}

pub(crate) struct ClassCache<'a> {
    store: &'a MetadataStore,
    snapshot: Arc<Snapshot>,
    local: HashMap<String, Arc<ResolvedClass>>,
}

impl ClassCache<'_> {
    pub(crate) fn resolve(
        &mut self,
        descriptor: &TypeDescriptor,
    ) -> Result<Arc<ResolvedClass>, ConfigurationError> {
        let name = descriptor.name();
        if let Some(class) = self.snapshot.classes.get(name).or_else(|| self.local.get(name)) {
            return Ok(Arc::clone(class));
        }

        let class = Arc::new(resolve_class(
            name,
            descriptor.supertypes(),
            &self.snapshot.configurers,
        )?);
        debug!(
            type_name = name,
            layers = class.layers.len(),
            methods = class.methods.len(),
            "resolved class configuration"
        );
        self.store.publish(self.snapshot.generation, &class);
        self.local.insert(name.to_string(), Arc::clone(&class));
        Ok(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::Check;
    use crate::metadata::{ClassConfiguration, FieldConfiguration, PojoConfigurer};

    struct Marker;

    fn descriptor(name: &str) -> Arc<TypeDescriptor> {
        TypeDescriptor::builder::<Marker>(name).build()
    }

    fn configurer(max: usize) -> Vec<Arc<dyn Configurer>> {
        vec![Arc::new(PojoConfigurer::new().with_class(
            ClassConfiguration::new("Doc")
                .field(FieldConfiguration::new("title").check(Check::max_length(max))),
        ))]
    }

    #[test]
    fn resolved_classes_are_shared_across_sessions() {
        let store = MetadataStore::new(configurer(5));
        let first = store.session().resolve(&descriptor("Doc")).unwrap();
        let second = store.session().resolve(&descriptor("Doc")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn reload_publishes_a_fresh_generation() {
        let store = MetadataStore::new(configurer(5));
        let mut stale = store.session();
        store.session().resolve(&descriptor("Doc")).unwrap();

        store.reload(configurer(9));
        assert_eq!(store.generation(), 1);

        // A session opened before the reload keeps its own view and does not
        // leak it into the new generation.
        stale.resolve(&descriptor("Other")).unwrap();
        let fresh = store.session();
        assert!(!fresh.snapshot.classes.contains_key("Other"));
        assert!(!fresh.snapshot.classes.contains_key("Doc"));

        let doc = store.session().resolve(&descriptor("Doc")).unwrap();
        let check = &doc.field_checks("title")[0];
        assert_eq!(check.kind().message_variables()[0].1, "9");
    }

    #[test]
    fn types_without_declarations_resolve_empty() {
        let store = MetadataStore::new(Vec::new());
        assert!(store.session().resolve(&descriptor("Nothing")).unwrap().is_empty());
    }
}
