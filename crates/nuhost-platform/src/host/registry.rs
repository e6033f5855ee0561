use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::service::Service;

/// Started instances, addressable by name or implementation type.
#[derive(Default)]
pub(crate) struct InstanceRegistry {
    ordered: Vec<Arc<dyn Service>>,
    by_name: HashMap<String, Arc<dyn Service>>,
    by_type: HashMap<TypeId, Arc<dyn Service>>,
}

impl InstanceRegistry {
    /// Later duplicates of a type do not replace the first registration.
    pub(crate) fn new(instances: Vec<(TypeId, Arc<dyn Service>)>) -> Self {
        let mut registry = Self::default();
        for (type_id, instance) in instances {
            registry
                .by_name
                .insert(instance.name().name().to_lowercase(), Arc::clone(&instance));
            registry
                .by_type
                .entry(type_id)
                .or_insert_with(|| Arc::clone(&instance));
            registry.ordered.push(instance);
        }
        registry
    }

    pub(crate) fn by_name(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.by_name.get(&name.to_lowercase()).cloned()
    }

    pub(crate) fn by_type(&self, type_id: TypeId) -> Option<Arc<dyn Service>> {
        self.by_type.get(&type_id).cloned()
    }

    pub(crate) fn instances(&self) -> &[Arc<dyn Service>] {
        &self.ordered
    }
}
