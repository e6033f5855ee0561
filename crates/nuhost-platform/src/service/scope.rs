//! Per-service component scopes layered over the host composition.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::clock::Clock;
use crate::host::Composition;
use crate::model::ServiceName;

type Component = Arc<dyn Any + Send + Sync>;

/// Components keyed by their concrete type.
#[derive(Clone, Default)]
pub struct ComponentMap {
    components: HashMap<TypeId, Component>,
}

impl ComponentMap {
    /// Registers a shared component, replacing any of the same type.
    pub fn insert<T>(&mut self, component: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        self.components.insert(TypeId::of::<T>(), component);
    }

    pub(crate) fn insert_erased(&mut self, type_id: TypeId, component: Component) {
        self.components.insert(type_id, component);
    }

    /// Looks up a component by type.
    #[must_use]
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.components
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|component| component.downcast::<T>().ok())
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Debug for ComponentMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentMap")
            .field("len", &self.components.len())
            .finish()
    }
}

/// Collects the components a service registers for its own scope.
#[derive(Debug, Default)]
pub struct ScopeBuilder {
    components: ComponentMap,
}

impl ScopeBuilder {
    /// Registers an owned component.
    pub fn register<T>(&mut self, component: T) -> &mut Self
    where
        T: Any + Send + Sync,
    {
        self.components.insert(Arc::new(component));
        self
    }

    /// Registers an already shared component.
    pub fn register_shared<T>(&mut self, component: Arc<T>) -> &mut Self
    where
        T: Any + Send + Sync,
    {
        self.components.insert(component);
        self
    }

    pub(crate) fn register_erased(&mut self, type_id: TypeId, component: Component) {
        self.components.insert_erased(type_id, component);
    }

    pub(crate) fn build(self, service: ServiceName, composition: Arc<Composition>) -> ServiceScope {
        ServiceScope {
            service,
            components: self.components,
            composition,
        }
    }
}

/// The isolated scope a service starts in.
///
/// Lookups consult the service's own registrations first and fall back to
/// the host composition, which is shared read-only by every service.
#[derive(Debug, Clone)]
pub struct ServiceScope {
    service: ServiceName,
    components: ComponentMap,
    composition: Arc<Composition>,
}

impl ServiceScope {
    /// Service owning the scope.
    #[must_use]
    pub const fn service(&self) -> &ServiceName {
        &self.service
    }

    /// Resolves a component by type.
    #[must_use]
    pub fn resolve<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.components
            .get::<T>()
            .or_else(|| self.composition.resolve::<T>())
    }

    /// Host composition the scope falls back to.
    #[must_use]
    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Host clock.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.composition.clock()
    }
}
