//! Declarations of hostable service kinds.

use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::{Service, ServiceCore, ServiceError};

const CATALOG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::catalog");

/// Builds a service instance from its core.
pub type ServiceFactory =
    Arc<dyn Fn(ServiceCore) -> Result<Arc<dyn Service>, ServiceError> + Send + Sync>;

/// One hostable service kind: a unique name, its implementation type and a
/// factory.
#[derive(Clone)]
pub struct ServiceDefinition {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    factory: ServiceFactory,
}

impl ServiceDefinition {
    /// Declares a service whose construction cannot fail.
    #[must_use]
    pub fn new<T, F>(name: impl Into<String>, factory: F) -> Self
    where
        T: Service,
        F: Fn(ServiceCore) -> T + Send + Sync + 'static,
    {
        Self::try_new(name, move |core| Ok(factory(core)))
    }

    /// Declares a service whose construction may fail.
    #[must_use]
    pub fn try_new<T, F>(name: impl Into<String>, factory: F) -> Self
    where
        T: Service,
        F: Fn(ServiceCore) -> Result<T, ServiceError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            factory: Arc::new(move |core| {
                factory(core).map(|service| Arc::new(service) as Arc<dyn Service>)
            }),
        }
    }

    /// Unique service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Implementation type.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Implementation type name, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Constructs an instance.
    ///
    /// # Errors
    ///
    /// Propagates the factory's failure.
    pub fn create(&self, core: ServiceCore) -> Result<Arc<dyn Service>, ServiceError> {
        (self.factory)(core)
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Every service kind a launcher knows how to host.
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    definitions: Vec<ServiceDefinition>,
}

impl ServiceCatalog {
    /// Builds an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, definition: ServiceDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Catalogued definitions in registration order.
    #[must_use]
    pub fn definitions(&self) -> &[ServiceDefinition] {
        &self.definitions
    }

    /// Picks the definitions named in `names`, ignoring case.
    ///
    /// An empty selection picks every definition. Names with no matching
    /// definition are skipped with a warning.
    #[must_use]
    pub fn select(&self, names: &[String]) -> Vec<ServiceDefinition> {
        if names.is_empty() {
            return self.definitions.clone();
        }
        names
            .iter()
            .filter_map(|name| {
                let found = self
                    .definitions
                    .iter()
                    .find(|definition| definition.name.eq_ignore_ascii_case(name));
                if found.is_none() {
                    warn!(
                        target: CATALOG_TARGET,
                        event = "unknown_service",
                        service = %name,
                        "skipping unknown service"
                    );
                }
                found.cloned()
            })
            .collect()
    }
}
