use tracing::{debug, error, warn};

use crate::backend::pigpiod::PigpiodBackend;
use crate::backend::sim::SimBackend;
use crate::bus::BusHandle;
use crate::error::{BusError, DuplicateBackend, Result};
use crate::factory::BusFactory;

/// Ordered set of named backends.
///
/// Registration order is priority order: [`create_bus`](Self::create_bus)
/// tries backends first-registered first. Names are unique.
///
/// A registry is not synchronized. Registering or creating buses from
/// several threads must be serialized by the caller.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Box<dyn BusFactory>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// A registry holding `pigpiod` (over TCP) followed by `sim`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for factory in [
            Box::new(PigpiodBackend::tcp()) as Box<dyn BusFactory>,
            Box::new(SimBackend::new()),
        ] {
            // Built-in names are distinct.
            let _ = registry.register_boxed(factory);
        }
        registry
    }

    /// Add a backend after the ones already registered.
    ///
    /// A backend whose name is taken is rejected and the existing entry is
    /// left in place.
    pub fn register(
        &mut self,
        factory: impl BusFactory + 'static,
    ) -> Result<(), DuplicateBackend> {
        self.register_boxed(Box::new(factory))
    }

    pub fn register_boxed(
        &mut self,
        factory: Box<dyn BusFactory>,
    ) -> Result<(), DuplicateBackend> {
        let name = factory.name();
        if self.get(name).is_some() {
            error!(backend = name, "backend is already registered");
            return Err(DuplicateBackend { name: name.to_owned() });
        }
        debug!(backend = name, "backend registered");
        self.entries.push(factory);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn BusFactory> {
        self.entries
            .iter()
            .find(|factory| factory.name() == name)
            .map(|factory| factory.as_ref())
    }

    /// Backend names in priority order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|factory| factory.name())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Create a bus from the first backend that accepts `uri`.
    ///
    /// `None` asks every backend for its default device. When no backend
    /// produces a bus the result is the first error from a backend that
    /// claimed the string, otherwise [`BusError::InvalidUri`] for a string
    /// nobody recognized or [`BusError::BackendFailure`] when no default
    /// device exists.
    pub fn create_bus(&self, uri: Option<&str>) -> Result<BusHandle> {
        let mut first_error = None;
        for factory in &self.entries {
            match factory.create(uri) {
                Ok(Some(bus)) => {
                    debug!(backend = factory.name(), ?uri, "bus created");
                    return Ok(BusHandle::new(factory.name(), bus));
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(backend = factory.name(), %err, "backend failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        warn!(?uri, "can't create a bus instance");
        Err(first_error.unwrap_or(match uri {
            Some(_) => BusError::InvalidUri,
            None => BusError::BackendFailure,
        }))
    }
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
