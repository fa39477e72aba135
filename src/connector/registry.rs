//! Name -> factory registry for connector backends.
//!
//! A `RegistryBuilder` collects descriptors at process start, either one by
//! one or from a `Discovery` source. `build()` freezes the set into a
//! `BackendRegistry`, which is immutable and can be shared across threads
//! without locking.

use super::ConnectorInstance;
use crate::error::{MemError, Result};
use crate::mem::PhysicalMemory;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds a backend from its unparsed argument string.
pub type BackendFactory =
    Arc<dyn Fn(&str) -> Result<Box<dyn PhysicalMemory>> + Send + Sync + 'static>;

/// A named backend and the factory that creates it.
#[derive(Clone)]
pub struct BackendDescriptor {
    pub name: String,
    pub description: String,
    pub factory: BackendFactory,
}

impl BackendDescriptor {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str) -> Result<Box<dyn PhysicalMemory>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            factory: Arc::new(factory),
        }
    }

    /// Run the factory. Failures are reported as `BackendInit`.
    pub fn instantiate(&self, args: &str) -> Result<Box<dyn PhysicalMemory>> {
        (self.factory)(args).map_err(|e| MemError::backend_init(&self.name, e))
    }
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A source of backend descriptors, enumerated once at startup.
pub trait Discovery {
    fn enumerate(&self) -> Vec<BackendDescriptor>;
}

impl Discovery for Vec<BackendDescriptor> {
    fn enumerate(&self) -> Vec<BackendDescriptor> {
        self.clone()
    }
}

/// Mutable registry used during startup.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    backends: HashMap<String, BackendDescriptor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one descriptor. A name that is already taken is a
    /// `ConflictingRegistration`; the first registration stays.
    pub fn register(&mut self, descriptor: BackendDescriptor) -> Result<()> {
        if self.backends.contains_key(&descriptor.name) {
            return Err(MemError::ConflictingRegistration {
                name: descriptor.name,
            });
        }
        debug!(name = %descriptor.name, "registered connector");
        self.backends.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Builder-style `register`.
    pub fn with(mut self, descriptor: BackendDescriptor) -> Result<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Register everything a discovery source yields. Conflicts are logged
    /// and skipped; returns how many there were.
    pub fn discover(&mut self, source: &dyn Discovery) -> usize {
        let mut conflicts = 0;
        for descriptor in source.enumerate() {
            if let Err(e) = self.register(descriptor) {
                warn!(error = %e, "skipping connector");
                conflicts += 1;
            }
        }
        conflicts
    }

    pub fn build(self) -> BackendRegistry {
        BackendRegistry {
            backends: Arc::new(self.backends),
        }
    }
}

/// Immutable set of available backends. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: Arc<HashMap<String, BackendDescriptor>>,
}

impl BackendRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn resolve(&self, name: &str) -> Result<&BackendDescriptor> {
        self.backends.get(name).ok_or_else(|| MemError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.backends.values()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Resolve `name` and create a connector from it.
    pub fn create(&self, name: &str, args: &str) -> Result<ConnectorInstance> {
        ConnectorInstance::create(self.resolve(name)?, args)
    }
}
