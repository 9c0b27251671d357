use crate::{AdapterFactory, Error, Result, TriggerFactory};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Factories of one kind, keyed by lowercased type name
struct Factories<F: ?Sized> {
    kind: &'static str,
    by_name: BTreeMap<String, Arc<F>>,
}

impl<F: ?Sized> Factories<F> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            by_name: BTreeMap::new(),
        }
    }

    fn insert(&mut self, name: &str, factory: Arc<F>) {
        if self.by_name.insert(name.to_lowercase(), factory).is_some() {
            warn!("{} factory '{}' registered twice, keeping the last one", self.kind, name);
        }
    }

    fn get(&self, name: &str) -> Result<Arc<F>> {
        self.by_name
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| {
                Error::Configuration(format!("{} factory '{}' not found", self.kind, name))
            })
    }

    fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }
}

/// Trigger and destination adapter factories by type name.
///
/// Names match case-insensitively since layered config may lowercase them.
pub struct Registry {
    triggers: Factories<dyn TriggerFactory>,
    adapters: Factories<dyn AdapterFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            triggers: Factories::new("Trigger"),
            adapters: Factories::new("Adapter"),
        }
    }

    pub fn register_trigger(&mut self, factory: Arc<dyn TriggerFactory>) {
        let name = factory.name().to_string();
        self.triggers.insert(&name, factory);
    }

    pub fn register_adapter(&mut self, factory: Arc<dyn AdapterFactory>) {
        let name = factory.name().to_string();
        self.adapters.insert(&name, factory);
    }

    pub fn get_trigger_factory(&self, name: &str) -> Result<Arc<dyn TriggerFactory>> {
        self.triggers.get(name)
    }

    pub fn get_adapter_factory(&self, name: &str) -> Result<Arc<dyn AdapterFactory>> {
        self.adapters.get(name)
    }

    /// Registered trigger policies, sorted
    pub fn list_triggers(&self) -> Vec<String> {
        self.triggers.names()
    }

    /// Registered destination types, sorted
    pub fn list_adapters(&self) -> Vec<String> {
        self.adapters.names()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
