//! In-memory plugin registry.
//!
//! Maps plugin names to descriptors and remembers the order in which
//! plugins were discovered or installed. The registry does no I/O and no
//! locking; [`PluginManager`](crate::manager::PluginManager) owns it behind
//! a lock and keeps it in step with the plugin directory.

use std::collections::HashMap;

use crate::manifest::PluginDescriptor;

#[derive(Debug, Default, Clone)]
pub struct PluginRegistry {
    /// Plugin name → descriptor.
    plugins: HashMap<String, PluginDescriptor>,
    /// Names in discovery/installation order.
    order: Vec<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its name.
    ///
    /// Returns `false` and leaves the existing entry alone if the name is
    /// already taken.
    pub fn insert(&mut self, descriptor: PluginDescriptor) -> bool {
        if self.plugins.contains_key(&descriptor.name) {
            return false;
        }
        self.order.push(descriptor.name.clone());
        self.plugins.insert(descriptor.name.clone(), descriptor);
        true
    }

    /// Swap in a fresh descriptor for an already registered name.
    ///
    /// Position in the order is kept. Returns `false` if the name is unknown.
    pub fn replace(&mut self, descriptor: PluginDescriptor) -> bool {
        match self.plugins.get_mut(&descriptor.name) {
            Some(slot) => {
                *slot = descriptor;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<PluginDescriptor> {
        let removed = self.plugins.remove(name)?;
        self.order.retain(|n| n != name);
        Some(removed)
    }

    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.plugins.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.order.iter().filter_map(|name| self.plugins.get(name))
    }

    /// Enabled descriptors in registration order.
    pub fn enabled(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.iter().filter(|d| d.enabled)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
