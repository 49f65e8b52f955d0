//! Port-keyed instance registry.
//!
//! Plain map/set bookkeeping. Callers serialize access through the pool's
//! mutex, which is also held across start-or-reuse.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Mapping from port to running instance, plus the set of shared ports.
#[derive(Debug)]
pub struct Registry<T> {
    instances: HashMap<u16, Arc<T>>,
    shared_ports: HashSet<u16>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            instances: HashMap::new(),
            shared_ports: HashSet::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance registered on `port`, if any.
    pub fn get(&self, port: u16) -> Option<Arc<T>> {
        self.instances.get(&port).cloned()
    }

    /// Register `instance` on `port`, returning any instance it replaced.
    pub fn put(&mut self, port: u16, instance: Arc<T>) -> Option<Arc<T>> {
        self.instances.insert(port, instance)
    }

    /// Unregister `port`. The shared flag is cleared along with it.
    pub fn remove(&mut self, port: u16) -> Option<Arc<T>> {
        self.shared_ports.remove(&port);
        self.instances.remove(&port)
    }

    pub fn mark_shared(&mut self, port: u16) {
        self.shared_ports.insert(port);
    }

    pub fn is_shared(&self, port: u16) -> bool {
        self.shared_ports.contains(&port)
    }

    /// Any port currently flagged shared (lowest first).
    pub fn any_shared_port(&self) -> Option<u16> {
        self.shared_ports.iter().min().copied()
    }

    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.instances.keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
