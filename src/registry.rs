//! Device registries
//!
//! Insertion-ordered set of port handles, unique by port id.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::platform::MidiPort;

/// Ports keyed by id; iteration follows insertion sequence
pub struct DeviceRegistry<P: ?Sized> {
    next_seq: u64,
    order: BTreeMap<u64, String>,
    entries: HashMap<String, (u64, Arc<P>)>,
}

impl<P: MidiPort + ?Sized> DeviceRegistry<P> {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            order: BTreeMap::new(),
            entries: HashMap::new(),
        }
    }

    /// Insert a handle unless one with the same id is present.
    ///
    /// Returns true if the handle was inserted.
    pub fn add(&mut self, device: Arc<P>) -> bool {
        let id = device.id().to_string();
        if self.entries.contains_key(&id) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, id.clone());
        self.entries.insert(id, (seq, device));
        true
    }

    /// Remove the handle with this id; absent ids are ignored
    pub fn remove(&mut self, id: &str) -> Option<Arc<P>> {
        let (seq, removed) = self.entries.remove(id)?;
        self.order.remove(&seq);
        Some(removed)
    }

    /// Keep only handles matching the predicate, returning the others
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<Arc<P>>
    where
        F: FnMut(&P) -> bool,
    {
        let dropped: Vec<String> = self
            .iter()
            .filter(|d| !keep(Arc::as_ref(d)))
            .map(|d| d.id().to_string())
            .collect();

        dropped.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<P>> {
        self.entries.get(id).map(|(_, device)| device.clone())
    }

    pub fn ids(&self) -> Vec<String> {
        self.order.values().cloned().collect()
    }

    /// Handles in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<P>> + '_ {
        self.order
            .values()
            .filter_map(|id| self.entries.get(id).map(|(_, device)| device))
    }

    pub fn to_vec(&self) -> Vec<Arc<P>> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

impl<P: MidiPort + ?Sized> Default for DeviceRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: MidiPort + ?Sized> fmt::Debug for DeviceRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.order.values()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{OutputPort, VirtualOutput};

    fn output(id: &str) -> Arc<dyn OutputPort> {
        Arc::new(VirtualOutput::new(id, format!("Port {}", id)))
    }

    #[test]
    fn test_add_deduplicates_by_id() {
        let mut registry: DeviceRegistry<dyn OutputPort> = DeviceRegistry::new();
        assert!(registry.add(output("a")));
        assert!(!registry.add(output("a")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut registry: DeviceRegistry<dyn OutputPort> = DeviceRegistry::new();
        registry.add(output("a"));
        assert!(registry.remove("missing").is_none());
        assert_eq!(registry.ids(), ["a".to_string()]);
    }

    #[test]
    fn test_insertion_order_survives_removal() {
        let mut registry: DeviceRegistry<dyn OutputPort> = DeviceRegistry::new();
        for id in ["c", "a", "b"] {
            registry.add(output(id));
        }
        registry.remove("a");
        registry.add(output("a"));

        let ids: Vec<&str> = registry.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert!(registry.contains("b"));
        assert_eq!(registry.get("c").map(|d| d.name().to_string()), Some("Port c".to_string()));
    }

    #[test]
    fn test_retain_returns_dropped() {
        let mut registry: DeviceRegistry<dyn OutputPort> = DeviceRegistry::new();
        for id in ["a", "b", "c"] {
            registry.add(output(id));
        }
        let dropped = registry.retain(|d| d.id() != "b");
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].id(), "b");
        assert_eq!(registry.ids(), ["a".to_string(), "c".to_string()]);

        registry.clear();
        assert!(registry.is_empty());
    }
}
