// Append-only ordered identity registries (cores, interfaces, disk devices).

use std::collections::HashSet;
use std::hash::Hash;

/// Entities in discovery order. Entries are never removed or reordered during a run,
/// so index `i` names the same entity in every Snapshot.
#[derive(Debug, Clone)]
pub struct IdentityRegistry<K> {
    order: Vec<K>,
    known: HashSet<K>,
}

impl<K> Default for IdentityRegistry<K> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            known: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> IdentityRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` if new. Returns true when it was not seen before.
    pub fn observe(&mut self, key: &K) -> bool {
        if self.known.contains(key) {
            return false;
        }
        self.known.insert(key.clone());
        self.order.push(key.clone());
        true
    }

    /// Register every key of `keys` in iteration order; returns how many were new.
    pub fn extend<'a>(&mut self, keys: impl IntoIterator<Item = &'a K>) -> usize
    where
        K: 'a,
    {
        keys.into_iter().filter(|k| self.observe(k)).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_discovery_order_and_never_shrinks() {
        let mut reg = IdentityRegistry::new();
        let first = ["eth0".to_string(), "wlan0".to_string()];
        assert_eq!(reg.extend(first.iter()), 2);
        // eth0 silent this tick, docker0 appears.
        let second = ["docker0".to_string(), "wlan0".to_string()];
        assert_eq!(reg.extend(second.iter()), 1);
        let names: Vec<&str> = reg.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["eth0", "wlan0", "docker0"]);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn observe_reports_new_entries_once() {
        let mut reg = IdentityRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.observe(&3u32));
        assert!(!reg.observe(&3u32));
        assert!(reg.observe(&0u32));
        assert_eq!(reg.iter().copied().collect::<Vec<_>>(), vec![3, 0]);
    }
}
