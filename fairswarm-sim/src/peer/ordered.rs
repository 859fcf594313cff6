//! Insertion-ordered map used as a set, a FIFO queue and a rotation buffer.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Map that remembers the order in which keys were first inserted.
///
/// Re-inserting an existing key replaces its value in place; only
/// `move_to_back` changes a key's position.
#[derive(Debug, Clone)]
pub struct OrderedMap<K, V> {
    order: VecDeque<K>,
    entries: HashMap<K, V>,
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self {
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash, V> OrderedMap<K, V> {
    /// Creates an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces; returns the previous value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.entries.insert(key, value);
        if previous.is_none() {
            self.order.push_back(key);
        }
        previous
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.entries.remove(key)?;
        if let Some(position) = self.order.iter().position(|k| k == key) {
            self.order.remove(position);
        }
        Some(value)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.order.iter().copied()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).map(|value| (*key, value)))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, value)| value)
    }

    /// Key at `index` in insertion order.
    pub fn nth_key(&self, index: usize) -> Option<K> {
        self.order.get(index).copied()
    }

    pub fn front_key(&self) -> Option<K> {
        self.order.front().copied()
    }

    /// Moves `key` behind every other key. Returns false for unknown keys.
    pub fn move_to_back(&mut self, key: &K) -> bool {
        match self.order.iter().position(|k| k == key) {
            Some(position) => {
                if let Some(moved) = self.order.remove(position) {
                    self.order.push_back(moved);
                }
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}
