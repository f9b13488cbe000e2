//! Hash map from nonzero references to values, layered on [`RefSet`].
//!
//! Keys live in a [`RefSet`]; the value of a key sits at the key's slot in a
//! parallel array, so a value exists exactly where the set holds a live key.

use std::fmt;

use tracing::trace;

use crate::refset::{self, capacity_exhausted, RefSet};
use crate::Ref;

#[derive(Clone)]
pub struct RefMap<V> {
    keys: RefSet,
    values: Vec<Option<V>>,
}

impl<V> RefMap<V> {
    pub fn new() -> Self {
        let keys = RefSet::new();
        let values = empty_values(keys.capacity());
        Self { keys, values }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.keys.capacity()
    }

    /// Slot of `key`, or None if `key` is 0 or absent.
    pub fn locate(&self, key: Ref) -> Option<usize> {
        self.keys.locate(key)
    }

    pub fn contains_key(&self, key: Ref) -> bool {
        self.keys.contains(key)
    }

    pub fn get(&self, key: Ref) -> Option<&V> {
        let slot = self.keys.locate(key)?;
        self.values[slot].as_ref()
    }

    pub fn get_mut(&mut self, key: Ref) -> Option<&mut V> {
        let slot = self.keys.locate(key)?;
        self.values[slot].as_mut()
    }

    /// Slot for `key` without growing; None for 0 or when full. The caller
    /// must store a value at the returned slot via [`set`](Self::set) before
    /// the map is read again.
    pub(crate) fn put(&mut self, key: Ref) -> Option<usize> {
        self.keys.insert(key)
    }

    /// Store `value` at `slot`, returning the value it replaces. Ignored for
    /// slots without a live key.
    pub(crate) fn set(&mut self, slot: usize, value: V) -> Option<V> {
        if self.keys.get(slot) == 0 {
            return None;
        }
        self.values[slot].replace(value)
    }

    /// Insert or replace, growing first. Returns the previous value.
    pub fn insert(&mut self, key: Ref, value: V) -> Option<V> {
        if key == 0 {
            return None;
        }
        let slot = self.reserve(key);
        self.set(slot, value)
    }

    /// Value of `key`, inserting `f()` first if absent. None only for key 0.
    pub fn get_or_insert_with<F>(&mut self, key: Ref, f: F) -> Option<&mut V>
    where
        F: FnOnce() -> V,
    {
        if key == 0 {
            return None;
        }
        let slot = self.reserve(key);
        Some(self.values[slot].get_or_insert_with(f))
    }

    fn reserve(&mut self, key: Ref) -> usize {
        if !self.keys.contains(key) {
            self.grow();
        }
        match self.put(key) {
            Some(slot) => slot,
            None => capacity_exhausted(self.len()),
        }
    }

    pub fn remove(&mut self, key: Ref) -> Option<V> {
        let slot = self.keys.remove(key)?;
        self.values[slot].take()
    }

    /// Double the capacity if full, keeping each value at its key's slot.
    pub fn grow(&mut self) -> bool {
        let mask = self.keys.grown_mask();
        self.rebuild(mask)
    }

    /// Halve the capacity if half of it still holds every key.
    pub fn pack(&mut self) -> bool {
        let mask = self.keys.packed_mask();
        self.rebuild(mask)
    }

    fn rebuild(&mut self, mask: u32) -> bool {
        if mask == self.keys.mask() {
            return false;
        }
        trace!(from = self.keys.mask(), to = mask, len = self.len(), "rebuilding reference map");
        let keys = self.keys.rebuilt(mask);
        let mut values = empty_values(keys.capacity());
        for (slot, key) in self.keys.entries() {
            if let Some(to) = keys.locate(key) {
                values[to] = self.values[slot].take();
            }
        }
        self.keys = keys;
        self.values = values;
        true
    }

    pub fn keys(&self) -> refset::Iter<'_> {
        self.keys.iter()
    }

    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            entries: self.keys.entries(),
            values: &self.values,
        }
    }
}

fn empty_values<V>(capacity: usize) -> Vec<Option<V>> {
    std::iter::repeat_with(|| None).take(capacity).collect()
}

impl<V> Default for RefMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: PartialEq> PartialEq for RefMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<V: Eq> Eq for RefMap<V> {}

impl<V: fmt::Debug> fmt::Debug for RefMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, V> IntoIterator for &'a RefMap<V> {
    type Item = (Ref, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Iter<'a, V> {
        self.iter()
    }
}

/// Iterator over `(key, value)` pairs in slot order.
pub struct Iter<'a, V> {
    entries: refset::Entries<'a>,
    values: &'a [Option<V>],
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (Ref, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for (slot, key) in self.entries.by_ref() {
            if let Some(value) = self.values[slot].as_ref() {
                return Some((key, value));
            }
        }
        None
    }
}
