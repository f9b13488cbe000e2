//! Chained hash set of nonzero references over flat arrays.
//!
//! Every slot is both a chain node (`next`, `item`) and, through `heads`, the
//! chain head of the bucket with the same index. Unused slots form a singly
//! linked free list threaded through `next`. Links are 1-based so that 0 can
//! terminate a chain.

use std::fmt;

use tracing::{error, trace};

use crate::Ref;

/// Smallest bucket mask: two slots.
pub const MIN_MASK: u32 = 1;

/// Largest bucket mask: 2^29 slots.
pub const MAX_MASK: u32 = (1 << 29) - 1;

#[derive(Debug, Clone, Copy)]
struct Slot {
    /// 1-based link to the next slot of the chain or free list, 0 at the end.
    next: u32,
    /// Stored reference, 0 while the slot is on the free list.
    item: Ref,
}

/// Hash set of nonzero references.
///
/// Bucket of `r` is `r & mask`. Collisions chain through slots, removal
/// relinks the chain and returns the slot to the free list. The capacity is
/// always `mask + 1`; it only changes through [`grow`](Self::grow) and
/// [`pack`](Self::pack), which rebuild both arrays.
#[derive(Clone)]
pub struct RefSet {
    len: u32,
    mask: u32,
    free: u32,
    heads: Vec<u32>,
    slots: Vec<Slot>,
}

impl RefSet {
    /// Empty set with two slots.
    pub fn new() -> Self {
        Self::with_mask(MIN_MASK)
    }

    fn with_mask(mask: u32) -> Self {
        let capacity = mask as usize + 1;
        // Free list runs through the slots in order: 1 -> 2 -> ... -> capacity -> 0.
        let slots = (1..=capacity)
            .map(|link| Slot {
                next: if link < capacity { link as u32 + 1 } else { 0 },
                item: 0,
            })
            .collect();
        Self {
            len: 0,
            mask,
            free: 1,
            heads: vec![0; capacity],
            slots,
        }
    }

    /// Set holding `a` and `b` (one element if they are equal).
    pub fn pair(a: Ref, b: Ref) -> Self {
        let mut set = Self::new();
        set.insert(a);
        set.insert(b);
        set
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots (`mask + 1`).
    pub fn capacity(&self) -> usize {
        self.mask as usize + 1
    }

    pub(crate) fn mask(&self) -> u32 {
        self.mask
    }

    fn bucket(&self, r: Ref) -> usize {
        ((r as u32) & self.mask) as usize
    }

    /// Slot holding `r`, or None if `r` is 0 or absent.
    pub fn locate(&self, r: Ref) -> Option<usize> {
        if r == 0 {
            return None;
        }
        let mut link = self.heads[self.bucket(r)];
        while link != 0 {
            let slot = &self.slots[link as usize - 1];
            if slot.item == r {
                return Some(link as usize - 1);
            }
            link = slot.next;
        }
        None
    }

    pub fn contains(&self, r: Ref) -> bool {
        self.locate(r).is_some()
    }

    /// Reference stored in `slot`, 0 for a free slot.
    pub fn get(&self, slot: usize) -> Ref {
        self.slots.get(slot).map_or(0, |s| s.item)
    }

    /// Slot holding `r`, taking one from the free list if `r` is new.
    ///
    /// Returns None for `r == 0` or when no slot is free. Callers that must
    /// not fail call [`grow`](Self::grow) first, or use [`add`](Self::add).
    pub fn insert(&mut self, r: Ref) -> Option<usize> {
        if r == 0 {
            return None;
        }
        if let Some(slot) = self.locate(r) {
            return Some(slot);
        }
        let link = self.free;
        if link == 0 {
            return None;
        }
        let bucket = self.bucket(r);
        let slot = link as usize - 1;
        self.free = self.slots[slot].next;
        self.slots[slot] = Slot {
            next: self.heads[bucket],
            item: r,
        };
        self.heads[bucket] = link;
        self.len += 1;
        Some(slot)
    }

    /// Grow if needed, then insert. Returns true if `r` was not present.
    pub fn add(&mut self, r: Ref) -> bool {
        if r == 0 || self.contains(r) {
            return false;
        }
        self.grow();
        if self.insert(r).is_none() {
            capacity_exhausted(self.len());
        }
        true
    }

    /// Remove `r`, returning the slot it occupied.
    pub fn remove(&mut self, r: Ref) -> Option<usize> {
        if r == 0 || self.len == 0 {
            return None;
        }
        let bucket = self.bucket(r);
        let mut prev = 0u32;
        let mut link = self.heads[bucket];
        while link != 0 {
            let slot = link as usize - 1;
            let Slot { next, item } = self.slots[slot];
            if item == r {
                if prev == 0 {
                    self.heads[bucket] = next;
                } else {
                    self.slots[prev as usize - 1].next = next;
                }
                self.slots[slot] = Slot {
                    next: self.free,
                    item: 0,
                };
                self.free = link;
                self.len -= 1;
                return Some(slot);
            }
            prev = link;
            link = next;
        }
        None
    }

    /// Any one element, None if empty.
    pub fn first(&self) -> Option<Ref> {
        if self.len == 0 {
            return None;
        }
        self.slots.iter().rev().map(|s| s.item).find(|&r| r != 0)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            entries: self.entries(),
        }
    }

    pub fn to_vec(&self) -> Vec<Ref> {
        self.iter().collect()
    }

    /// Live `(slot, ref)` pairs in slot order.
    pub(crate) fn entries(&self) -> Entries<'_> {
        Entries {
            slots: self.slots.iter().enumerate(),
        }
    }

    /// Mask [`grow`](Self::grow) would switch to.
    pub(crate) fn grown_mask(&self) -> u32 {
        if self.len > self.mask {
            ((self.mask << 1) | 1).min(MAX_MASK)
        } else {
            self.mask
        }
    }

    /// Mask [`pack`](Self::pack) would switch to.
    pub(crate) fn packed_mask(&self) -> u32 {
        if self.len * 2 < self.mask {
            (self.mask >> 1).max(MIN_MASK)
        } else {
            self.mask
        }
    }

    /// Double the bucket count if every slot is taken. Returns true if the
    /// set was rebuilt.
    pub fn grow(&mut self) -> bool {
        let mask = self.grown_mask();
        self.rebuild(mask)
    }

    /// Halve the bucket count if half the slots still hold every element.
    pub fn pack(&mut self) -> bool {
        let mask = self.packed_mask();
        self.rebuild(mask)
    }

    fn rebuild(&mut self, mask: u32) -> bool {
        if mask == self.mask {
            return false;
        }
        trace!(from = self.mask, to = mask, len = self.len, "rebuilding reference set");
        *self = self.rebuilt(mask);
        true
    }

    /// Copy of this set with `mask` buckets. Elements fill the slots in order,
    /// the rest of the slots form the free list.
    pub(crate) fn rebuilt(&self, mask: u32) -> Self {
        let mut next = Self::with_mask(mask);
        for r in self.iter() {
            if next.insert(r).is_none() {
                capacity_exhausted(self.len());
            }
        }
        next
    }
}

impl Default for RefSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for RefSet {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().all(|r| other.contains(r))
    }
}

impl Eq for RefSet {}

impl fmt::Debug for RefSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Ref> for RefSet {
    fn from_iter<I: IntoIterator<Item = Ref>>(iter: I) -> Self {
        let mut set = Self::new();
        for r in iter {
            set.add(r);
        }
        set
    }
}

impl<'a> IntoIterator for &'a RefSet {
    type Item = Ref;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Iterator over live `(slot, ref)` pairs.
pub(crate) struct Entries<'a> {
    slots: std::iter::Enumerate<std::slice::Iter<'a, Slot>>,
}

impl Iterator for Entries<'_> {
    type Item = (usize, Ref);

    fn next(&mut self) -> Option<Self::Item> {
        self.slots
            .by_ref()
            .find(|(_, s)| s.item != 0)
            .map(|(slot, s)| (slot, s.item))
    }
}

/// Iterator over the references of a [`RefSet`] in slot order.
pub struct Iter<'a> {
    entries: Entries<'a>,
}

impl Iterator for Iter<'_> {
    type Item = Ref;

    fn next(&mut self) -> Option<Ref> {
        self.entries.next().map(|(_, r)| r)
    }
}

/// Every insertion path grows before inserting, so a full container at the
/// maximum mask is an internal consistency fault.
#[cold]
pub(crate) fn capacity_exhausted(len: usize) -> ! {
    error!(len, max_slots = MAX_MASK as u64 + 1, "reference container capacity exhausted");
    panic!("reference container capacity exhausted at {len} entries");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty() {
        let set = RefSet::new();
        assert!(set.is_empty());
        assert_eq!(set.capacity(), 2);
        assert_eq!(set.first(), None);
        assert_eq!(set.locate(1), None);
    }

    #[test]
    fn test_zero_is_never_stored() {
        let mut set = RefSet::new();
        assert_eq!(set.insert(0), None);
        assert!(!set.add(0));
        assert_eq!(set.remove(0), None);
        assert_eq!(set.locate(0), None);
        assert!(set.is_empty());
    }

    #[test]
    fn test_insert_returns_existing_slot() {
        let mut set = RefSet::new();
        let slot = set.insert(7).unwrap();
        assert_eq!(set.insert(7), Some(slot));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(slot), 7);
    }

    #[test]
    fn test_insert_fails_when_full() {
        let mut set = RefSet::new();
        assert!(set.insert(1).is_some());
        assert!(set.insert(2).is_some());
        assert_eq!(set.insert(3), None);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_collisions_chain() {
        let mut set = RefSet::new();
        // 1, 5 and 9 share bucket 1 at mask 3
        assert!(set.add(1));
        assert!(set.add(5));
        assert!(set.add(9));
        assert_eq!(set.capacity(), 4);
        assert!(set.contains(1) && set.contains(5) && set.contains(9));
        assert!(set.remove(5).is_some());
        assert!(set.contains(1));
        assert!(!set.contains(5));
        assert!(set.contains(9));
    }

    #[test]
    fn test_remove_chain_head_and_tail() {
        let mut set: RefSet = [2, 4, 6, 8].into_iter().collect();
        assert!(set.remove(8).is_some());
        assert!(set.remove(2).is_some());
        assert_eq!(set.remove(2), None);
        let mut left = set.to_vec();
        left.sort();
        assert_eq!(left, vec![4, 6]);
    }

    #[test]
    fn test_removed_slot_is_reused() {
        let mut set = RefSet::new();
        let a = set.insert(10).unwrap();
        set.insert(11).unwrap();
        assert_eq!(set.remove(10), Some(a));
        assert_eq!(set.insert(12), Some(a));
    }

    #[test]
    fn test_grow_only_when_full() {
        let mut set = RefSet::new();
        set.insert(1);
        assert!(!set.grow());
        set.insert(2);
        assert!(set.grow());
        assert_eq!(set.capacity(), 4);
        assert!(set.contains(1) && set.contains(2));
    }

    #[test]
    fn test_pack_halves_when_sparse() {
        let mut set: RefSet = (1..=16).collect();
        assert_eq!(set.capacity(), 16);
        for r in 2..=16 {
            set.remove(r);
        }
        assert!(set.pack());
        assert_eq!(set.capacity(), 8);
        while set.pack() {}
        assert_eq!(set.capacity(), 2);
        assert_eq!(set.to_vec(), vec![1]);
    }

    #[test]
    fn test_pack_keeps_needed_capacity() {
        let mut set: RefSet = (1..=4).collect();
        assert_eq!(set.capacity(), 4);
        assert!(!set.pack());
    }

    #[test]
    fn test_grow_pack_round_trip() {
        let mut set = RefSet::new();
        for r in 1..=1000 {
            assert!(set.add(r * 7919));
        }
        assert_eq!(set.len(), 1000);
        for r in 1..=1000 {
            if r != 500 {
                assert!(set.remove(r * 7919).is_some());
                set.pack();
            }
        }
        assert_eq!(set.len(), 1);
        assert!(set.contains(500 * 7919));
        assert_eq!(set.first(), Some(500 * 7919));
        for r in 1..=1000 {
            assert_eq!(set.contains(r * 7919), r == 500);
        }
    }

    #[test]
    fn test_negative_refs() {
        let set: RefSet = [-1, -2, i32::MIN, i32::MAX].into_iter().collect();
        assert_eq!(set.len(), 4);
        assert!(set.contains(-1));
        assert!(set.contains(i32::MIN));
        assert!(set.contains(i32::MAX));
    }

    #[test]
    fn test_pair() {
        let set = RefSet::pair(3, 4);
        assert_eq!(set.len(), 2);
        assert!(set.contains(3) && set.contains(4));
        assert_eq!(RefSet::pair(5, 5).len(), 1);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut a: RefSet = [1, 2, 3].into_iter().collect();
        let b = a.clone();
        a.remove(2);
        a.add(9);
        assert!(b.contains(2));
        assert!(!b.contains(9));
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn test_equality_ignores_capacity() {
        let mut a: RefSet = (1..=8).collect();
        for r in 3..=8 {
            a.remove(r);
        }
        let b = RefSet::pair(2, 1);
        assert_ne!(a.capacity(), b.capacity());
        assert_eq!(a, b);
    }
}
