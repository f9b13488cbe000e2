use tracing::debug;

use crate::config::StoreConfig;
use crate::index::{Edge, TripleIndex};
use crate::update::Update;
use crate::Ref;

/// Mutable edge store with commit/rollback.
///
/// Clean while `backup` is None. The first mutation that changes anything
/// snapshots the live index into `backup` (an O(1) clone); from then on each
/// write forks only the nodes it touches that are still shared with the
/// backup, at most once per node per transaction. `commit` and `rollback`
/// hand both states out as an [`Update`] and return to Clean.
#[derive(Debug, Clone)]
pub struct Store {
    index: TripleIndex,
    backup: Option<TripleIndex>,
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(&StoreConfig::default())
    }

    pub fn with_config(config: &StoreConfig) -> Self {
        Self {
            index: TripleIndex::with_config(config),
            backup: None,
        }
    }

    /// The live state. Snapshot it with `clone()`.
    pub fn state(&self) -> &TripleIndex {
        &self.index
    }

    /// True while a transaction is open.
    pub fn is_dirty(&self) -> bool {
        self.backup.is_some()
    }

    /// Baseline of the open transaction, if any.
    pub fn backup(&self) -> Option<&TripleIndex> {
        self.backup.as_ref()
    }

    fn begin(&mut self) {
        if self.backup.is_none() {
            debug!(edges = self.index.edge_count(), "opening transaction");
            self.backup = Some(self.index.clone());
        }
    }

    pub fn put(&mut self, source: Ref, relation: Ref, target: Ref) -> bool {
        if self.index.contains(source, relation, target) || !Edge::new(source, relation, target).is_valid() {
            return false;
        }
        self.begin();
        self.index.put(source, relation, target)
    }

    pub fn pop(&mut self, source: Ref, relation: Ref, target: Ref) -> bool {
        if !self.index.contains(source, relation, target) {
            return false;
        }
        self.begin();
        self.index.pop(source, relation, target)
    }

    pub fn put_edge(&mut self, edge: Edge) -> bool {
        self.put(edge.source, edge.relation, edge.target)
    }

    pub fn pop_edge(&mut self, edge: Edge) -> bool {
        self.pop(edge.source, edge.relation, edge.target)
    }

    /// Insert every edge, returning how many were new.
    pub fn put_all<I>(&mut self, edges: I) -> usize
    where
        I: IntoIterator<Item = Edge>,
    {
        edges.into_iter().filter(|&e| self.put_edge(e)).count()
    }

    /// Remove every edge, returning how many were present.
    pub fn pop_all<I>(&mut self, edges: I) -> usize
    where
        I: IntoIterator<Item = Edge>,
    {
        edges.into_iter().filter(|&e| self.pop_edge(e)).count()
    }

    /// Remove every edge. Scalars are kept.
    pub fn clear(&mut self) {
        if self.index.is_empty() {
            return;
        }
        self.begin();
        self.index.clear();
    }

    pub fn root_ref(&self) -> Ref {
        self.index.root_ref()
    }

    pub fn next_ref(&self) -> Ref {
        self.index.next_ref()
    }

    pub fn set_root_ref(&mut self, root_ref: Ref) {
        if self.index.root_ref() != root_ref {
            self.begin();
            self.index.set_root_ref(root_ref);
        }
    }

    pub fn set_next_ref(&mut self, next_ref: Ref) {
        if self.index.next_ref() != next_ref {
            self.begin();
            self.index.set_next_ref(next_ref);
        }
    }

    /// Allocate a reference used neither as source nor as target.
    ///
    /// Starts at `next_ref`, skips 0 and every ref already in use, and leaves
    /// `next_ref` one past the returned value.
    pub fn new_next_ref(&mut self) -> Ref {
        let mut candidate = self.index.next_ref();
        while candidate == 0 || self.index.is_source(candidate) || self.index.is_target(candidate) {
            candidate = candidate.wrapping_add(1);
        }
        self.set_next_ref(candidate.wrapping_add(1));
        debug!(allocated = candidate, "allocated reference");
        candidate
    }

    /// Make the live state the new baseline.
    ///
    /// The update's old state is the previous baseline and its new state the
    /// live one. Without an open transaction both are the live state.
    pub fn commit(&mut self) -> Update {
        let new = self.index.clone();
        let old = match self.backup.take() {
            Some(backup) => backup,
            None => new.clone(),
        };
        debug!(edges = new.edge_count(), "committed transaction");
        Update::new(old, new)
    }

    /// Restore the baseline, discarding every change since the last commit
    /// or rollback.
    ///
    /// The update's old state is the discarded live state and its new state
    /// the restored baseline. Without an open transaction both are the live
    /// state.
    pub fn rollback(&mut self) -> Update {
        let old = self.index.clone();
        let new = match self.backup.take() {
            Some(backup) => backup,
            None => old.clone(),
        };
        self.index = new.clone();
        debug!(edges = new.edge_count(), "rolled back transaction");
        Update::new(old, new)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl From<TripleIndex> for Store {
    /// A clean store whose baseline is `index`.
    fn from(index: TripleIndex) -> Self {
        Self { index, backup: None }
    }
}
