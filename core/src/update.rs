use std::fmt;
use std::sync::OnceLock;

use crate::index::TripleIndex;

/// Outcome of a commit or rollback: the state before and after, plus the
/// edges that appeared and disappeared between them.
///
/// Both diffs are computed on first access and cached.
pub struct Update {
    old: TripleIndex,
    new: TripleIndex,
    put_edges: OnceLock<TripleIndex>,
    pop_edges: OnceLock<TripleIndex>,
}

impl Update {
    pub(crate) fn new(old: TripleIndex, new: TripleIndex) -> Self {
        Self {
            old,
            new,
            put_edges: OnceLock::new(),
            pop_edges: OnceLock::new(),
        }
    }

    pub fn old_state(&self) -> &TripleIndex {
        &self.old
    }

    pub fn new_state(&self) -> &TripleIndex {
        &self.new
    }

    /// Edges in the new state but not in the old one.
    pub fn put_edges(&self) -> &TripleIndex {
        self.put_edges.get_or_init(|| self.new.difference(&self.old))
    }

    /// Edges in the old state but not in the new one.
    pub fn pop_edges(&self) -> &TripleIndex {
        self.pop_edges.get_or_init(|| self.old.difference(&self.new))
    }

    /// True if neither the edges nor the scalars changed.
    pub fn is_unchanged(&self) -> bool {
        self.old == self.new
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update")
            .field("old", &self.old)
            .field("new", &self.new)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Edge;

    #[test]
    fn test_diff_is_cached() {
        let old: TripleIndex = [Edge::new(1, 2, 3)].into_iter().collect();
        let new: TripleIndex = [Edge::new(1, 2, 4)].into_iter().collect();
        let update = Update::new(old, new);
        let first = update.put_edges() as *const TripleIndex;
        let second = update.put_edges() as *const TripleIndex;
        assert_eq!(first, second);
        assert!(update.put_edges().contains(1, 2, 4));
        assert!(update.pop_edges().contains(1, 2, 3));
        assert!(!update.is_unchanged());
    }

    #[test]
    fn test_identical_states() {
        let state: TripleIndex = [Edge::new(1, 2, 3)].into_iter().collect();
        let update = Update::new(state.clone(), state);
        assert!(update.is_unchanged());
        assert!(update.put_edges().is_empty());
        assert!(update.pop_edges().is_empty());
    }

    #[test]
    fn test_scalar_only_change() {
        let old = TripleIndex::new();
        let mut new = old.clone();
        new.set_root_ref(4);
        let update = Update::new(old, new);
        assert!(!update.is_unchanged());
        assert!(update.put_edges().is_empty());
    }
}
