use std::fmt;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::refmap::{self, RefMap};
use crate::refset::{self, RefSet};
use crate::Ref;

/// A labeled directed edge. All three fields are nonzero in a stored edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub source: Ref,
    pub relation: Ref,
    pub target: Ref,
}

impl Edge {
    pub fn new(source: Ref, relation: Ref, target: Ref) -> Self {
        Self {
            source,
            relation,
            target,
        }
    }

    /// True if no field is 0.
    pub fn is_valid(&self) -> bool {
        self.source != 0 && self.relation != 0 && self.target != 0
    }
}

impl From<(Ref, Ref, Ref)> for Edge {
    fn from((source, relation, target): (Ref, Ref, Ref)) -> Self {
        Self::new(source, relation, target)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.source, self.relation, self.target)
    }
}

/// Entities on the far side of one (entity, relation) pair.
///
/// A single peer is stored inline; two or more share a [`RefSet`]. A set
/// never holds fewer than two refs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peers {
    One(Ref),
    Many(Arc<RefSet>),
}

impl Peers {
    pub fn len(&self) -> usize {
        match self {
            Peers::One(_) => 1,
            Peers::Many(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, peer: Ref) -> bool {
        match self {
            Peers::One(r) => peer != 0 && *r == peer,
            Peers::Many(set) => set.contains(peer),
        }
    }

    /// Any one peer.
    pub fn first(&self) -> Option<Ref> {
        match self {
            Peers::One(r) => Some(*r),
            Peers::Many(set) => set.first(),
        }
    }

    pub fn iter(&self) -> PeerIter<'_> {
        match self {
            Peers::One(r) => PeerIter::One(Some(*r)),
            Peers::Many(set) => PeerIter::Many(set.iter()),
        }
    }

    pub fn to_vec(&self) -> Vec<Ref> {
        self.iter().collect()
    }

    /// True if both values are the same node, so neither holds a peer the
    /// other lacks.
    fn shares(&self, other: &Peers) -> bool {
        match (self, other) {
            (Peers::One(a), Peers::One(b)) => a == b,
            (Peers::Many(a), Peers::Many(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Returns true if `peer` was added. A single peer becomes a two-element set.
    fn add(&mut self, peer: Ref) -> bool {
        match self {
            Peers::One(existing) if *existing == peer => false,
            Peers::One(existing) => {
                let existing = *existing;
                *self = Peers::Many(Arc::new(RefSet::pair(peer, existing)));
                true
            }
            Peers::Many(set) => Arc::make_mut(set).add(peer),
        }
    }

    fn remove(&mut self, peer: Ref, shrink: bool) -> Removed {
        let collapse = match self {
            Peers::One(existing) => {
                return if *existing == peer {
                    Removed::Emptied
                } else {
                    Removed::Absent
                };
            }
            Peers::Many(set) => {
                if !set.contains(peer) {
                    return Removed::Absent;
                }
                let set = Arc::make_mut(set);
                set.remove(peer);
                if set.len() > 1 {
                    if shrink {
                        set.pack();
                    }
                    None
                } else {
                    set.first()
                }
            }
        };
        if let Some(last) = collapse {
            *self = Peers::One(last);
        }
        Removed::Kept
    }
}

enum Removed {
    Absent,
    Kept,
    Emptied,
}

/// Iterator over the refs of a [`Peers`] value.
pub enum PeerIter<'a> {
    One(Option<Ref>),
    Many(refset::Iter<'a>),
}

impl Iterator for PeerIter<'_> {
    type Item = Ref;

    fn next(&mut self) -> Option<Ref> {
        match self {
            PeerIter::One(r) => r.take(),
            PeerIter::Many(iter) => iter.next(),
        }
    }
}

/// relation -> peers of one entity.
pub type RelationMap = RefMap<Peers>;

/// entity -> relation map. Relation maps are shared between snapshots until
/// one side writes to them.
type EntityMap = RefMap<Arc<RelationMap>>;

/// Bidirectional (source, relation, target) index.
///
/// `source_map` answers "targets of source+relation", `target_map` answers
/// "sources of target+relation". Every edge is reachable from both or
/// neither, and empty relation or entity entries are pruned on removal.
///
/// Cloning is O(1): both maps are reference counted down to the target sets,
/// and every write path forks a node with `Arc::make_mut` only while another
/// clone still holds it.
#[derive(Clone)]
pub struct TripleIndex {
    pub(crate) root_ref: Ref,
    pub(crate) next_ref: Ref,
    source_map: Arc<EntityMap>,
    target_map: Arc<EntityMap>,
    shrink_on_remove: bool,
}

impl TripleIndex {
    pub fn new() -> Self {
        Self {
            root_ref: 0,
            next_ref: 0,
            source_map: Arc::default(),
            target_map: Arc::default(),
            shrink_on_remove: true,
        }
    }

    pub fn with_config(config: &StoreConfig) -> Self {
        Self {
            next_ref: config.first_ref,
            shrink_on_remove: config.shrink_on_remove,
            ..Self::new()
        }
    }

    pub fn root_ref(&self) -> Ref {
        self.root_ref
    }

    pub fn next_ref(&self) -> Ref {
        self.next_ref
    }

    pub fn set_root_ref(&mut self, root_ref: Ref) {
        self.root_ref = root_ref;
    }

    pub fn set_next_ref(&mut self, next_ref: Ref) {
        self.next_ref = next_ref;
    }

    // ---------------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------------

    /// Insert an edge. False if any field is 0 or the edge already exists.
    pub fn put(&mut self, source: Ref, relation: Ref, target: Ref) -> bool {
        // Probe first so a no-op never forks shared nodes.
        if self.contains(source, relation, target) || !Edge::new(source, relation, target).is_valid() {
            return false;
        }
        link(&mut self.source_map, source, relation, target);
        link(&mut self.target_map, target, relation, source);
        true
    }

    /// Remove an edge. False if any field is 0 or the edge is absent.
    pub fn pop(&mut self, source: Ref, relation: Ref, target: Ref) -> bool {
        if !self.contains(source, relation, target) {
            return false;
        }
        let shrink = self.shrink_on_remove;
        let popped = unlink(&mut self.source_map, source, relation, target, shrink);
        let mirrored = unlink(&mut self.target_map, target, relation, source, shrink);
        debug_assert!(popped && mirrored, "source and target maps disagree on {source} {relation} {target}");
        popped
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

    /// Drop every edge. Scalars are kept.
    pub fn clear(&mut self) {
        self.source_map = Arc::default();
        self.target_map = Arc::default();
    }

    // ---------------------------------------------------------------------
    // Source side
    // ---------------------------------------------------------------------

    /// Entities that occur as source of at least one edge.
    pub fn sources(&self) -> Vec<Ref> {
        self.source_map.keys().collect()
    }

    pub fn source_count(&self) -> usize {
        self.source_map.len()
    }

    /// Relations leaving `source`.
    pub fn source_relations(&self, source: Ref) -> Vec<Ref> {
        relations(&self.source_map, source).map_or_else(Vec::new, |rm| rm.keys().collect())
    }

    pub fn source_relation_count(&self, source: Ref) -> usize {
        relations(&self.source_map, source).map_or(0, RefMap::len)
    }

    /// One target of `source` via `relation`.
    pub fn target_ref(&self, source: Ref, relation: Ref) -> Option<Ref> {
        peers(&self.source_map, source, relation).and_then(Peers::first)
    }

    /// All targets of `source` via `relation`.
    pub fn target_refs(&self, source: Ref, relation: Ref) -> Vec<Ref> {
        peers(&self.source_map, source, relation).map_or_else(Vec::new, Peers::to_vec)
    }

    pub fn target_ref_count(&self, source: Ref, relation: Ref) -> usize {
        peers(&self.source_map, source, relation).map_or(0, Peers::len)
    }

    pub fn source_peers(&self, source: Ref, relation: Ref) -> Option<&Peers> {
        peers(&self.source_map, source, relation)
    }

    pub fn is_source(&self, source: Ref) -> bool {
        self.source_map.contains_key(source)
    }

    pub fn is_source_relation(&self, source: Ref, relation: Ref) -> bool {
        relations(&self.source_map, source).is_some_and(|rm| rm.contains_key(relation))
    }

    pub fn contains(&self, source: Ref, relation: Ref, target: Ref) -> bool {
        peers(&self.source_map, source, relation).is_some_and(|p| p.contains(target))
    }

    // ---------------------------------------------------------------------
    // Target side
    // ---------------------------------------------------------------------

    /// Entities that occur as target of at least one edge.
    pub fn targets(&self) -> Vec<Ref> {
        self.target_map.keys().collect()
    }

    pub fn target_count(&self) -> usize {
        self.target_map.len()
    }

    /// Relations arriving at `target`.
    pub fn target_relations(&self, target: Ref) -> Vec<Ref> {
        relations(&self.target_map, target).map_or_else(Vec::new, |rm| rm.keys().collect())
    }

    pub fn target_relation_count(&self, target: Ref) -> usize {
        relations(&self.target_map, target).map_or(0, RefMap::len)
    }

    /// One source reaching `target` via `relation`.
    pub fn source_ref(&self, target: Ref, relation: Ref) -> Option<Ref> {
        peers(&self.target_map, target, relation).and_then(Peers::first)
    }

    /// All sources reaching `target` via `relation`.
    pub fn source_refs(&self, target: Ref, relation: Ref) -> Vec<Ref> {
        peers(&self.target_map, target, relation).map_or_else(Vec::new, Peers::to_vec)
    }

    pub fn source_ref_count(&self, target: Ref, relation: Ref) -> usize {
        peers(&self.target_map, target, relation).map_or(0, Peers::len)
    }

    pub fn target_peers(&self, target: Ref, relation: Ref) -> Option<&Peers> {
        peers(&self.target_map, target, relation)
    }

    pub fn is_target(&self, target: Ref) -> bool {
        self.target_map.contains_key(target)
    }

    pub fn is_target_relation(&self, target: Ref, relation: Ref) -> bool {
        relations(&self.target_map, target).is_some_and(|rm| rm.contains_key(relation))
    }

    pub fn is_target_relation_source(&self, target: Ref, relation: Ref, source: Ref) -> bool {
        peers(&self.target_map, target, relation).is_some_and(|p| p.contains(source))
    }

    // ---------------------------------------------------------------------
    // Whole-index views
    // ---------------------------------------------------------------------

    pub fn is_empty(&self) -> bool {
        self.source_map.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.source_map
            .iter()
            .map(|(_, rm)| rm.iter().map(|(_, p)| p.len()).sum::<usize>())
            .sum()
    }

    /// Lazily walk every edge, source by source, relation by relation.
    pub fn iter(&self) -> EdgeIter<'_> {
        EdgeIter {
            sources: self.source_map.iter(),
            source: 0,
            relations: None,
            relation: 0,
            peers: None,
        }
    }

    pub(crate) fn source_entries(&self) -> refmap::Iter<'_, Arc<RelationMap>> {
        self.source_map.iter()
    }

    /// Edges of `self` that `other` lacks.
    ///
    /// Relation maps and target sets that both indices still share are
    /// skipped without descending into them.
    pub fn difference(&self, other: &TripleIndex) -> TripleIndex {
        let mut result = TripleIndex::new();
        for (source, relations) in self.source_map.iter() {
            let theirs = other.source_map.get(source);
            if theirs.is_some_and(|t| Arc::ptr_eq(relations, t)) {
                continue;
            }
            for (relation, peers) in relations.iter() {
                let their_peers = theirs.and_then(|t| t.get(relation));
                if their_peers.is_some_and(|p| p.shares(peers)) {
                    continue;
                }
                for target in peers.iter() {
                    if !their_peers.is_some_and(|p| p.contains(target)) {
                        result.put(source, relation, target);
                    }
                }
            }
        }
        result
    }

    /// True if both indices hold the same edges, whatever their scalars.
    pub fn same_edges(&self, other: &TripleIndex) -> bool {
        Arc::ptr_eq(&self.source_map, &other.source_map) || *self.source_map == *other.source_map
    }
}

/// Value of `entity` in `map`: its relation map.
fn relations(map: &EntityMap, entity: Ref) -> Option<&RelationMap> {
    map.get(entity).map(Arc::as_ref)
}

fn peers(map: &EntityMap, entity: Ref, relation: Ref) -> Option<&Peers> {
    relations(map, entity)?.get(relation)
}

/// Record `entity -relation-> peer` in one direction, forking shared nodes
/// along the path.
fn link(map: &mut Arc<EntityMap>, entity: Ref, relation: Ref, peer: Ref) {
    let Some(relations) = Arc::make_mut(map).get_or_insert_with(entity, Arc::default) else {
        return;
    };
    let relations = Arc::make_mut(relations);
    match relations.get_mut(relation) {
        Some(peers) => {
            peers.add(peer);
        }
        None => {
            relations.insert(relation, Peers::One(peer));
        }
    }
}

/// Remove `entity -relation-> peer` in one direction, pruning emptied
/// relation and entity entries.
fn unlink(map: &mut Arc<EntityMap>, entity: Ref, relation: Ref, peer: Ref, shrink: bool) -> bool {
    let entities = Arc::make_mut(map);
    let Some(relations) = entities.get_mut(entity) else {
        return false;
    };
    let relations = Arc::make_mut(relations);
    let Some(peers) = relations.get_mut(relation) else {
        return false;
    };
    match peers.remove(peer, shrink) {
        Removed::Absent => return false,
        Removed::Kept => {}
        Removed::Emptied => {
            relations.remove(relation);
        }
    }
    if relations.is_empty() {
        entities.remove(entity);
        if shrink {
            entities.pack();
        }
    } else if shrink {
        relations.pack();
    }
    true
}

impl Default for TripleIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TripleIndex {
    fn eq(&self, other: &Self) -> bool {
        self.root_ref == other.root_ref && self.next_ref == other.next_ref && self.same_edges(other)
    }
}

impl Eq for TripleIndex {}

impl fmt::Debug for TripleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TripleIndex")
            .field("root_ref", &self.root_ref)
            .field("next_ref", &self.next_ref)
            .field("edges", &self.edge_count())
            .finish()
    }
}

impl fmt::Display for TripleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        for (i, edge) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{edge}")?;
        }
        f.write_str(" }")
    }
}

impl FromIterator<Edge> for TripleIndex {
    fn from_iter<I: IntoIterator<Item = Edge>>(iter: I) -> Self {
        let mut index = Self::new();
        index.put_all(iter);
        index
    }
}

impl<'a> IntoIterator for &'a TripleIndex {
    type Item = Edge;
    type IntoIter = EdgeIter<'a>;

    fn into_iter(self) -> EdgeIter<'a> {
        self.iter()
    }
}

/// Nested source -> relation -> target walk over a [`TripleIndex`].
pub struct EdgeIter<'a> {
    sources: refmap::Iter<'a, Arc<RelationMap>>,
    source: Ref,
    relations: Option<refmap::Iter<'a, Peers>>,
    relation: Ref,
    peers: Option<PeerIter<'a>>,
}

impl Iterator for EdgeIter<'_> {
    type Item = Edge;

    fn next(&mut self) -> Option<Edge> {
        loop {
            if let Some(target) = self.peers.as_mut().and_then(Iterator::next) {
                return Some(Edge::new(self.source, self.relation, target));
            }
            if let Some((relation, peers)) = self.relations.as_mut().and_then(Iterator::next) {
                self.relation = relation;
                self.peers = Some(peers.iter());
                continue;
            }
            let (source, relations) = self.sources.next()?;
            self.source = source;
            self.relations = Some(relations.iter());
            self.peers = None;
        }
    }
}
