use std::collections::BTreeSet;

use ber_graph_core::{codec, Edge, Ref, RefSet, Store, TripleIndex};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Operation {
    Put(Ref, Ref, Ref),
    Pop(Ref, Ref, Ref),
    Commit,
    Rollback,
}

/// Small ref ranges so puts and pops collide often.
fn arb_ref() -> impl Strategy<Value = Ref> {
    0..12i32
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        6 => (arb_ref(), 1..4i32, arb_ref()).prop_map(|(s, r, t)| Operation::Put(s, r, t)),
        3 => (arb_ref(), 1..4i32, arb_ref()).prop_map(|(s, r, t)| Operation::Pop(s, r, t)),
        1 => Just(Operation::Commit),
        1 => Just(Operation::Rollback),
    ]
}

type Model = BTreeSet<(Ref, Ref, Ref)>;

fn edges_of(index: &TripleIndex) -> Model {
    index.iter().map(|e| (e.source, e.relation, e.target)).collect()
}

fn assert_symmetric(index: &TripleIndex) -> Result<(), TestCaseError> {
    for e in index.iter() {
        prop_assert!(index.is_target_relation_source(e.target, e.relation, e.source));
        prop_assert!(index.source_refs(e.target, e.relation).contains(&e.source));
    }
    let mut from_targets = Model::new();
    for t in index.targets() {
        for r in index.target_relations(t) {
            for s in index.source_refs(t, r) {
                from_targets.insert((s, r, t));
            }
        }
    }
    prop_assert_eq!(from_targets, edges_of(index));
    Ok(())
}

proptest! {
    #[test]
    fn prop_store_matches_model(ops in prop::collection::vec(arb_operation(), 1..200)) {
        let mut store = Store::new();
        let mut live = Model::new();
        let mut baseline = Model::new();

        for op in ops {
            match op {
                Operation::Put(s, r, t) => {
                    let valid = s != 0 && t != 0;
                    let expected = valid && live.insert((s, r, t));
                    prop_assert_eq!(store.put(s, r, t), expected);
                }
                Operation::Pop(s, r, t) => {
                    let expected = live.remove(&(s, r, t));
                    prop_assert_eq!(store.pop(s, r, t), expected);
                }
                Operation::Commit => {
                    let update = store.commit();
                    let added: Model = live.difference(&baseline).copied().collect();
                    let removed: Model = baseline.difference(&live).copied().collect();
                    prop_assert_eq!(edges_of(update.put_edges()), added);
                    prop_assert_eq!(edges_of(update.pop_edges()), removed);
                    baseline = live.clone();
                }
                Operation::Rollback => {
                    let update = store.rollback();
                    let restored: Model = baseline.difference(&live).copied().collect();
                    let discarded: Model = live.difference(&baseline).copied().collect();
                    prop_assert_eq!(edges_of(update.put_edges()), restored);
                    prop_assert_eq!(edges_of(update.pop_edges()), discarded);
                    live = baseline.clone();
                }
            }
            prop_assert_eq!(edges_of(store.state()), live.clone());
        }
        assert_symmetric(store.state())?;
        prop_assert_eq!(store.state().edge_count(), live.len());
    }

    #[test]
    fn prop_put_is_idempotent(edges in prop::collection::vec((1..50i32, 1..5i32, 1..50i32), 0..100)) {
        let once: TripleIndex = edges.iter().copied().map(Edge::from).collect();
        let mut twice = once.clone();
        prop_assert_eq!(twice.put_all(edges.iter().copied().map(Edge::from)), 0);
        prop_assert_eq!(&twice, &once);
    }

    #[test]
    fn prop_codec_round_trip(
        edges in prop::collection::vec((1..40i32, 1..4i32, 1..40i32), 0..150),
        root_ref in any::<i32>(),
        next_ref in any::<i32>(),
    ) {
        let mut index: TripleIndex = edges.into_iter().map(Edge::from).collect();
        index.set_root_ref(root_ref);
        index.set_next_ref(next_ref);

        let state = codec::restore_state(&codec::persist_state(&index)).unwrap();
        prop_assert_eq!(&state, &index);

        let bare = codec::restore_edges(&codec::persist_edges(&index)).unwrap();
        prop_assert!(bare.same_edges(&index));
        assert_symmetric(&bare)?;
    }

    #[test]
    fn prop_truncated_arrays_are_rejected(
        edges in prop::collection::vec((1..20i32, 1..3i32, 1..20i32), 1..60),
        cut in any::<prop::sample::Index>(),
    ) {
        let index: TripleIndex = edges.into_iter().map(Edge::from).collect();
        let data = codec::persist_state(&index);
        let len = cut.index(data.len());
        prop_assert!(codec::restore_state(&data[..len]).is_err());
    }

    #[test]
    fn prop_refset_keeps_survivor(
        refs in prop::collection::btree_set(any::<i32>().prop_filter("nonzero", |r| *r != 0), 1..300),
        pick in any::<prop::sample::Index>(),
    ) {
        let refs: Vec<Ref> = refs.into_iter().collect();
        let keep = refs[pick.index(refs.len())];
        let mut set = RefSet::new();
        for &r in &refs {
            prop_assert!(set.add(r));
        }
        for &r in &refs {
            if r != keep {
                prop_assert!(set.remove(r).is_some());
                set.pack();
            }
        }
        prop_assert_eq!(set.len(), 1);
        prop_assert_eq!(set.to_vec(), vec![keep]);
        for &r in &refs {
            prop_assert_eq!(set.contains(r), r == keep);
        }
    }
}
