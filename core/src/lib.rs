//! ber-graph-core: bidirectional entity-relation edge store.
//!
//! A pure Rust library holding labeled directed edges (source, relation,
//! target), each field a nonzero 32-bit reference. Edges are indexed from
//! both ends so that targets of a source+relation and sources of a
//! target+relation are each a few hash hops away. No I/O: the codec
//! produces and consumes flat `i32` arrays, and writing them anywhere is up
//! to the caller.
//!
//! [`Store`] wraps a [`TripleIndex`] with commit/rollback. Snapshots share
//! every node they have not diverged on, so opening a transaction is O(1)
//! and each write copies only the path it touches.

mod config;
mod error;
mod index;
mod refmap;
mod refset;
mod store;
mod update;

pub mod codec;

/// Entity or relation reference. 0 means "absent" and is never stored.
pub type Ref = i32;

pub use config::StoreConfig;
pub use error::{FormatError, Result};
pub use index::{Edge, EdgeIter, PeerIter, Peers, RelationMap, TripleIndex};
pub use refmap::RefMap;
pub use refset::{RefSet, MAX_MASK, MIN_MASK};
pub use store::Store;
pub use update::Update;
