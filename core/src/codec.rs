//! Flat integer encoding of a [`TripleIndex`].
//!
//! ```text
//! [root_ref] [next_ref] [source_count]
//! repeat source_count:
//!   [source] [pair_count] [set_count]
//!   repeat pair_count: [relation] [target]
//!   repeat set_count:  [relation] [target_count] [target]*target_count
//! ```
//!
//! `root_ref`/`next_ref` are left out when persisting a bare edge set. A
//! relation with one target goes into the pair section, one with two or more
//! into the set section. There is no version field.

use tracing::{debug, warn};

use crate::error::{FormatError, Result};
use crate::index::{Peers, TripleIndex};
use crate::Ref;

/// Encode edges and scalars.
pub fn persist_state(index: &TripleIndex) -> Vec<i32> {
    persist(index, true)
}

/// Encode edges only.
pub fn persist_edges(index: &TripleIndex) -> Vec<i32> {
    persist(index, false)
}

pub fn persist(index: &TripleIndex, include_scalars: bool) -> Vec<i32> {
    let mut out = Vec::with_capacity(3 + index.source_count() * 3 + index.edge_count() * 2);
    if include_scalars {
        out.push(index.root_ref());
        out.push(index.next_ref());
    }
    let count_at = out.len();
    out.push(0);

    let mut source_count = 0;
    for (source, relations) in index.source_entries() {
        let head = out.len();
        out.extend([source, 0, 0]);

        let mut pair_count = 0;
        for (relation, peers) in relations.iter() {
            if let (1, Some(target)) = (peers.len(), peers.first()) {
                out.extend([relation, target]);
                pair_count += 1;
            }
        }

        let mut set_count = 0;
        for (relation, peers) in relations.iter() {
            if let Peers::Many(set) = peers {
                if set.len() > 1 {
                    out.extend([relation, set.len() as i32]);
                    out.extend(set.iter());
                    set_count += 1;
                }
            }
        }

        if pair_count + set_count == 0 {
            out.truncate(head);
            continue;
        }
        out[head + 1] = pair_count;
        out[head + 2] = set_count;
        source_count += 1;
    }
    out[count_at] = source_count;
    out
}

/// Decode an array written by [`persist_state`].
pub fn restore_state(data: &[i32]) -> Result<TripleIndex> {
    restore(data, true)
}

/// Decode an array written by [`persist_edges`]. Scalars are left at 0.
pub fn restore_edges(data: &[i32]) -> Result<TripleIndex> {
    restore(data, false)
}

/// Rebuild an index by replaying every encoded edge through
/// [`TripleIndex::put`]. Nothing is returned unless the whole array is valid,
/// including its layout: one block per source, each relation once per block,
/// and sets of at least two distinct targets.
pub fn restore(data: &[i32], include_scalars: bool) -> Result<TripleIndex> {
    let restored = read_index(data, include_scalars);
    match &restored {
        Ok(index) => debug!(values = data.len(), edges = index.edge_count(), "restored edge array"),
        Err(err) => warn!(%err, values = data.len(), "rejected edge array"),
    }
    restored
}

fn read_index(data: &[i32], include_scalars: bool) -> Result<TripleIndex> {
    let mut reader = Reader { data, offset: 0 };
    let mut index = TripleIndex::new();
    if include_scalars {
        index.set_root_ref(reader.value()?);
        index.set_next_ref(reader.value()?);
    }
    let source_count = reader.count()?;
    for _ in 0..source_count {
        let block = reader.offset;
        let source = reader.reference()?;
        if index.is_source(source) {
            return Err(FormatError::DuplicateSource {
                offset: block,
                source_ref: source,
            });
        }
        let pair_count = reader.count()?;
        let set_count = reader.count()?;
        if pair_count == 0 && set_count == 0 {
            return Err(FormatError::EmptySource { offset: block });
        }
        reader.expect(pair_count.saturating_mul(2))?;
        for _ in 0..pair_count {
            let relation = read_relation(&mut reader, &index, source)?;
            let target = reader.reference()?;
            index.put(source, relation, target);
        }
        for _ in 0..set_count {
            let relation = read_relation(&mut reader, &index, source)?;
            let offset = reader.offset;
            let target_count = reader.count()?;
            if target_count < 2 {
                return Err(FormatError::SmallSet {
                    offset,
                    count: target_count,
                });
            }
            reader.expect(target_count)?;
            for _ in 0..target_count {
                let offset = reader.offset;
                let target = reader.reference()?;
                if !index.put(source, relation, target) {
                    return Err(FormatError::DuplicateTarget { offset, target });
                }
            }
        }
    }
    reader.finish()?;
    Ok(index)
}

/// Each relation appears once per source block, in either section.
fn read_relation(reader: &mut Reader<'_>, index: &TripleIndex, source: Ref) -> Result<Ref> {
    let offset = reader.offset;
    let relation = reader.reference()?;
    if index.is_source_relation(source, relation) {
        return Err(FormatError::DuplicateRelation { offset, relation });
    }
    Ok(relation)
}

struct Reader<'a> {
    data: &'a [i32],
    offset: usize,
}

impl Reader<'_> {
    fn value(&mut self) -> Result<i32> {
        let value = *self.data.get(self.offset).ok_or(FormatError::Truncated {
            offset: self.offset,
            len: self.data.len(),
        })?;
        self.offset += 1;
        Ok(value)
    }

    fn count(&mut self) -> Result<usize> {
        let offset = self.offset;
        let value = self.value()?;
        usize::try_from(value).map_err(|_| FormatError::NegativeCount { offset, value })
    }

    fn reference(&mut self) -> Result<Ref> {
        let offset = self.offset;
        match self.value()? {
            0 => Err(FormatError::ZeroRef { offset }),
            r => Ok(r),
        }
    }

    /// Fail early if fewer than `n` values remain.
    fn expect(&self, n: usize) -> Result<()> {
        let remaining = self.data.len() - self.offset;
        if n > remaining {
            return Err(FormatError::Truncated {
                offset: self.offset + remaining,
                len: self.data.len(),
            });
        }
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        let len = self.data.len() - self.offset;
        if len != 0 {
            return Err(FormatError::TrailingData {
                offset: self.offset,
                len,
            });
        }
        Ok(())
    }
}
