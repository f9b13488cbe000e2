use thiserror::Error;

pub type Result<T> = std::result::Result<T, FormatError>;

/// A persisted edge array that cannot be restored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("truncated edge array: value expected at offset {offset}, array has {len} values")]
    Truncated { offset: usize, len: usize },
    #[error("negative count {value} at offset {offset}")]
    NegativeCount { offset: usize, value: i32 },
    #[error("zero reference at offset {offset}")]
    ZeroRef { offset: usize },
    #[error("source block at offset {offset} has no targets")]
    EmptySource { offset: usize },
    #[error("source {source_ref} at offset {offset} already had a block")]
    DuplicateSource { offset: usize, source_ref: i32 },
    #[error("relation {relation} at offset {offset} repeats within its source block")]
    DuplicateRelation { offset: usize, relation: i32 },
    #[error("target {target} at offset {offset} repeats within its set")]
    DuplicateTarget { offset: usize, target: i32 },
    #[error("target set of {count} at offset {offset}, sets need at least 2 targets")]
    SmallSet { offset: usize, count: usize },
    #[error("{len} trailing values after offset {offset}")]
    TrailingData { offset: usize, len: usize },
}
