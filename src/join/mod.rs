//! Join index planning.
//!
//! Joins never copy data here. They record index nodes (`OptUsize` position
//! columns) that frame operations feed to unchecked takes.

mod align;

pub use align::{align_frames, align_frames_outer, get_align_frames_idx, AlignOptions, AlignedIndex};

use tracing::debug;

use crate::error::{Result, SheafError};
use crate::expr::{output, Column, IndexNode, Node};

fn check_keys(left: &[Column], right: &[Column]) -> Result<()> {
    if left.is_empty() {
        return Err(SheafError::invalid("join needs at least one key column"));
    }
    if left.len() != right.len() {
        return Err(SheafError::invalid(format!(
            "join key count mismatch: {} left, {} right",
            left.len(),
            right.len()
        )));
    }
    Ok(())
}

/// For each left row, the matching right row or null.
///
/// Successive left rows sharing a key consume the right group from its last
/// row backwards; once one row is left it is reused.
pub fn left_join_idx(left_keys: &[Column], right_keys: &[Column]) -> Result<Column> {
    check_keys(left_keys, right_keys)?;
    debug!(keys = left_keys.len(), "planning left join");
    Ok(Column::from_node(Node::Index(IndexNode::LeftJoin {
        left: left_keys.to_vec(),
        right: right_keys.to_vec(),
    })))
}

/// Lazy outer-join index.
#[derive(Debug, Clone)]
pub struct OuterJoinIndex {
    /// Merged keys, named after the left keys.
    pub keys: Vec<Column>,
    /// Left row per output row, null where the key is right-only.
    pub left_idx: Column,
    /// Right row per output row, null where the key is left-only.
    pub right_idx: Column,
}

/// Union of keys in first-appearance order (left, then new right keys), or
/// sorted when `sort` is set. Duplicate left keys keep their first row,
/// duplicate right keys their last.
pub fn outer_join_idx(
    left_keys: &[Column],
    right_keys: &[Column],
    sort: bool,
    rev: bool,
) -> Result<OuterJoinIndex> {
    check_keys(left_keys, right_keys)?;
    debug!(keys = left_keys.len(), sort, rev, "planning outer join");
    let joined = Column::from_node(Node::Index(IndexNode::OuterJoin {
        left: left_keys.to_vec(),
        right: right_keys.to_vec(),
        sort,
        rev,
    }));
    let n = left_keys.len();
    let keys = left_keys
        .iter()
        .enumerate()
        .map(|(slot, key)| output(&joined, slot).with_name(key.name().map(str::to_owned)))
        .collect();
    Ok(OuterJoinIndex {
        keys,
        left_idx: output(&joined, n),
        right_idx: output(&joined, n + 1),
    })
}
