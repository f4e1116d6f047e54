//! N-way alignment of frames on common key columns.

use regex::Regex;
use std::sync::Arc;
use tracing::{debug, trace};

use super::outer_join_idx;
use crate::error::{Result, SheafError};
use crate::expr::{Column, IndexNode, Node};
use crate::frame::{ColumnKey, Frame, JoinHow, JoinOptions, Renames};

/// Options of [`align_frames`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignOptions {
    /// Sort the key union once all frames are joined.
    pub sort: bool,
    /// Descending union order.
    pub rev: bool,
    /// Keep the key columns in every aligned frame.
    pub with_by: bool,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            sort: true,
            rev: false,
            with_by: true,
        }
    }
}

fn collect_keys<K, I>(by: I) -> Result<Vec<ColumnKey>>
where
    K: Into<ColumnKey>,
    I: IntoIterator<Item = K>,
{
    let keys: Vec<ColumnKey> = by.into_iter().map(Into::into).collect();
    if keys.is_empty() {
        return Err(SheafError::invalid("alignment needs at least one key column"));
    }
    Ok(keys)
}

fn key_names(frame: &Frame, by: &[ColumnKey]) -> Result<Vec<String>> {
    by.iter()
        .map(|key| {
            frame
                .column(key.clone())?
                .name()
                .map(str::to_owned)
                .ok_or_else(|| SheafError::invalid(format!("key {key} has no name")))
        })
        .collect()
}

fn accumulate(frames: &[Frame], by: &[ColumnKey], opts: AlignOptions) -> Result<(Frame, Vec<String>)> {
    let first = frames
        .first()
        .ok_or_else(|| SheafError::invalid("alignment needs at least one frame"))?;
    let suffix = first.session().config().align.suffix.clone();
    let keys = key_names(first, by)?;
    let mut acc: Option<Frame> = None;
    for (i, frame) in frames.iter().enumerate() {
        let frame_keys = key_names(frame, by)?;
        let renamed: Vec<String> = frame
            .names()
            .into_iter()
            .map(|name| {
                if frame_keys.iter().any(|k| k == name) {
                    name.to_owned()
                } else {
                    format!("{name}{suffix}{i}")
                }
            })
            .collect();
        let tagged = frame.rename(Renames::List(renamed))?;
        acc = Some(match acc {
            None => tagged,
            Some(acc) => acc.join(
                &tagged,
                JoinOptions::left_right(keys.clone(), frame_keys)
                    .how(JoinHow::Outer)
                    .sort(false)
                    .rev(opts.rev),
            )?,
        });
        trace!(frame = i, "aligned frame into accumulator");
    }
    let acc = acc.ok_or_else(|| SheafError::invalid("alignment needs at least one frame"))?;
    let acc = if opts.sort {
        acc.sort(keys.clone(), opts.rev)?
    } else {
        acc
    };
    Ok((acc, keys))
}

/// Outer-joins every frame on `by` into one frame whose non-key columns carry
/// the alignment suffix and the frame position.
pub fn align_frames_outer<K, I>(frames: &[Frame], by: I, opts: AlignOptions) -> Result<Frame>
where
    K: Into<ColumnKey>,
    I: IntoIterator<Item = K>,
{
    let by = collect_keys(by)?;
    debug!(frames = frames.len(), keys = by.len(), "aligning frames");
    Ok(accumulate(frames, &by, opts)?.0)
}

/// Aligns `frames` on the union of their `by` keys; every output frame has
/// one row per union key, nulls where the frame lacks the key.
pub fn align_frames<K, I>(frames: &[Frame], by: I, opts: AlignOptions) -> Result<Vec<Frame>>
where
    K: Into<ColumnKey>,
    I: IntoIterator<Item = K>,
{
    let by = collect_keys(by)?;
    debug!(frames = frames.len(), keys = by.len(), "aligning frames");
    let (acc, keys) = accumulate(frames, &by, opts)?;
    let suffix = acc.session().config().align.suffix.clone();
    let key_columns = acc.get_many(keys.iter())?.into_columns();
    let mut out = Vec::with_capacity(frames.len());
    for i in 0..frames.len() {
        let tag = format!("{suffix}{i}");
        let pattern = Regex::new(&format!("^.*{}$", regex::escape(&tag)))?;
        let mut columns = if opts.with_by {
            key_columns.clone()
        } else {
            Vec::new()
        };
        for column in acc.columns() {
            let Some(name) = column.name() else { continue };
            if pattern.is_match(name) {
                let stripped = &name[..name.len() - tag.len()];
                columns.push(column.alias(stripped));
            }
        }
        out.push(Frame::new(columns, Arc::clone(acc.session()), false));
    }
    Ok(out)
}

/// Merged keys and one index column per input frame, mapping every union row
/// to that frame's row (or null).
#[derive(Debug, Clone)]
pub struct AlignedIndex {
    /// Union keys, named after the first frame's keys.
    pub keys: Vec<Column>,
    /// Per-frame row positions.
    pub idxs: Vec<Column>,
}

/// Index-only alignment: the row selections [`align_frames`] would make,
/// without building any frame.
///
/// Each step outer-joins the running key union with the next frame's keys,
/// re-selects every earlier index through the new `left_idx` (nulls
/// propagate), and appends the new `right_idx`.
pub fn get_align_frames_idx<K, I>(
    frames: &[Frame],
    by: I,
    sort: bool,
    rev: bool,
) -> Result<AlignedIndex>
where
    K: Into<ColumnKey>,
    I: IntoIterator<Item = K>,
{
    let by = collect_keys(by)?;
    let mut frames_iter = frames.iter();
    let first = frames_iter
        .next()
        .ok_or_else(|| SheafError::invalid("alignment needs at least one frame"))?;
    let mut keys = first.get_many(by.iter().cloned())?.into_columns();
    let Some(lead) = keys.first() else {
        return Err(SheafError::invalid("alignment keys selected no columns"));
    };
    let mut idxs = vec![lead.arange()];
    for (step, frame) in frames_iter.enumerate() {
        let right_keys = frame.get_many(by.iter().cloned())?.into_columns();
        let joined = outer_join_idx(&keys, &right_keys, false, rev)?;
        idxs = idxs
            .iter()
            .map(|idx| idx.take_unchecked(&joined.left_idx))
            .collect();
        idxs.push(joined.right_idx);
        keys = joined.keys;
        trace!(step = step + 1, "composed alignment index");
    }
    if sort {
        let order = Column::from_node(Node::Index(IndexNode::Sort {
            keys: keys.clone(),
            rev,
        }));
        keys = keys.iter().map(|k| k.take(&order)).collect();
        idxs = idxs.iter().map(|idx| idx.take_unchecked(&order)).collect();
    }
    Ok(AlignedIndex { keys, idxs })
}
