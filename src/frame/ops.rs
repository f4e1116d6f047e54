//! Relational and windowing entry points on [`Frame`].

use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::{ColumnExpr, ColumnKey, Frame};
use crate::engine::{AggMethod, AggOptions, Keep};
use crate::error::{Result, SheafError};
use crate::expr::{Column, IndexNode, Node};
use crate::join::{left_join_idx, outer_join_idx};
use crate::window::{FrameGroupBy, FrameRolling, GroupByOptions, RollingOptions};

/// Join kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinHow {
    /// Every left row, matched right columns or nulls.
    #[default]
    Left,
    /// Every right row; a left join with the sides swapped.
    Right,
    /// Union of keys from both sides.
    Outer,
    /// Recognized, not implemented.
    Inner,
    /// Recognized, not implemented.
    Cross,
}

impl FromStr for JoinHow {
    type Err = SheafError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "left" => Ok(JoinHow::Left),
            "right" => Ok(JoinHow::Right),
            "outer" | "full" => Ok(JoinHow::Outer),
            "inner" => Ok(JoinHow::Inner),
            "cross" => Ok(JoinHow::Cross),
            other => Err(SheafError::invalid(format!("unknown join kind `{other}`"))),
        }
    }
}

impl fmt::Display for JoinHow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinHow::Left => "left",
            JoinHow::Right => "right",
            JoinHow::Outer => "outer",
            JoinHow::Inner => "inner",
            JoinHow::Cross => "cross",
        })
    }
}

/// Options of [`Frame::join`]. Unset `sort` and `simplify` fall back to the
/// session's `[join]` configuration.
#[derive(Debug, Clone, Default)]
pub struct JoinOptions {
    /// Keys of the left frame.
    pub left_on: Vec<ColumnKey>,
    /// Keys of the right frame.
    pub right_on: Vec<ColumnKey>,
    /// Join kind.
    pub how: JoinHow,
    /// Sort the key union of outer joins.
    pub sort: Option<bool>,
    /// Descending union order.
    pub rev: bool,
    /// Collapse pass-through nodes in the result.
    pub simplify: Option<bool>,
    /// Evaluate the result before returning.
    pub eager: bool,
}

impl JoinOptions {
    /// Same key names on both sides.
    pub fn on<K, I>(keys: I) -> Self
    where
        K: Into<ColumnKey>,
        I: IntoIterator<Item = K>,
    {
        let keys: Vec<ColumnKey> = keys.into_iter().map(Into::into).collect();
        Self {
            left_on: keys.clone(),
            right_on: keys,
            ..Self::default()
        }
    }

    /// Different key names per side.
    pub fn left_right<K, I>(left_on: I, right_on: I) -> Self
    where
        K: Into<ColumnKey>,
        I: IntoIterator<Item = K>,
    {
        Self {
            left_on: left_on.into_iter().map(Into::into).collect(),
            right_on: right_on.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Sets the join kind.
    pub fn how(mut self, how: JoinHow) -> Self {
        self.how = how;
        self
    }

    /// Sets union sorting.
    pub fn sort(mut self, sort: bool) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets descending union order.
    pub fn rev(mut self, rev: bool) -> Self {
        self.rev = rev;
        self
    }

    /// Sets result simplification.
    pub fn simplify(mut self, simplify: bool) -> Self {
        self.simplify = Some(simplify);
        self
    }

    /// Evaluates the result before returning.
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    fn swapped(&self) -> Self {
        Self {
            left_on: self.right_on.clone(),
            right_on: self.left_on.clone(),
            how: JoinHow::Left,
            ..self.clone()
        }
    }
}

/// Null policy of [`Frame::dropna`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DropHow {
    /// Drop rows with any null in the subset.
    #[default]
    Any,
    /// Drop rows whose subset is entirely null.
    All,
}

impl Frame {
    fn key_columns(&self, keys: &[ColumnKey]) -> Result<(Vec<Column>, Vec<usize>)> {
        let mut columns = Vec::with_capacity(keys.len());
        let mut positions = Vec::with_capacity(keys.len());
        for key in keys {
            for pos in self.positions(key)? {
                columns.push(self.columns[pos].clone());
                positions.push(pos);
            }
        }
        Ok((columns, positions))
    }

    fn non_key_columns(&self, key_positions: &[usize]) -> Vec<Column> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(pos, _)| !key_positions.contains(pos))
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Joins `right` onto this frame.
    ///
    /// `Left` attaches the right non-key columns; `Right` is `right.join(self)`
    /// as a left join; `Outer` yields the left non-key columns, the merged keys
    /// (named after the left keys), then the right non-key columns assigned by
    /// name. Key pairs must share a dtype.
    pub fn join(&self, right: &Frame, opts: JoinOptions) -> Result<Frame> {
        let config = &self.session.config().join;
        debug!(how = %opts.how, keys = opts.left_on.len(), "planning frame join");
        let joined = match opts.how {
            JoinHow::Left => {
                let (left_keys, _) = self.key_columns(&opts.left_on)?;
                let (right_keys, right_pos) = right.key_columns(&opts.right_on)?;
                let idx = left_join_idx(&left_keys, &right_keys)?;
                let attached: Vec<Column> = right
                    .non_key_columns(&right_pos)
                    .iter()
                    .map(|c| c.take_unchecked(&idx))
                    .collect();
                self.with_columns(attached)?
            }
            JoinHow::Right => return right.join(self, opts.swapped()),
            JoinHow::Outer => {
                let (left_keys, left_pos) = self.key_columns(&opts.left_on)?;
                let (right_keys, right_pos) = right.key_columns(&opts.right_on)?;
                let index = outer_join_idx(
                    &left_keys,
                    &right_keys,
                    opts.sort.unwrap_or(config.sort),
                    opts.rev,
                )?;
                let mut columns: Vec<Column> = self
                    .non_key_columns(&left_pos)
                    .iter()
                    .map(|c| c.take_unchecked(&index.left_idx))
                    .collect();
                columns.extend(index.keys);
                let mut joined = self.derived(columns);
                joined.with_columns_in_place(
                    right
                        .non_key_columns(&right_pos)
                        .iter()
                        .map(|c| c.take_unchecked(&index.right_idx)),
                )?;
                joined
            }
            JoinHow::Inner | JoinHow::Cross => {
                return Err(SheafError::NotImplemented(format!("{} join", opts.how)))
            }
        };
        let joined = if opts.simplify.unwrap_or(config.simplify) {
            joined.simplify()
        } else {
            joined
        };
        if opts.eager {
            joined.eval()
        } else {
            Ok(joined)
        }
    }

    fn take_all(&self, idx: &Column) -> Frame {
        self.apply(|c| c.take(idx))
    }

    /// Stable sort by `by`, nulls last in both directions.
    pub fn sort<K, I>(&self, by: I, rev: bool) -> Result<Frame>
    where
        K: Into<ColumnKey>,
        I: IntoIterator<Item = K>,
    {
        let keys: Vec<ColumnKey> = by.into_iter().map(Into::into).collect();
        let (keys, _) = self.key_columns(&keys)?;
        let order = Column::from_node(Node::Index(IndexNode::Sort { keys, rev }));
        Ok(self.take_all(&order))
    }

    /// Rows holding the first or last occurrence of each `subset` key.
    pub fn unique<K, I>(&self, subset: I, keep: Keep) -> Result<Frame>
    where
        K: Into<ColumnKey>,
        I: IntoIterator<Item = K>,
    {
        let keys: Vec<ColumnKey> = subset.into_iter().map(Into::into).collect();
        let (keys, _) = self.key_columns(&keys)?;
        if keys.is_empty() {
            return Err(SheafError::invalid("unique needs at least one key column"));
        }
        let idx = Column::from_node(Node::Index(IndexNode::Unique { keys, keep }));
        Ok(self.take_all(&idx))
    }

    /// Drops rows with nulls in `subset` (every column when empty).
    pub fn dropna<K, I>(&self, subset: I, how: DropHow) -> Result<Frame>
    where
        K: Into<ColumnKey>,
        I: IntoIterator<Item = K>,
    {
        let keys: Vec<ColumnKey> = subset.into_iter().map(Into::into).collect();
        let checked = if keys.is_empty() {
            self.columns.clone()
        } else {
            self.key_columns(&keys)?.0
        };
        let mut valid = checked.iter().map(Column::not_null);
        let Some(first) = valid.next() else {
            return Ok(self.clone());
        };
        let mask = valid.fold(first, |acc, next| match how {
            DropHow::Any => acc & next,
            DropHow::All => acc | next,
        });
        Ok(self.apply(|c| c.filter(&mask)))
    }

    /// Rows where `mask` is true.
    pub fn filter(&self, mask: impl Into<ColumnExpr>) -> Result<Frame> {
        let mask = mask.into().resolve_one(self)?;
        Ok(self.apply(|c| c.filter(&mask)))
    }

    /// Group-by over this frame.
    pub fn groupby(&self, opts: GroupByOptions) -> Result<FrameGroupBy> {
        FrameGroupBy::new(self.clone(), opts)
    }

    /// Rolling windows over this frame.
    pub fn rolling(&self, opts: RollingOptions) -> Result<FrameRolling> {
        FrameRolling::new(self.clone(), opts)
    }

    /// Row-wise reduction across every column, named after the method.
    pub fn agg_rows(&self, method: AggMethod, opts: AggOptions) -> Column {
        Column::from_node(Node::Horizontal {
            method,
            inputs: self.columns.clone(),
            opts,
        })
        .alias(method.name())
    }

    /// One-row frame reducing every column with `method`.
    pub fn agg_columns(&self, method: AggMethod, opts: AggOptions) -> Frame {
        self.apply(|c| c.agg_with(method, None, opts))
    }
}
