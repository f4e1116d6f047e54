//! Ordered, name-addressable collections of lazy columns.

mod key;
mod ops;

use ahash::AHashMap;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::trace;

pub use key::{ColumnExpr, ColumnKey, Selected};
pub use ops::{DropHow, JoinHow, JoinOptions};

use crate::engine::Array;
use crate::error::{Result, SheafError};
use crate::expr::Column;
use crate::session::Session;

/// New names for [`Frame::rename`].
#[derive(Debug, Clone)]
pub enum Renames {
    /// One name per column, in order.
    List(Vec<String>),
    /// `(old, new)` pairs.
    Map(Vec<(String, String)>),
}

/// An ordered collection of columns.
///
/// Name lookups resolve to the first column carrying the name. The name index
/// is built on first lookup and dropped by every structural edit.
#[derive(Clone)]
pub struct Frame {
    columns: Vec<Column>,
    name_index: OnceLock<AHashMap<String, usize>>,
    auto_idx: usize,
    session: Arc<Session>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("columns", &self.names())
            .finish()
    }
}

impl Frame {
    /// Frame over `columns`. Unnamed columns receive generated names; with
    /// `copy` set, materialized data is duplicated instead of shared.
    pub fn new(columns: Vec<Column>, session: Arc<Session>, copy: bool) -> Self {
        let mut frame = Self::empty(session);
        for column in columns {
            let column = if copy { column.deep_copy() } else { column };
            frame.push(column);
        }
        frame
    }

    /// Frame without columns.
    pub fn empty(session: Arc<Session>) -> Self {
        Self {
            columns: Vec::new(),
            name_index: OnceLock::new(),
            auto_idx: 0,
            session,
        }
    }

    /// Frame over `columns` with a default session.
    pub fn from_columns(columns: Vec<Column>) -> Self {
        Self::new(columns, Session::default().shared(), false)
    }

    /// Frame from `(name, data)` pairs with a default session.
    pub fn from_pairs<N, A, I>(pairs: I) -> Self
    where
        N: Into<String>,
        A: Into<Array>,
        I: IntoIterator<Item = (N, A)>,
    {
        Self::from_columns(
            pairs
                .into_iter()
                .map(|(name, data)| Column::new(name, data))
                .collect(),
        )
    }

    /// Frame from unnamed arrays; names are generated.
    pub fn from_arrays<A, I>(arrays: I) -> Self
    where
        A: Into<Array>,
        I: IntoIterator<Item = A>,
    {
        Self::from_columns(arrays.into_iter().map(Column::unnamed).collect())
    }

    /// Same columns under another session.
    pub fn with_session(mut self, session: Arc<Session>) -> Self {
        self.session = session;
        self
    }

    pub(crate) fn derived(&self, columns: Vec<Column>) -> Self {
        Self::new(columns, Arc::clone(&self.session), false)
    }

    /// Session shared by operations on this frame.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True without columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Row count, known once the first column is materialized.
    pub fn height(&self) -> Option<usize> {
        self.columns.first().and_then(Column::len)
    }

    /// Columns in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Consumes the frame into its columns.
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    /// Column names in order.
    pub fn names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.name().unwrap_or_default())
            .collect()
    }

    fn name_index(&self) -> &AHashMap<String, usize> {
        self.name_index.get_or_init(|| {
            trace!(columns = self.columns.len(), "building name index");
            let mut index = AHashMap::with_capacity(self.columns.len());
            for (pos, column) in self.columns.iter().enumerate() {
                if let Some(name) = column.name() {
                    index.entry(name.to_owned()).or_insert(pos);
                }
            }
            index
        })
    }

    fn invalidate(&mut self) {
        self.name_index = OnceLock::new();
    }

    /// Position of the first column named `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.name_index().get(name).copied()
    }

    /// True when a column is named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn regex_positions(&self, pattern: &str) -> Result<Vec<usize>> {
        let re = Regex::new(pattern)?;
        Ok(self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.name().is_some_and(|n| re.is_match(n)))
            .map(|(pos, _)| pos)
            .collect())
    }

    /// Positions addressed by `key`. Regex keys may match nothing.
    pub(crate) fn positions(&self, key: &ColumnKey) -> Result<Vec<usize>> {
        match key {
            ColumnKey::Name(pattern) if key.is_regex() => self.regex_positions(pattern),
            ColumnKey::Name(name) => self
                .position(name)
                .map(|p| vec![p])
                .ok_or_else(|| SheafError::ColumnNotFound(name.clone())),
            ColumnKey::Position(pos) if *pos < self.columns.len() => Ok(vec![*pos]),
            ColumnKey::Position(pos) => Err(SheafError::OutOfBounds {
                index: *pos,
                len: self.columns.len(),
            }),
        }
    }

    /// Looks up one key: a column for exact keys, a sub-frame for regex keys.
    pub fn get(&self, key: impl Into<ColumnKey>) -> Result<Selected> {
        let key = key.into();
        let positions = self.positions(&key)?;
        if key.is_regex() {
            let columns = positions.iter().map(|&p| self.columns[p].clone()).collect();
            return Ok(Selected::Frame(self.derived(columns)));
        }
        Ok(Selected::Column(self.columns[positions[0]].clone()))
    }

    /// Looks up one exact key.
    pub fn column(&self, key: impl Into<ColumnKey>) -> Result<Column> {
        let key = key.into();
        match self.get(key.clone())? {
            Selected::Column(c) => Ok(c),
            Selected::Frame(_) => Err(SheafError::invalid(format!(
                "regex key {key} selects a frame, not a column"
            ))),
        }
    }

    /// Sub-frame of every column addressed by `keys`, in key order.
    pub fn get_many<K, I>(&self, keys: I) -> Result<Frame>
    where
        K: Into<ColumnKey>,
        I: IntoIterator<Item = K>,
    {
        let mut columns = Vec::new();
        for key in keys {
            columns.extend(self.get(key)?.into_columns());
        }
        Ok(self.derived(columns))
    }

    fn next_auto_name(&mut self) -> String {
        loop {
            let name = format!("{}{}", self.session.config().naming.auto_prefix, self.auto_idx);
            self.auto_idx += 1;
            if !self.contains(&name) {
                return name;
            }
        }
    }

    /// Appends a column, generating a name when it has none.
    pub fn push(&mut self, column: Column) {
        let column = match column.name() {
            Some(_) => column,
            None => {
                let name = self.next_auto_name();
                column.alias(name)
            }
        };
        self.columns.push(column);
        self.invalidate();
    }

    /// Assigns `value` to `key`.
    ///
    /// * Position: replaces the slot, keeping the old name unless `value` is named.
    /// * Name: replaces the first column with that name, or appends.
    /// * Regex: replaces every matching column, keeping the matched names.
    pub fn set(&mut self, key: impl Into<ColumnKey>, value: Column) -> Result<()> {
        let key = key.into();
        match &key {
            ColumnKey::Position(pos) => {
                let len = self.columns.len();
                let slot = self
                    .columns
                    .get_mut(*pos)
                    .ok_or(SheafError::OutOfBounds { index: *pos, len })?;
                *slot = match value.name() {
                    Some(_) => value,
                    None => value.with_name(slot.name().map(str::to_owned)),
                };
            }
            ColumnKey::Name(pattern) if key.is_regex() => {
                for pos in self.regex_positions(pattern)? {
                    let name = self.columns[pos].name().map(str::to_owned);
                    self.columns[pos] = value.with_name(name);
                }
            }
            ColumnKey::Name(name) => match self.position(name) {
                Some(pos) => self.columns[pos] = value.alias(name.clone()),
                None => self.columns.push(value.alias(name.clone())),
            },
        }
        self.invalidate();
        Ok(())
    }

    /// Assigns `values[i]` to `keys[i]`; both lists must have the same length.
    pub fn set_many<K: Into<ColumnKey>>(&mut self, keys: Vec<K>, values: Vec<Column>) -> Result<()> {
        if keys.len() != values.len() {
            return Err(SheafError::invalid(format!(
                "{} keys cannot take {} values",
                keys.len(),
                values.len()
            )));
        }
        for (key, value) in keys.into_iter().zip(values) {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Removes every column addressed by `keys`.
    pub fn drop_in_place<K, I>(&mut self, keys: I) -> Result<()>
    where
        K: Into<ColumnKey>,
        I: IntoIterator<Item = K>,
    {
        let mut doomed = Vec::new();
        for key in keys {
            doomed.extend(self.positions(&key.into())?);
        }
        doomed.sort_unstable();
        doomed.dedup();
        for pos in doomed.into_iter().rev() {
            self.columns.remove(pos);
        }
        self.invalidate();
        Ok(())
    }

    /// Copy without the columns addressed by `keys`.
    pub fn drop<K, I>(&self, keys: I) -> Result<Frame>
    where
        K: Into<ColumnKey>,
        I: IntoIterator<Item = K>,
    {
        let mut out = self.clone();
        out.drop_in_place(keys)?;
        Ok(out)
    }

    /// Alias of [`Frame::drop`].
    pub fn exclude<K, I>(&self, keys: I) -> Result<Frame>
    where
        K: Into<ColumnKey>,
        I: IntoIterator<Item = K>,
    {
        self.drop(keys)
    }

    /// Renames columns in place.
    pub fn rename_in_place(&mut self, renames: Renames) -> Result<()> {
        match renames {
            Renames::List(names) => {
                if names.len() != self.columns.len() {
                    return Err(SheafError::invalid(format!(
                        "{} names given for {} columns",
                        names.len(),
                        self.columns.len()
                    )));
                }
                for (column, name) in self.columns.iter_mut().zip(names) {
                    *column = column.alias(name);
                }
            }
            Renames::Map(pairs) => {
                for (old, new) in pairs {
                    let pos = self
                        .position(&old)
                        .ok_or_else(|| SheafError::ColumnNotFound(old.clone()))?;
                    self.columns[pos] = self.columns[pos].alias(new);
                    self.invalidate();
                }
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Renamed copy.
    pub fn rename(&self, renames: Renames) -> Result<Frame> {
        let mut out = self.clone();
        out.rename_in_place(renames)?;
        Ok(out)
    }

    /// Resolves `exprs` against this frame, flattening selections.
    pub fn resolve_exprs<E, I>(&self, exprs: I) -> Result<Vec<Column>>
    where
        E: Into<ColumnExpr>,
        I: IntoIterator<Item = E>,
    {
        let mut out = Vec::new();
        for expr in exprs {
            out.extend(expr.into().resolve(self)?);
        }
        Ok(out)
    }

    /// New frame holding the resolved `exprs`.
    pub fn select<E, I>(&self, exprs: I) -> Result<Frame>
    where
        E: Into<ColumnExpr>,
        I: IntoIterator<Item = E>,
    {
        Ok(self.derived(self.resolve_exprs(exprs)?))
    }

    /// Resolves `exprs` and assigns each result by its name.
    pub fn with_columns_in_place<E, I>(&mut self, exprs: I) -> Result<()>
    where
        E: Into<ColumnExpr>,
        I: IntoIterator<Item = E>,
    {
        for column in self.resolve_exprs(exprs)? {
            match column.name().map(str::to_owned) {
                Some(name) => self.set(ColumnKey::Name(name), column)?,
                None => self.push(column),
            }
        }
        Ok(())
    }

    /// Copy with `exprs` assigned by name.
    pub fn with_columns<E, I>(&self, exprs: I) -> Result<Frame>
    where
        E: Into<ColumnExpr>,
        I: IntoIterator<Item = E>,
    {
        let mut out = self.clone();
        out.with_columns_in_place(exprs)?;
        Ok(out)
    }

    /// Maps every column through `f`.
    pub fn apply(&self, f: impl FnMut(&Column) -> Column) -> Frame {
        self.derived(self.columns.iter().map(f).collect())
    }

    /// Rows `start..end` of every column.
    pub fn slice(&self, start: usize, end: usize) -> Frame {
        self.apply(|c| c.slice(start, end))
    }

    /// Copy whose materialized data is not shared with `self`.
    pub fn deep_copy(&self) -> Frame {
        self.apply(Column::deep_copy)
    }

    /// Collapses pass-through operations in every column.
    pub fn simplify(&self) -> Frame {
        self.apply(Column::simplify)
    }

    /// Materializes every column through the session engine.
    pub fn eval(&self) -> Result<Frame> {
        let mut frames = self.session.eval_frames(std::slice::from_ref(self))?;
        frames
            .pop()
            .ok_or_else(|| SheafError::eval("evaluation returned no frame"))
    }
}
