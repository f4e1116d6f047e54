//! Column addressing: keys, lookup results and expression inputs.

use std::fmt;

use super::Frame;
use crate::expr::registry::FunctionRegistry;
use crate::expr::{Column, ContextKey};
use crate::selector::Selector;
use crate::error::{Result, SheafError};

/// Addresses columns of a frame by position or name. Names shaped like
/// `^...$` are regular expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnKey {
    /// Zero-based position.
    Position(usize),
    /// Exact name or anchored regex.
    Name(String),
}

impl ColumnKey {
    /// True when the key is an anchored regex.
    pub fn is_regex(&self) -> bool {
        matches!(self, ColumnKey::Name(name) if name.len() >= 2 && name.starts_with('^') && name.ends_with('$'))
    }

    /// Window-context placeholder for this key.
    pub(crate) fn to_context(&self) -> Result<Column> {
        match self {
            _ if self.is_regex() => Err(SheafError::Selector(format!(
                "regex key {self} cannot address a window context"
            ))),
            ColumnKey::Position(pos) => Ok(Column::context(ContextKey::Position(*pos))),
            ColumnKey::Name(name) => Ok(Column::context(ContextKey::Name(name.clone()))),
        }
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKey::Position(pos) => write!(f, "#{pos}"),
            ColumnKey::Name(name) => write!(f, "`{name}`"),
        }
    }
}

impl From<&str> for ColumnKey {
    fn from(name: &str) -> Self {
        ColumnKey::Name(name.to_owned())
    }
}

impl From<String> for ColumnKey {
    fn from(name: String) -> Self {
        ColumnKey::Name(name)
    }
}

impl From<&String> for ColumnKey {
    fn from(name: &String) -> Self {
        ColumnKey::Name(name.clone())
    }
}

impl From<usize> for ColumnKey {
    fn from(pos: usize) -> Self {
        ColumnKey::Position(pos)
    }
}

/// Result of a frame lookup: exact keys give a column, regex keys a sub-frame.
#[derive(Debug, Clone)]
pub enum Selected {
    /// Single column.
    Column(Column),
    /// Every column matched by a regex.
    Frame(Frame),
}

impl Selected {
    /// Flattens the selection into columns.
    pub fn into_columns(self) -> Vec<Column> {
        match self {
            Selected::Column(c) => vec![c],
            Selected::Frame(f) => f.into_columns(),
        }
    }
}

/// Anything a frame operation accepts where a column is expected.
#[derive(Debug, Clone)]
pub enum ColumnExpr {
    /// Frame lookup.
    Key(ColumnKey),
    /// Ready-made column.
    Column(Column),
    /// Deferred selector.
    Selector(Selector),
}

impl ColumnExpr {
    /// Resolves against `frame`, flattening regex and list selections.
    pub fn resolve(&self, frame: &Frame) -> Result<Vec<Column>> {
        match self {
            ColumnExpr::Key(key) => Ok(frame.get(key.clone())?.into_columns()),
            ColumnExpr::Column(c) => Ok(vec![c.clone()]),
            ColumnExpr::Selector(s) => Ok(s.resolve(frame)?.into_columns()),
        }
    }

    /// Resolves to exactly one column against `frame`.
    pub fn resolve_one(&self, frame: &Frame) -> Result<Column> {
        let mut cols = self.resolve(frame)?;
        match cols.len() {
            1 => Ok(cols.remove(0)),
            n => Err(SheafError::invalid(format!(
                "expected one column, {self} selected {n}"
            ))),
        }
    }

    /// Resolves without a frame. Keys need a frame; columns pass through.
    pub fn resolve_standalone(&self, registry: &FunctionRegistry) -> Result<Column> {
        match self {
            ColumnExpr::Column(c) => Ok(c.clone()),
            ColumnExpr::Selector(s) => s.resolve_in_context(registry)?.into_one(),
            ColumnExpr::Key(key) => Err(SheafError::invalid(format!(
                "key {key} needs a frame to resolve"
            ))),
        }
    }

    /// Resolves as a window body: keys and selectors address the window's columns.
    pub fn resolve_in_context(&self, registry: &FunctionRegistry) -> Result<Vec<Column>> {
        match self {
            ColumnExpr::Key(key) => Ok(vec![key.to_context()?]),
            ColumnExpr::Column(c) => Ok(vec![c.clone()]),
            ColumnExpr::Selector(s) => Ok(s.resolve_in_context(registry)?.into_columns()),
        }
    }
}

impl fmt::Display for ColumnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnExpr::Key(key) => write!(f, "{key}"),
            ColumnExpr::Column(c) => write!(f, "column {}", c.name().unwrap_or("<unnamed>")),
            ColumnExpr::Selector(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for ColumnExpr {
    fn from(name: &str) -> Self {
        ColumnExpr::Key(name.into())
    }
}

impl From<String> for ColumnExpr {
    fn from(name: String) -> Self {
        ColumnExpr::Key(name.into())
    }
}

impl From<usize> for ColumnExpr {
    fn from(pos: usize) -> Self {
        ColumnExpr::Key(pos.into())
    }
}

impl From<ColumnKey> for ColumnExpr {
    fn from(key: ColumnKey) -> Self {
        ColumnExpr::Key(key)
    }
}

impl From<Column> for ColumnExpr {
    fn from(c: Column) -> Self {
        ColumnExpr::Column(c)
    }
}

impl From<&Column> for ColumnExpr {
    fn from(c: &Column) -> Self {
        ColumnExpr::Column(c.clone())
    }
}

impl From<Selector> for ColumnExpr {
    fn from(s: Selector) -> Self {
        ColumnExpr::Selector(s)
    }
}
