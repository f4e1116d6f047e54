//! Window planning: rolling windows and group-by.
//!
//! Both planners resolve their shape once at construction, record the index
//! structure as a lazy graph node, and route aggregations either to a
//! built-in window reduction ([`Node::WindowAgg`]) or to an arbitrary body
//! evaluated per window ([`Node::WindowApply`]).

pub mod groupby;
pub mod rolling;

use std::fmt;
use std::str::FromStr;

pub use groupby::{
    AggSpec, FrameGroupBy, GroupBy, GroupByOptions, GroupByType, GroupInfo, GroupKeys,
};
pub use rolling::{FrameRolling, Rolling, RollingOptions, RollingType};

use crate::engine::{AggMethod, AggOptions, TimeDelta};
use crate::error::{Result, SheafError};
use crate::expr::registry::FunctionRegistry;
use crate::expr::{Column, Node, WindowIndex};
use crate::frame::ColumnExpr;

/// Window length: a row count or a duration over a time column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Number of rows.
    Count(usize),
    /// Duration.
    Duration(TimeDelta),
}

impl From<usize> for Window {
    fn from(n: usize) -> Self {
        Window::Count(n)
    }
}

impl From<TimeDelta> for Window {
    fn from(d: TimeDelta) -> Self {
        Window::Duration(d)
    }
}

impl FromStr for Window {
    type Err = SheafError;

    /// Digits only parse as a row count; anything else as a duration.
    fn from_str(s: &str) -> Result<Self> {
        match s.parse::<usize>() {
            Ok(n) => Ok(Window::Count(n)),
            Err(_) => Ok(Window::Duration(s.parse()?)),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Count(n) => write!(f, "{n}"),
            Window::Duration(d) => write!(f, "{d}"),
        }
    }
}

/// Names unnamed window inputs `{prefix}{i}` by position so window bodies can
/// address them.
pub(crate) fn name_inputs(inputs: Vec<Column>, prefix: &str) -> Vec<Column> {
    inputs
        .into_iter()
        .enumerate()
        .map(|(i, c)| match c.name() {
            Some(_) => c,
            None => c.alias(format!("{prefix}{i}")),
        })
        .collect()
}

/// Built-in reduction of `input` over `index`. Paired methods read their
/// second input from `others[0]`.
pub(crate) fn window_agg(
    method: AggMethod,
    input: &Column,
    others: &[Column],
    index: WindowIndex,
    opts: AggOptions,
) -> Result<Column> {
    let other = if method.needs_other() {
        Some(others.first().cloned().ok_or_else(|| {
            SheafError::invalid(format!("`{method}` needs a second column in `others`"))
        })?)
    } else {
        None
    };
    let node = Node::WindowAgg {
        method,
        input: input.clone(),
        other,
        index,
        opts,
    };
    Ok(Column::from_node(node).with_name(input.name().map(str::to_owned)))
}

/// Arbitrary body evaluated once per window. Keys in `body` address
/// `inputs` by name or position.
pub(crate) fn window_apply(
    body: &ColumnExpr,
    inputs: &[Column],
    index: WindowIndex,
    registry: &FunctionRegistry,
) -> Result<Vec<Column>> {
    let names: Vec<String> = inputs
        .iter()
        .map(|c| c.name().unwrap_or_default().to_owned())
        .collect();
    let bodies = body.resolve_in_context(registry)?;
    Ok(bodies
        .into_iter()
        .map(|body| {
            let name = body
                .name()
                .or_else(|| inputs.first().and_then(Column::name))
                .map(str::to_owned);
            Column::from_node(Node::WindowApply {
                body,
                inputs: inputs.to_vec(),
                names: names.clone(),
                index: index.clone(),
            })
            .with_name(name)
        })
        .collect())
}
