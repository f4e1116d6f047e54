//! Lazy columns and the compute graph behind them.
//!
//! A [`Column`] pairs an optional name with a shared [`Node`]. Building
//! columns only records intent; data is produced by [`Evaluator`] against an
//! [`ArrayEngine`](crate::engine::ArrayEngine).

mod eval;
mod ops;
pub mod registry;
mod simplify;

use std::fmt;
use std::sync::Arc;

pub use eval::{Context, Data, Evaluator};
pub(crate) use eval::eval_columns;

use crate::engine::{
    AggMethod, AggOptions, Array, BinaryOp, Closed, DType, Keep, StartBy, TimeDelta, UnaryOp,
    Value,
};
use crate::error::{Result, SheafError};

/// Reference to a column of the active window inside a rolling or group body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextKey {
    /// By alias.
    Name(String),
    /// By position among the window's columns.
    Position(usize),
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKey::Name(name) => write!(f, "ct({name})"),
            ContextKey::Position(pos) => write!(f, "ct({pos})"),
        }
    }
}

/// Index structures computed by the engine. Multi-output variants are read
/// through [`Node::Output`].
#[derive(Debug, Clone)]
pub enum IndexNode {
    /// Fixed-count window start positions over `len_of`'s length.
    FixWindow {
        /// Column whose length sizes the index.
        len_of: Column,
        /// Window size in rows.
        window: usize,
    },
    /// Duration window start positions.
    TimeWindow {
        /// Sorted time column.
        time: Column,
        /// Window duration.
        duration: TimeDelta,
        /// Anchor policy.
        start_by: StartBy,
    },
    /// Per-row index vectors stepping by `offset` inside `window`.
    TimeOffset {
        /// Sorted time column.
        time: Column,
        /// Window duration.
        window: TimeDelta,
        /// Step duration.
        offset: TimeDelta,
    },
    /// Per-group index vectors over composite keys.
    Group {
        /// Key columns.
        keys: Vec<Column>,
        /// Sorted key order instead of first occurrence.
        sort: bool,
        /// Parallel hint.
        par: bool,
    },
    /// Time buckets; outputs `[labels, starts]`.
    TimeGroup {
        /// Sorted time column.
        time: Column,
        /// Bucket width.
        duration: TimeDelta,
        /// Boundary policy.
        closed: Closed,
    },
    /// Left-join positions into the right side.
    LeftJoin {
        /// Left key columns.
        left: Vec<Column>,
        /// Right key columns.
        right: Vec<Column>,
    },
    /// Outer join; outputs `[keys..., left_idx, right_idx]`.
    OuterJoin {
        /// Left key columns.
        left: Vec<Column>,
        /// Right key columns.
        right: Vec<Column>,
        /// Sort the key union.
        sort: bool,
        /// Descending order when sorting.
        rev: bool,
    },
    /// First or last occurrence positions.
    Unique {
        /// Key columns.
        keys: Vec<Column>,
        /// Occurrence to keep.
        keep: Keep,
    },
    /// Stable sort order, nulls last.
    Sort {
        /// Key columns.
        keys: Vec<Column>,
        /// Descending order.
        rev: bool,
    },
    /// Positions where a boolean mask is true.
    MaskToIdx {
        /// Boolean mask.
        mask: Column,
    },
    /// `0..len`.
    Arange {
        /// Column whose length sizes the range.
        len_of: Column,
    },
}

/// How a window aggregation reads its index column.
#[derive(Debug, Clone)]
pub enum WindowIndex {
    /// Row `i` covers `[start[i], i]`.
    Starts(Column),
    /// Row `i` covers the listed positions.
    Idxs(Column),
    /// Output `g` covers `starts[g]..starts[g + 1]`.
    GroupStarts(Column),
}

impl WindowIndex {
    /// Index column.
    pub fn column(&self) -> &Column {
        match self {
            WindowIndex::Starts(c) | WindowIndex::Idxs(c) | WindowIndex::GroupStarts(c) => c,
        }
    }
}

/// A node of the compute graph.
#[derive(Debug, Clone)]
pub enum Node {
    /// Materialized data.
    Source(Array),
    /// Length-one literal that broadcasts in binary operations.
    Scalar(Value),
    /// Placeholder bound per window at evaluation time.
    Context(ContextKey),
    /// Elementwise unary operation.
    Unary {
        /// Operation.
        op: UnaryOp,
        /// Operand.
        input: Column,
    },
    /// Elementwise binary operation.
    Binary {
        /// Operation.
        op: BinaryOp,
        /// Left operand.
        lhs: Column,
        /// Right operand.
        rhs: Column,
    },
    /// Whole-column reduction producing one row.
    Reduce {
        /// Reduction.
        method: AggMethod,
        /// Input.
        input: Column,
        /// Second input for paired statistics.
        other: Option<Column>,
        /// Reduction options.
        opts: AggOptions,
    },
    /// Row-wise reduction across columns.
    Horizontal {
        /// Reduction.
        method: AggMethod,
        /// Inputs.
        inputs: Vec<Column>,
        /// Reduction options.
        opts: AggOptions,
    },
    /// Row selection.
    Take {
        /// Input.
        input: Column,
        /// Positions.
        idx: Column,
        /// Reject out-of-range positions.
        checked: bool,
    },
    /// Mask filter.
    Filter {
        /// Input.
        input: Column,
        /// Boolean mask.
        mask: Column,
    },
    /// Rows `start..end`.
    Slice {
        /// Input.
        input: Column,
        /// First row.
        start: usize,
        /// One past the last row.
        end: usize,
    },
    /// Index structure.
    Index(IndexNode),
    /// One output of a multi-output index node.
    Output {
        /// Multi-output node.
        source: Column,
        /// Output slot.
        slot: usize,
    },
    /// Built-in window aggregation.
    WindowAgg {
        /// Reduction.
        method: AggMethod,
        /// Input.
        input: Column,
        /// Second input for paired statistics.
        other: Option<Column>,
        /// Window index.
        index: WindowIndex,
        /// Reduction options.
        opts: AggOptions,
    },
    /// Arbitrary expression evaluated once per window with context bindings.
    WindowApply {
        /// Expression referencing [`Node::Context`] placeholders.
        body: Column,
        /// Window columns in context order.
        inputs: Vec<Column>,
        /// Context names of `inputs`.
        names: Vec<String>,
        /// Window index.
        index: WindowIndex,
    },
}

impl Node {
    /// Short label used in traces and debug output.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Source(_) => "source",
            Node::Scalar(_) => "scalar",
            Node::Context(_) => "context",
            Node::Unary { .. } => "unary",
            Node::Binary { .. } => "binary",
            Node::Reduce { .. } => "reduce",
            Node::Horizontal { .. } => "horizontal",
            Node::Take { .. } => "take",
            Node::Filter { .. } => "filter",
            Node::Slice { .. } => "slice",
            Node::Index(_) => "index",
            Node::Output { .. } => "output",
            Node::WindowAgg { .. } => "window_agg",
            Node::WindowApply { .. } => "window_apply",
        }
    }
}

/// A named, lazily computed array.
#[derive(Clone)]
pub struct Column {
    name: Option<String>,
    node: Arc<Node>,
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("node", &self.node.kind())
            .finish()
    }
}

impl Column {
    /// Materialized column.
    pub fn new(name: impl Into<String>, data: impl Into<Array>) -> Self {
        Self {
            name: Some(name.into()),
            node: Arc::new(Node::Source(data.into())),
        }
    }

    /// Materialized column without a name.
    pub fn unnamed(data: impl Into<Array>) -> Self {
        Self::from_node(Node::Source(data.into()))
    }

    /// Unnamed column over a new graph node.
    pub fn from_node(node: Node) -> Self {
        Self {
            name: None,
            node: Arc::new(node),
        }
    }

    /// Broadcasting literal.
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::from_node(Node::Scalar(value.into()))
    }

    /// Placeholder for a column of the active window, named after `key`.
    pub fn context(key: ContextKey) -> Self {
        let name = match &key {
            ContextKey::Name(name) => Some(name.clone()),
            ContextKey::Position(_) => None,
        };
        Self {
            name,
            node: Arc::new(Node::Context(key)),
        }
    }

    /// Optional name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Graph node.
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Same graph under another name.
    pub fn alias(&self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            node: Arc::clone(&self.node),
        }
    }

    /// Same graph with `suffix` appended to the name.
    pub fn suffix(&self, suffix: &str) -> Self {
        let name = format!("{}{suffix}", self.name.as_deref().unwrap_or_default());
        self.alias(name)
    }

    pub(crate) fn with_name(&self, name: Option<String>) -> Self {
        Self {
            name,
            node: Arc::clone(&self.node),
        }
    }

    /// True when both columns share one graph node.
    pub fn same_node(&self, other: &Column) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Data if the column is materialized.
    pub fn array(&self) -> Option<&Array> {
        match self.node.as_ref() {
            Node::Source(arr) => Some(arr),
            _ => None,
        }
    }

    /// True for materialized columns.
    pub fn is_materialized(&self) -> bool {
        self.array().is_some()
    }

    /// Row count of a materialized column.
    pub fn len(&self) -> Option<usize> {
        self.array().map(Array::len)
    }

    /// True when a materialized column has no rows.
    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|n| n == 0)
    }

    /// Dtype of a materialized column.
    pub fn dtype(&self) -> Option<DType> {
        self.array().map(Array::dtype)
    }

    /// Values of a materialized column.
    pub fn values(&self) -> Result<Vec<Value>> {
        self.array().map(Array::values).ok_or_else(|| {
            SheafError::eval(format!(
                "column `{}` is not materialized; evaluate it first",
                self.name().unwrap_or("<unnamed>")
            ))
        })
    }

    /// Deep copy of materialized data; lazy columns share their graph.
    pub fn deep_copy(&self) -> Self {
        match self.node.as_ref() {
            Node::Source(arr) => Self {
                name: self.name.clone(),
                node: Arc::new(Node::Source(arr.clone())),
            },
            _ => self.clone(),
        }
    }

    fn derive(&self, node: Node) -> Self {
        Self {
            name: self.name.clone(),
            node: Arc::new(node),
        }
    }

    /// Elementwise unary operation, keeping the name.
    pub fn unary(&self, op: UnaryOp) -> Self {
        self.derive(Node::Unary {
            op,
            input: self.clone(),
        })
    }

    /// Elementwise binary operation, keeping the left name.
    pub fn binary(&self, op: BinaryOp, rhs: impl Into<Column>) -> Self {
        self.derive(Node::Binary {
            op,
            lhs: self.clone(),
            rhs: rhs.into(),
        })
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        self.unary(UnaryOp::Abs)
    }

    /// Square root.
    pub fn sqrt(&self) -> Self {
        self.unary(UnaryOp::Sqrt)
    }

    /// Exponent.
    pub fn exp(&self) -> Self {
        self.unary(UnaryOp::Exp)
    }

    /// Natural logarithm.
    pub fn ln(&self) -> Self {
        self.unary(UnaryOp::Ln)
    }

    /// Null mask.
    pub fn is_null(&self) -> Self {
        self.unary(UnaryOp::IsNull)
    }

    /// Non-null mask.
    pub fn not_null(&self) -> Self {
        self.unary(UnaryOp::NotNull)
    }

    /// `self ** rhs`
    pub fn pow(&self, rhs: impl Into<Column>) -> Self {
        self.binary(BinaryOp::Pow, rhs)
    }

    /// `self == rhs`
    pub fn eq(&self, rhs: impl Into<Column>) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    /// `self != rhs`
    pub fn ne(&self, rhs: impl Into<Column>) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    /// `self < rhs`
    pub fn lt(&self, rhs: impl Into<Column>) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    /// `self <= rhs`
    pub fn le(&self, rhs: impl Into<Column>) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    /// `self > rhs`
    pub fn gt(&self, rhs: impl Into<Column>) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    /// `self >= rhs`
    pub fn ge(&self, rhs: impl Into<Column>) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    /// Whole-column reduction with explicit options.
    pub fn agg_with(&self, method: AggMethod, other: Option<Column>, opts: AggOptions) -> Self {
        self.derive(Node::Reduce {
            method,
            input: self.clone(),
            other,
            opts,
        })
    }

    /// Whole-column reduction with default options.
    pub fn agg(&self, method: AggMethod) -> Self {
        self.agg_with(method, None, AggOptions::default())
    }

    /// Sum.
    pub fn sum(&self) -> Self {
        self.agg(AggMethod::Sum)
    }

    /// Mean.
    pub fn mean(&self) -> Self {
        self.agg(AggMethod::Mean)
    }

    /// Minimum.
    pub fn min(&self) -> Self {
        self.agg(AggMethod::Min)
    }

    /// Maximum.
    pub fn max(&self) -> Self {
        self.agg(AggMethod::Max)
    }

    /// Standard deviation.
    pub fn std(&self) -> Self {
        self.agg(AggMethod::Std)
    }

    /// First row.
    pub fn first(&self) -> Self {
        self.agg(AggMethod::First)
    }

    /// Last row.
    pub fn last(&self) -> Self {
        self.agg(AggMethod::Last)
    }

    /// Valid count.
    pub fn count(&self) -> Self {
        self.agg(AggMethod::Count)
    }

    /// Correlation with `other`.
    pub fn corr(&self, other: &Column) -> Self {
        self.agg_with(AggMethod::Corr, Some(other.clone()), AggOptions::default())
    }

    /// Fixed-window rolling aggregation over the last `window` rows.
    pub fn ts(&self, method: AggMethod, window: usize) -> Self {
        self.ts_with(method, window, None, AggOptions::default())
    }

    /// Fixed-window rolling aggregation with a second input and options.
    pub fn ts_with(
        &self,
        method: AggMethod,
        window: usize,
        other: Option<Column>,
        opts: AggOptions,
    ) -> Self {
        let starts = Column::from_node(Node::Index(IndexNode::FixWindow {
            len_of: self.clone(),
            window,
        }));
        self.derive(Node::WindowAgg {
            method,
            input: self.clone(),
            other,
            index: WindowIndex::Starts(starts),
            opts,
        })
    }

    /// Checked row selection.
    pub fn take(&self, idx: &Column) -> Self {
        self.derive(Node::Take {
            input: self.clone(),
            idx: idx.clone(),
            checked: true,
        })
    }

    /// Row selection trusting `idx`; missing positions become nulls.
    pub fn take_unchecked(&self, idx: &Column) -> Self {
        self.derive(Node::Take {
            input: self.clone(),
            idx: idx.clone(),
            checked: false,
        })
    }

    /// Rows where `mask` is true.
    pub fn filter(&self, mask: &Column) -> Self {
        self.derive(Node::Filter {
            input: self.clone(),
            mask: mask.clone(),
        })
    }

    /// Rows `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        self.derive(Node::Slice {
            input: self.clone(),
            start,
            end,
        })
    }

    /// Positions where this boolean column is true.
    pub fn mask_to_idx(&self) -> Self {
        Column::from_node(Node::Index(IndexNode::MaskToIdx { mask: self.clone() }))
    }

    /// `0..len` positions over this column.
    pub fn arange(&self) -> Self {
        Column::from_node(Node::Index(IndexNode::Arange {
            len_of: self.clone(),
        }))
    }

    /// Evaluates the column against `engine`, keeping its name.
    pub fn eval(&self, engine: &dyn crate::engine::ArrayEngine) -> Result<Column> {
        let array = Evaluator::new(engine).eval_array(self)?;
        Ok(Column {
            name: self.name.clone(),
            node: Arc::new(Node::Source(array)),
        })
    }

    /// Collapses pass-through operations in the graph.
    pub fn simplify(&self) -> Self {
        simplify::simplify(self)
    }
}

/// Reads slot `slot` of a multi-output node.
pub(crate) fn output(source: &Column, slot: usize) -> Column {
    Column::from_node(Node::Output {
        source: source.clone(),
        slot,
    })
}

impl From<Array> for Column {
    fn from(data: Array) -> Self {
        Column::unnamed(data)
    }
}

impl From<&Column> for Column {
    fn from(c: &Column) -> Self {
        c.clone()
    }
}

impl From<Value> for Column {
    fn from(v: Value) -> Self {
        Column::scalar(v)
    }
}

impl From<i64> for Column {
    fn from(v: i64) -> Self {
        Column::scalar(v)
    }
}

impl From<i32> for Column {
    fn from(v: i32) -> Self {
        Column::scalar(v)
    }
}

impl From<f64> for Column {
    fn from(v: f64) -> Self {
        Column::scalar(v)
    }
}

impl From<bool> for Column {
    fn from(v: bool) -> Self {
        Column::scalar(v)
    }
}
