//! Array engine contract and the in-memory reference engine.
//!
//! The planner never computes data itself. Every node of a column graph is
//! handed to an [`ArrayEngine`] together with already materialized inputs.
//! [`MemoryEngine`] implements the contract on plain vectors.

pub mod array;
pub mod duration;
mod index;
mod kernels;
mod memory;
pub mod value;

use std::fmt;
use std::str::FromStr;

pub use array::{Array, DType};
pub use duration::TimeDelta;
pub use memory::MemoryEngine;
pub use value::Value;

use crate::error::{Result, SheafError};

/// Elementwise unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical negation.
    Not,
    /// Absolute value.
    Abs,
    /// Square root.
    Sqrt,
    /// Natural exponent.
    Exp,
    /// Natural logarithm.
    Ln,
    /// True where the value is missing.
    IsNull,
    /// True where the value is present.
    NotNull,
}

/// Elementwise binary operations. Length-one operands broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `**`
    Pow,
    /// Logical and.
    And,
    /// Logical or.
    Or,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Reductions usable as plain aggregations, window aggregations and group aggregations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggMethod {
    /// Sum of valid values.
    Sum,
    /// Arithmetic mean.
    Mean,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Sample standard deviation.
    Std,
    /// Sample variance.
    Var,
    /// Sample skewness.
    Skew,
    /// Excess kurtosis.
    Kurt,
    /// Product.
    Prod,
    /// Median.
    Median,
    /// First element of the window.
    First,
    /// Last element of the window.
    Last,
    /// Number of valid values.
    Count,
    /// Number of rows.
    Len,
    /// Offset of the maximum inside the window.
    ArgMax,
    /// Offset of the minimum inside the window.
    ArgMin,
    /// Rank of the last element among the window's valid values.
    Rank,
    /// Linearly weighted mean, newest row weighted highest.
    Wma,
    /// Pearson correlation against a second column.
    Corr,
    /// Sample covariance against a second column.
    Cov,
}

impl AggMethod {
    /// Canonical lower-case name.
    pub fn name(self) -> &'static str {
        match self {
            AggMethod::Sum => "sum",
            AggMethod::Mean => "mean",
            AggMethod::Min => "min",
            AggMethod::Max => "max",
            AggMethod::Std => "std",
            AggMethod::Var => "var",
            AggMethod::Skew => "skew",
            AggMethod::Kurt => "kurt",
            AggMethod::Prod => "prod",
            AggMethod::Median => "median",
            AggMethod::First => "first",
            AggMethod::Last => "last",
            AggMethod::Count => "count",
            AggMethod::Len => "len",
            AggMethod::ArgMax => "argmax",
            AggMethod::ArgMin => "argmin",
            AggMethod::Rank => "rank",
            AggMethod::Wma => "wma",
            AggMethod::Corr => "corr",
            AggMethod::Cov => "cov",
        }
    }

    /// True for methods that pair the input with a second column.
    pub fn needs_other(self) -> bool {
        matches!(self, AggMethod::Corr | AggMethod::Cov)
    }

    /// Dtype of the aggregated output for an input of `input` dtype.
    pub fn output_dtype(self, input: DType) -> DType {
        match self {
            AggMethod::First | AggMethod::Last => input,
            AggMethod::Min | AggMethod::Max => match input {
                DType::Bool | DType::Int | DType::String | DType::DateTime => input,
                _ => DType::Float,
            },
            AggMethod::Sum | AggMethod::Prod => match input {
                DType::Int | DType::Bool => DType::Int,
                _ => DType::Float,
            },
            AggMethod::Count | AggMethod::Len | AggMethod::ArgMax | AggMethod::ArgMin => {
                DType::Int
            }
            _ => DType::Float,
        }
    }
}

impl FromStr for AggMethod {
    type Err = SheafError;

    fn from_str(s: &str) -> Result<Self> {
        let method = match s {
            "sum" => AggMethod::Sum,
            "mean" | "sma" => AggMethod::Mean,
            "min" => AggMethod::Min,
            "max" => AggMethod::Max,
            "std" => AggMethod::Std,
            "var" => AggMethod::Var,
            "skew" => AggMethod::Skew,
            "kurt" => AggMethod::Kurt,
            "prod" => AggMethod::Prod,
            "median" => AggMethod::Median,
            "first" => AggMethod::First,
            "last" => AggMethod::Last,
            "count" => AggMethod::Count,
            "len" | "size" => AggMethod::Len,
            "argmax" => AggMethod::ArgMax,
            "argmin" => AggMethod::ArgMin,
            "rank" => AggMethod::Rank,
            "wma" => AggMethod::Wma,
            "corr" => AggMethod::Corr,
            "cov" => AggMethod::Cov,
            other => {
                return Err(SheafError::Selector(format!(
                    "unknown aggregation method `{other}`"
                )))
            }
        };
        Ok(method)
    }
}

impl fmt::Display for AggMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Knobs shared by every reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggOptions {
    /// Minimum valid values required for a non-null result.
    pub min_periods: usize,
    /// Requests a numerically stable kernel where the engine has one.
    pub stable: bool,
    /// Parallel execution hint, forwarded untouched.
    pub par: bool,
}

impl Default for AggOptions {
    fn default() -> Self {
        Self {
            min_periods: 1,
            stable: false,
            par: false,
        }
    }
}

impl AggOptions {
    /// Options with the given `min_periods`.
    pub fn min_periods(min_periods: usize) -> Self {
        Self {
            min_periods,
            ..Self::default()
        }
    }
}

/// Anchor policy for duration-based rolling windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StartBy {
    /// Window covers `(t - duration, t]`.
    #[default]
    Full,
    /// Window restarts at every duration-aligned boundary.
    DurationStart,
}

/// Boundary inclusion for time buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Closed {
    /// Buckets are `[start, start + d)`.
    #[default]
    Left,
    /// Buckets are `(start, start + d]`.
    Right,
}

/// Which occurrence `unique` keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Keep {
    /// First occurrence of each key.
    #[default]
    First,
    /// Last occurrence of each key; positions are returned ascending.
    Last,
}

/// Result of an outer-join index computation.
#[derive(Debug, Clone, PartialEq)]
pub struct OuterJoinIdx {
    /// Merged key columns, one per join key.
    pub keys: Vec<Array>,
    /// Left row feeding each output row.
    pub left_idx: Vec<Option<usize>>,
    /// Right row feeding each output row.
    pub right_idx: Vec<Option<usize>>,
}

/// Bucket labels and start offsets of a time grouping. `starts` ends with the input length.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeGroups {
    /// Bucket label per group.
    pub labels: Vec<i64>,
    /// Start offset per group plus a trailing end offset.
    pub starts: Vec<usize>,
}

/// Capability contract the planner relies on.
///
/// The window-aggregation methods have default implementations in terms of
/// [`ArrayEngine::reduce`]; engines with dedicated rolling kernels override them.
pub trait ArrayEngine: Send + Sync + fmt::Debug {
    /// Short engine name used in logs.
    fn name(&self) -> &str;

    /// Elementwise unary operation.
    fn unary(&self, op: UnaryOp, arr: &Array) -> Result<Array>;

    /// Elementwise binary operation with length-one broadcasting.
    fn binary(&self, op: BinaryOp, lhs: &Array, rhs: &Array) -> Result<Array>;

    /// Reduces a whole array to one value.
    fn reduce(
        &self,
        method: AggMethod,
        arr: &Array,
        other: Option<&Array>,
        opts: &AggOptions,
    ) -> Result<Value>;

    /// Row-wise reduction across several equally long arrays.
    fn horizontal(&self, method: AggMethod, arrs: &[Array], opts: &AggOptions) -> Result<Array>;

    /// Row selection. `checked` rejects out-of-range positions; unchecked mode
    /// trusts the positions and yields nulls for missing ones.
    fn take(&self, arr: &Array, idx: &Array, checked: bool) -> Result<Array>;

    /// Rows where `mask` is true.
    fn filter(&self, arr: &Array, mask: &Array) -> Result<Array>;

    /// Positions where `mask` is true.
    fn mask_to_idx(&self, mask: &Array) -> Result<Array>;

    /// `start[i] = max(0, i + 1 - window)`.
    fn fix_window_starts(&self, len: usize, window: usize) -> Result<Array>;

    /// Start positions of duration windows over a sorted time column.
    fn time_window_starts(
        &self,
        time: &Array,
        duration: TimeDelta,
        start_by: StartBy,
    ) -> Result<Array>;

    /// One position list per row: earlier rows whose distance is a whole number
    /// of `offset` steps within `window`.
    fn time_offset_idxs(&self, time: &Array, window: TimeDelta, offset: TimeDelta)
        -> Result<Array>;

    /// Position lists per distinct composite key.
    fn group_idxs(&self, keys: &[&Array], sort: bool, par: bool) -> Result<Array>;

    /// Buckets of a sorted time column.
    fn time_groups(&self, time: &Array, duration: TimeDelta, closed: Closed)
        -> Result<TimeGroups>;

    /// For each left row, a matching right row or null.
    fn left_join_idx(&self, left: &[&Array], right: &[&Array]) -> Result<Array>;

    /// Union of keys with the left and right row feeding each output row.
    fn outer_join_idx(
        &self,
        left: &[&Array],
        right: &[&Array],
        sort: bool,
        rev: bool,
    ) -> Result<OuterJoinIdx>;

    /// Positions of the first or last occurrence of each composite key.
    fn unique_idx(&self, keys: &[&Array], keep: Keep) -> Result<Array>;

    /// Stable sort order over composite keys, nulls last.
    fn sort_idx(&self, keys: &[&Array], rev: bool) -> Result<Array>;

    /// Window aggregation where row `i` reduces `arr[start[i]..=i]`.
    fn agg_by_starts(
        &self,
        method: AggMethod,
        arr: &Array,
        other: Option<&Array>,
        starts: &[usize],
        opts: &AggOptions,
    ) -> Result<Array> {
        if starts.len() != arr.len() {
            return Err(SheafError::invalid(format!(
                "start positions ({}) must match input length ({})",
                starts.len(),
                arr.len()
            )));
        }
        let mut out = Vec::with_capacity(arr.len());
        for (i, &start) in starts.iter().enumerate() {
            let lo = start.min(i);
            let window = arr.slice(lo, i + 1);
            let other_window = other.map(|o| o.slice(lo, i + 1));
            out.push(self.reduce(method, &window, other_window.as_ref(), opts)?);
        }
        Array::from_values(&out, method.output_dtype(arr.dtype()))
    }

    /// Window aggregation where row `i` reduces `arr[idxs[i]]`.
    fn agg_by_idxs(
        &self,
        method: AggMethod,
        arr: &Array,
        other: Option<&Array>,
        idxs: &[Vec<usize>],
        opts: &AggOptions,
    ) -> Result<Array> {
        let mut out = Vec::with_capacity(idxs.len());
        for idx in idxs {
            let window = arr.take(idx)?;
            let other_window = other.map(|o| o.take(idx)).transpose()?;
            out.push(self.reduce(method, &window, other_window.as_ref(), opts)?);
        }
        Array::from_values(&out, method.output_dtype(arr.dtype()))
    }

    /// Group aggregation over consecutive segments `starts[g]..starts[g + 1]`.
    fn agg_by_group_starts(
        &self,
        method: AggMethod,
        arr: &Array,
        other: Option<&Array>,
        starts: &[usize],
        opts: &AggOptions,
    ) -> Result<Array> {
        let mut out = Vec::with_capacity(starts.len().saturating_sub(1));
        for bounds in starts.windows(2) {
            let window = arr.slice(bounds[0], bounds[1]);
            let other_window = other.map(|o| o.slice(bounds[0], bounds[1]));
            out.push(self.reduce(method, &window, other_window.as_ref(), opts)?);
        }
        Array::from_values(&out, method.output_dtype(arr.dtype()))
    }
}
