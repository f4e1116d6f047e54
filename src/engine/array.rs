//! In-memory column storage used by the reference engine and by materialized columns.

use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

use super::value::Value;
use crate::error::{Result, SheafError};

/// Element type of an [`Array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// Nullable booleans.
    Bool,
    /// Nullable 64-bit integers.
    Int,
    /// Floats; NaN marks missing values.
    Float,
    /// Nullable strings.
    String,
    /// Nullable nanosecond timestamps.
    DateTime,
    /// Row positions.
    Usize,
    /// Row positions that may be missing (join gaps).
    OptUsize,
    /// One position list per row (offset windows, groups).
    VecUsize,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Bool => "bool",
            DType::Int => "i64",
            DType::Float => "f64",
            DType::String => "str",
            DType::DateTime => "datetime",
            DType::Usize => "usize",
            DType::OptUsize => "opt_usize",
            DType::VecUsize => "vec_usize",
        };
        f.write_str(name)
    }
}

/// A materialized column.
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    /// Booleans.
    Bool(Vec<Option<bool>>),
    /// Integers.
    Int(Vec<Option<i64>>),
    /// Floats with NaN as null.
    Float(Vec<f64>),
    /// Strings.
    String(Vec<Option<String>>),
    /// Timestamps in nanoseconds.
    DateTime(Vec<Option<i64>>),
    /// Positions.
    Usize(Vec<usize>),
    /// Optional positions.
    OptUsize(Vec<Option<usize>>),
    /// Position lists.
    VecUsize(Vec<Vec<usize>>),
}

/// Hashable view of a single cell. Floats hash by normalized bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    /// Missing value; nulls compare equal to each other when grouping.
    Null,
    /// Boolean cell.
    Bool(bool),
    /// Integer or timestamp cell.
    Int(i64),
    /// Float cell bits with `-0.0` folded into `0.0`.
    Float(u64),
    /// String cell.
    Str(String),
    /// Position cell.
    Usize(usize),
}

/// Composite key over several key columns.
pub type RowKey = SmallVec<[HashKey; 2]>;

macro_rules! dispatch_same {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            Array::Bool($v) => Array::Bool($body),
            Array::Int($v) => Array::Int($body),
            Array::Float($v) => Array::Float($body),
            Array::String($v) => Array::String($body),
            Array::DateTime($v) => Array::DateTime($body),
            Array::Usize($v) => Array::Usize($body),
            Array::OptUsize($v) => Array::OptUsize($body),
            Array::VecUsize($v) => Array::VecUsize($body),
        }
    };
}

impl Array {
    /// Empty array of the given dtype.
    pub fn empty(dtype: DType) -> Self {
        match dtype {
            DType::Bool => Array::Bool(Vec::new()),
            DType::Int => Array::Int(Vec::new()),
            DType::Float => Array::Float(Vec::new()),
            DType::String => Array::String(Vec::new()),
            DType::DateTime => Array::DateTime(Vec::new()),
            DType::Usize => Array::Usize(Vec::new()),
            DType::OptUsize => Array::OptUsize(Vec::new()),
            DType::VecUsize => Array::VecUsize(Vec::new()),
        }
    }

    /// Timestamps from raw nanoseconds.
    pub fn datetime(values: Vec<i64>) -> Self {
        Array::DateTime(values.into_iter().map(Some).collect())
    }

    /// `0..len` as positions.
    pub fn arange(len: usize) -> Self {
        Array::Usize((0..len).collect())
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        match self {
            Array::Bool(_) => DType::Bool,
            Array::Int(_) => DType::Int,
            Array::Float(_) => DType::Float,
            Array::String(_) => DType::String,
            Array::DateTime(_) => DType::DateTime,
            Array::Usize(_) => DType::Usize,
            Array::OptUsize(_) => DType::OptUsize,
            Array::VecUsize(_) => DType::VecUsize,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Array::Bool(v) => v.len(),
            Array::Int(v) => v.len(),
            Array::Float(v) => v.len(),
            Array::String(v) => v.len(),
            Array::DateTime(v) => v.len(),
            Array::Usize(v) => v.len(),
            Array::OptUsize(v) => v.len(),
            Array::VecUsize(v) => v.len(),
        }
    }

    /// True when the array has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `i` as a [`Value`]; position dtypes surface as [`Value::Int`].
    pub fn get(&self, i: usize) -> Value {
        match self {
            Array::Bool(v) => v.get(i).copied().flatten().into(),
            Array::Int(v) => v.get(i).copied().flatten().into(),
            Array::Float(v) => v.get(i).copied().map(Value::from).unwrap_or(Value::Null),
            Array::String(v) => v.get(i).cloned().flatten().into(),
            Array::DateTime(v) => v
                .get(i)
                .copied()
                .flatten()
                .map(Value::DateTime)
                .unwrap_or(Value::Null),
            Array::Usize(v) => v.get(i).map(|x| usize_value(*x)).unwrap_or(Value::Null),
            Array::OptUsize(v) => v
                .get(i)
                .copied()
                .flatten()
                .map(usize_value)
                .unwrap_or(Value::Null),
            Array::VecUsize(v) => v
                .get(i)
                .map(|x| Value::Int(i64::try_from(x.len()).unwrap_or(i64::MAX)))
                .unwrap_or(Value::Null),
        }
    }

    /// All cells as values.
    pub fn values(&self) -> Vec<Value> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }

    /// True where the cell is missing.
    pub fn is_null(&self, i: usize) -> bool {
        match self {
            Array::Bool(v) => matches!(v.get(i), Some(None)),
            Array::Int(v) | Array::DateTime(v) => matches!(v.get(i), Some(None)),
            Array::Float(v) => v.get(i).is_some_and(|x| x.is_nan()),
            Array::String(v) => matches!(v.get(i), Some(None)),
            Array::OptUsize(v) => matches!(v.get(i), Some(None)),
            Array::Usize(_) | Array::VecUsize(_) => false,
        }
    }

    /// Collects values into an array. The first non-null value picks the dtype;
    /// `fallback` is used when every value is null. Ints widen to floats when mixed.
    pub fn from_values(values: &[Value], fallback: DType) -> Result<Self> {
        let mut dtype = None;
        for v in values {
            match (dtype, v.dtype()) {
                (_, None) => {}
                (None, Some(d)) => dtype = Some(d),
                (Some(DType::Int), Some(DType::Float)) => dtype = Some(DType::Float),
                (Some(DType::Float), Some(DType::Int)) => {}
                (Some(a), Some(b)) if a == b => {}
                (Some(a), Some(b)) => {
                    return Err(SheafError::type_mismatch(a.to_string(), b.to_string()))
                }
            }
        }
        let dtype = dtype.unwrap_or(fallback);
        let out = match dtype {
            DType::Bool => Array::Bool(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect(),
            ),
            DType::Int => Array::Int(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Int(x) => Some(*x),
                        _ => None,
                    })
                    .collect(),
            ),
            DType::Float => Array::Float(
                values
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(f64::NAN))
                    .collect(),
            ),
            DType::String => Array::String(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Str(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
            DType::DateTime => Array::DateTime(
                values
                    .iter()
                    .map(|v| match v {
                        Value::DateTime(x) => Some(*x),
                        _ => None,
                    })
                    .collect(),
            ),
            DType::Usize | DType::OptUsize => {
                Array::OptUsize(values.iter().map(Value::as_usize).collect())
            }
            DType::VecUsize => {
                return Err(SheafError::type_mismatch("scalar dtype", "vec_usize"))
            }
        };
        Ok(out)
    }

    /// Checked row selection; every index must be in bounds.
    pub fn take(&self, idx: &[usize]) -> Result<Self> {
        let len = self.len();
        if let Some(&bad) = idx.iter().find(|&&i| i >= len) {
            return Err(SheafError::OutOfBounds { index: bad, len });
        }
        Ok(dispatch_same!(self, v => idx.iter().map(|&i| v[i].clone()).collect()))
    }

    /// Selection with optional positions; `None` and out-of-range positions yield nulls.
    pub fn take_opt(&self, idx: &[Option<usize>]) -> Self {
        fn pick<T: Clone>(v: &[Option<T>], idx: &[Option<usize>]) -> Vec<Option<T>> {
            idx.iter()
                .map(|i| i.and_then(|i| v.get(i).cloned().flatten()))
                .collect()
        }
        match self {
            Array::Bool(v) => Array::Bool(pick(v, idx)),
            Array::Int(v) => Array::Int(pick(v, idx)),
            Array::String(v) => Array::String(pick(v, idx)),
            Array::DateTime(v) => Array::DateTime(pick(v, idx)),
            Array::OptUsize(v) => Array::OptUsize(pick(v, idx)),
            Array::Float(v) => Array::Float(
                idx.iter()
                    .map(|i| i.and_then(|i| v.get(i).copied()).unwrap_or(f64::NAN))
                    .collect(),
            ),
            Array::Usize(v) => Array::OptUsize(
                idx.iter()
                    .map(|i| i.and_then(|i| v.get(i).copied()))
                    .collect(),
            ),
            Array::VecUsize(v) => Array::VecUsize(
                idx.iter()
                    .map(|i| i.and_then(|i| v.get(i).cloned()).unwrap_or_default())
                    .collect(),
            ),
        }
    }

    /// Rows where `mask` is true.
    pub fn filter(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.len() {
            return Err(SheafError::invalid(format!(
                "mask length {} does not match array length {}",
                mask.len(),
                self.len()
            )));
        }
        Ok(dispatch_same!(self, v => v
            .iter()
            .zip(mask)
            .filter(|(_, keep)| **keep)
            .map(|(x, _)| x.clone())
            .collect()))
    }

    /// Rows `start..end`, clamped to the array bounds.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.len());
        let start = start.min(end);
        dispatch_same!(self, v => v[start..end].to_vec())
    }

    /// Appends `others` to `self`. All arrays must share a dtype.
    pub fn concat(parts: &[Array], fallback: DType) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Ok(Array::empty(fallback));
        };
        let mut out = first.clone();
        for part in &parts[1..] {
            out.extend(part)?;
        }
        Ok(out)
    }

    fn extend(&mut self, other: &Array) -> Result<()> {
        match (&mut *self, other) {
            (Array::Bool(a), Array::Bool(b)) => a.extend_from_slice(b),
            (Array::Int(a), Array::Int(b)) => a.extend_from_slice(b),
            (Array::Float(a), Array::Float(b)) => a.extend_from_slice(b),
            (Array::String(a), Array::String(b)) => a.extend_from_slice(b),
            (Array::DateTime(a), Array::DateTime(b)) => a.extend_from_slice(b),
            (Array::Usize(a), Array::Usize(b)) => a.extend_from_slice(b),
            (Array::OptUsize(a), Array::OptUsize(b)) => a.extend_from_slice(b),
            (Array::VecUsize(a), Array::VecUsize(b)) => a.extend_from_slice(b),
            (Array::Int(a), Array::Float(b)) => {
                let mut widened: Vec<f64> = a
                    .iter()
                    .map(|x| x.map(|x| x as f64).unwrap_or(f64::NAN))
                    .collect();
                widened.extend_from_slice(b);
                *self = Array::Float(widened);
            }
            (Array::Float(a), Array::Int(b)) => {
                a.extend(b.iter().map(|x| x.map(|x| x as f64).unwrap_or(f64::NAN)))
            }
            (a, b) => return Err(SheafError::type_mismatch(a.dtype().to_string(), b.dtype().to_string())),
        }
        Ok(())
    }

    /// Fills the nulls of `self` from `other` row by row.
    pub fn coalesce(&self, other: &Array) -> Result<Self> {
        if self.len() != other.len() {
            return Err(SheafError::invalid("coalesce requires equal lengths"));
        }
        if self.dtype() != other.dtype() {
            return Err(SheafError::type_mismatch(
                self.dtype().to_string(),
                other.dtype().to_string(),
            ));
        }
        let values: Vec<Value> = (0..self.len())
            .map(|i| {
                if self.is_null(i) {
                    other.get(i)
                } else {
                    self.get(i)
                }
            })
            .collect();
        Array::from_values(&values, self.dtype())
    }

    /// Floats with NaN for nulls. Fails for non-numeric dtypes.
    pub fn to_f64(&self) -> Result<Vec<f64>> {
        match self {
            Array::Float(v) => Ok(v.clone()),
            Array::Int(v) | Array::DateTime(v) => Ok(v
                .iter()
                .map(|x| x.map(|x| x as f64).unwrap_or(f64::NAN))
                .collect()),
            Array::Bool(v) => Ok(v
                .iter()
                .map(|x| x.map(|b| if b { 1.0 } else { 0.0 }).unwrap_or(f64::NAN))
                .collect()),
            Array::Usize(v) => Ok(v.iter().map(|&x| x as f64).collect()),
            Array::OptUsize(v) => Ok(v
                .iter()
                .map(|x| x.map(|x| x as f64).unwrap_or(f64::NAN))
                .collect()),
            other => Err(SheafError::type_mismatch("numeric", other.dtype().to_string())),
        }
    }

    /// Timestamps or integers as raw `i64`, rejecting nulls.
    pub fn to_i64_strict(&self) -> Result<Vec<i64>> {
        match self {
            Array::Int(v) | Array::DateTime(v) => v
                .iter()
                .enumerate()
                .map(|(i, x)| {
                    x.ok_or_else(|| SheafError::eval(format!("time column has a null at row {i}")))
                })
                .collect(),
            other => Err(SheafError::type_mismatch("datetime", other.dtype().to_string())),
        }
    }

    /// Booleans with nulls treated as false.
    pub fn to_mask(&self) -> Result<Vec<bool>> {
        match self {
            Array::Bool(v) => Ok(v.iter().map(|x| x.unwrap_or(false)).collect()),
            other => Err(SheafError::type_mismatch("bool", other.dtype().to_string())),
        }
    }

    /// Optional positions view for any position-like dtype.
    pub fn to_opt_positions(&self) -> Result<Vec<Option<usize>>> {
        match self {
            Array::Usize(v) => Ok(v.iter().copied().map(Some).collect()),
            Array::OptUsize(v) => Ok(v.clone()),
            Array::Int(v) => v
                .iter()
                .map(|x| match x {
                    None => Ok(None),
                    Some(x) => usize::try_from(*x)
                        .map(Some)
                        .map_err(|_| SheafError::invalid(format!("negative index {x}"))),
                })
                .collect(),
            other => Err(SheafError::type_mismatch("positions", other.dtype().to_string())),
        }
    }

    /// Non-null positions view.
    pub fn to_positions(&self) -> Result<Vec<usize>> {
        self.to_opt_positions()?
            .into_iter()
            .enumerate()
            .map(|(i, x)| x.ok_or_else(|| SheafError::eval(format!("null position at row {i}"))))
            .collect()
    }

    /// Position lists view.
    pub fn as_position_lists(&self) -> Result<&[Vec<usize>]> {
        match self {
            Array::VecUsize(v) => Ok(v),
            other => Err(SheafError::type_mismatch("vec_usize", other.dtype().to_string())),
        }
    }

    /// Hash key for cell `i`.
    pub fn hash_key(&self, i: usize) -> HashKey {
        match self {
            Array::Bool(v) => v[i].map(HashKey::Bool).unwrap_or(HashKey::Null),
            Array::Int(v) | Array::DateTime(v) => v[i].map(HashKey::Int).unwrap_or(HashKey::Null),
            Array::Float(v) => {
                let x = v[i];
                if x.is_nan() {
                    HashKey::Null
                } else if x == 0.0 {
                    HashKey::Float(0.0f64.to_bits())
                } else {
                    HashKey::Float(x.to_bits())
                }
            }
            Array::String(v) => v[i].clone().map(HashKey::Str).unwrap_or(HashKey::Null),
            Array::Usize(v) => HashKey::Usize(v[i]),
            Array::OptUsize(v) => v[i].map(HashKey::Usize).unwrap_or(HashKey::Null),
            Array::VecUsize(v) => HashKey::Usize(v[i].len()),
        }
    }

    /// Orders two non-null cells of the same array. Nulls are handled by [`compare_nulls_last`].
    fn compare_valid(&self, a: usize, b: usize) -> Ordering {
        match self {
            Array::Bool(v) => v[a].cmp(&v[b]),
            Array::Int(v) | Array::DateTime(v) => v[a].cmp(&v[b]),
            Array::Float(v) => v[a].total_cmp(&v[b]),
            Array::String(v) => v[a].cmp(&v[b]),
            Array::Usize(v) => v[a].cmp(&v[b]),
            Array::OptUsize(v) => v[a].cmp(&v[b]),
            Array::VecUsize(v) => v[a].len().cmp(&v[b].len()),
        }
    }

    /// Compares rows `a` and `b`; nulls sort after every value regardless of `rev`.
    pub fn compare_nulls_last(&self, a: usize, b: usize, rev: bool) -> Ordering {
        match (self.is_null(a), self.is_null(b)) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = self.compare_valid(a, b);
                if rev {
                    ord.reverse()
                } else {
                    ord
                }
            }
        }
    }
}

fn usize_value(x: usize) -> Value {
    Value::Int(i64::try_from(x).unwrap_or(i64::MAX))
}

/// Composite key of row `i` across `keys`.
pub fn row_key(keys: &[&Array], i: usize) -> RowKey {
    keys.iter().map(|k| k.hash_key(i)).collect()
}

/// Lexicographic row comparison across `keys`, nulls last.
pub fn compare_rows(keys: &[&Array], a: usize, b: usize, rev: bool) -> Ordering {
    for key in keys {
        let ord = key.compare_nulls_last(a, b, rev);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl From<Vec<i64>> for Array {
    fn from(v: Vec<i64>) -> Self {
        Array::Int(v.into_iter().map(Some).collect())
    }
}

impl From<Vec<Option<i64>>> for Array {
    fn from(v: Vec<Option<i64>>) -> Self {
        Array::Int(v)
    }
}

impl From<Vec<f64>> for Array {
    fn from(v: Vec<f64>) -> Self {
        Array::Float(v)
    }
}

impl From<Vec<bool>> for Array {
    fn from(v: Vec<bool>) -> Self {
        Array::Bool(v.into_iter().map(Some).collect())
    }
}

impl From<Vec<&str>> for Array {
    fn from(v: Vec<&str>) -> Self {
        Array::String(v.into_iter().map(|s| Some(s.to_owned())).collect())
    }
}

impl From<Vec<Option<&str>>> for Array {
    fn from(v: Vec<Option<&str>>) -> Self {
        Array::String(v.into_iter().map(|s| s.map(str::to_owned)).collect())
    }
}

impl From<Vec<String>> for Array {
    fn from(v: Vec<String>) -> Self {
        Array::String(v.into_iter().map(Some).collect())
    }
}
