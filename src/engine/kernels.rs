//! Elementwise and reduction kernels of the reference engine.

use std::cmp::Ordering;

use super::array::{Array, DType};
use super::value::Value;
use super::{AggMethod, AggOptions, BinaryOp, UnaryOp};
use crate::error::{Result, SheafError};

pub(crate) fn unary(op: UnaryOp, arr: &Array) -> Result<Array> {
    match op {
        UnaryOp::IsNull => Ok(Array::Bool(
            (0..arr.len()).map(|i| Some(arr.is_null(i))).collect(),
        )),
        UnaryOp::NotNull => Ok(Array::Bool(
            (0..arr.len()).map(|i| Some(!arr.is_null(i))).collect(),
        )),
        UnaryOp::Not => match arr {
            Array::Bool(v) => Ok(Array::Bool(v.iter().map(|x| x.map(|b| !b)).collect())),
            other => Err(SheafError::type_mismatch("bool", other.dtype().to_string())),
        },
        UnaryOp::Neg | UnaryOp::Abs => match arr {
            Array::Int(v) => Ok(Array::Int(
                v.iter()
                    .map(|x| {
                        x.map(|x| match op {
                            UnaryOp::Neg => x.wrapping_neg(),
                            _ => x.wrapping_abs(),
                        })
                    })
                    .collect(),
            )),
            Array::Float(v) => Ok(Array::Float(
                v.iter()
                    .map(|x| if op == UnaryOp::Neg { -x } else { x.abs() })
                    .collect(),
            )),
            other => Err(SheafError::type_mismatch("numeric", other.dtype().to_string())),
        },
        UnaryOp::Sqrt | UnaryOp::Exp | UnaryOp::Ln => {
            let values = arr.to_f64()?;
            let f: fn(f64) -> f64 = match op {
                UnaryOp::Sqrt => f64::sqrt,
                UnaryOp::Exp => f64::exp,
                _ => f64::ln,
            };
            Ok(Array::Float(values.into_iter().map(f).collect()))
        }
    }
}

fn broadcast_len(lhs: &Array, rhs: &Array) -> Result<usize> {
    match (lhs.len(), rhs.len()) {
        (a, b) if a == b => Ok(a),
        (1, b) => Ok(b),
        (a, 1) => Ok(a),
        (a, b) => Err(SheafError::invalid(format!(
            "cannot broadcast arrays of length {a} and {b}"
        ))),
    }
}

fn at(len: usize, i: usize) -> usize {
    if len == 1 {
        0
    } else {
        i
    }
}

pub(crate) fn binary(op: BinaryOp, lhs: &Array, rhs: &Array) -> Result<Array> {
    let len = broadcast_len(lhs, rhs)?;
    let (ll, rl) = (lhs.len(), rhs.len());
    match op {
        BinaryOp::And | BinaryOp::Or => {
            let (Array::Bool(a), Array::Bool(b)) = (lhs, rhs) else {
                return Err(SheafError::type_mismatch(
                    "bool",
                    format!("{} and {}", lhs.dtype(), rhs.dtype()),
                ));
            };
            Ok(Array::Bool(
                (0..len)
                    .map(|i| {
                        let (x, y) = (a[at(ll, i)], b[at(rl, i)]);
                        match op {
                            BinaryOp::And => match (x, y) {
                                (Some(false), _) | (_, Some(false)) => Some(false),
                                (Some(true), Some(true)) => Some(true),
                                _ => None,
                            },
                            _ => match (x, y) {
                                (Some(true), _) | (_, Some(true)) => Some(true),
                                (Some(false), Some(false)) => Some(false),
                                _ => None,
                            },
                        }
                    })
                    .collect(),
            ))
        }
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            compare(op, lhs, rhs, len)
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => match (lhs, rhs) {
            (Array::Int(a), Array::Int(b)) => Ok(Array::Int(
                (0..len)
                    .map(|i| match (a[at(ll, i)], b[at(rl, i)]) {
                        (Some(x), Some(y)) => Some(match op {
                            BinaryOp::Add => x.wrapping_add(y),
                            BinaryOp::Sub => x.wrapping_sub(y),
                            _ => x.wrapping_mul(y),
                        }),
                        _ => None,
                    })
                    .collect(),
            )),
            (Array::String(a), Array::String(b)) if op == BinaryOp::Add => Ok(Array::String(
                (0..len)
                    .map(|i| match (&a[at(ll, i)], &b[at(rl, i)]) {
                        (Some(x), Some(y)) => Some(format!("{x}{y}")),
                        _ => None,
                    })
                    .collect(),
            )),
            _ => float_binary(op, lhs, rhs, len),
        },
        BinaryOp::Div | BinaryOp::Pow => float_binary(op, lhs, rhs, len),
    }
}

fn float_binary(op: BinaryOp, lhs: &Array, rhs: &Array, len: usize) -> Result<Array> {
    let (a, b) = (lhs.to_f64()?, rhs.to_f64()?);
    let (ll, rl) = (a.len(), b.len());
    Ok(Array::Float(
        (0..len)
            .map(|i| {
                let (x, y) = (a[at(ll, i)], b[at(rl, i)]);
                match op {
                    BinaryOp::Add => x + y,
                    BinaryOp::Sub => x - y,
                    BinaryOp::Mul => x * y,
                    BinaryOp::Div => x / y,
                    _ => x.powf(y),
                }
            })
            .collect(),
    ))
}

fn compare(op: BinaryOp, lhs: &Array, rhs: &Array, len: usize) -> Result<Array> {
    let (ll, rl) = (lhs.len(), rhs.len());
    let ordering = |i: usize| -> Result<Option<Ordering>> {
        let (x, y) = (lhs.get(at(ll, i)), rhs.get(at(rl, i)));
        Ok(match (&x, &y) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) | (Value::Int(a), Value::Int(b)) => {
                Some(a.cmp(b))
            }
            _ => match (x.as_f64(), y.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => {
                    return Err(SheafError::type_mismatch(
                        lhs.dtype().to_string(),
                        rhs.dtype().to_string(),
                    ))
                }
            },
        })
    };
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        out.push(ordering(i)?.map(|ord| match op {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::Ne => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::Le => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            _ => ord != Ordering::Less,
        }));
    }
    Ok(Array::Bool(out))
}

fn int_result(x: f64) -> Value {
    Value::Int(x as i64)
}

pub(crate) fn reduce(
    method: AggMethod,
    arr: &Array,
    other: Option<&Array>,
    opts: &AggOptions,
) -> Result<Value> {
    match method {
        AggMethod::Len => return Ok(Value::Int(arr.len() as i64)),
        AggMethod::Count => {
            let valid = (0..arr.len()).filter(|&i| !arr.is_null(i)).count();
            return Ok(Value::Int(valid as i64));
        }
        AggMethod::First => return Ok(if arr.is_empty() { Value::Null } else { arr.get(0) }),
        AggMethod::Last => {
            return Ok(match arr.len() {
                0 => Value::Null,
                n => arr.get(n - 1),
            })
        }
        AggMethod::Min | AggMethod::Max
            if matches!(arr.dtype(), DType::String | DType::Int | DType::DateTime | DType::Bool) =>
        {
            let valid: Vec<usize> = (0..arr.len()).filter(|&i| !arr.is_null(i)).collect();
            if valid.len() < opts.min_periods.max(1) {
                return Ok(Value::Null);
            }
            let pick = valid.iter().copied().reduce(|best, i| {
                let ord = arr.compare_nulls_last(i, best, false);
                let better = match method {
                    AggMethod::Min => ord == Ordering::Less,
                    _ => ord == Ordering::Greater,
                };
                if better {
                    i
                } else {
                    best
                }
            });
            return Ok(pick.map(|i| arr.get(i)).unwrap_or(Value::Null));
        }
        _ => {}
    }

    let values = arr.to_f64()?;
    if method.needs_other() {
        let other = other.ok_or_else(|| {
            SheafError::invalid(format!("`{method}` requires a second column"))
        })?;
        let other = other.to_f64()?;
        if other.len() != values.len() {
            return Err(SheafError::invalid(format!(
                "`{method}` inputs have different lengths"
            )));
        }
        let pairs: Vec<(f64, f64)> = values
            .iter()
            .zip(&other)
            .filter(|(x, y)| !x.is_nan() && !y.is_nan())
            .map(|(x, y)| (*x, *y))
            .collect();
        if pairs.len() < opts.min_periods.max(2) {
            return Ok(Value::Null);
        }
        return Ok(Value::from(pair_stat(method, &pairs)));
    }

    let valid: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    let n = valid.len();
    if n < opts.min_periods.max(1) {
        return Ok(Value::Null);
    }
    let is_int = matches!(arr.dtype(), DType::Int | DType::Bool);
    let out = match method {
        AggMethod::Sum => {
            let total = sum(&valid, opts.stable);
            if is_int {
                return Ok(int_result(total));
            }
            total
        }
        AggMethod::Prod => {
            let total: f64 = valid.iter().product();
            if is_int {
                return Ok(int_result(total));
            }
            total
        }
        AggMethod::Mean => sum(&valid, opts.stable) / n as f64,
        AggMethod::Min => valid.iter().copied().fold(f64::INFINITY, f64::min),
        AggMethod::Max => valid.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggMethod::Var | AggMethod::Std => {
            if n < 2 {
                return Ok(Value::Null);
            }
            let var = moment(&valid, 2) * n as f64 / (n - 1) as f64;
            if method == AggMethod::Std {
                var.sqrt()
            } else {
                var
            }
        }
        AggMethod::Skew => {
            if n < 3 {
                return Ok(Value::Null);
            }
            let m2 = moment(&valid, 2);
            if m2 == 0.0 {
                return Ok(Value::Float(0.0));
            }
            let nf = n as f64;
            let g1 = moment(&valid, 3) / m2.powf(1.5);
            g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0)
        }
        AggMethod::Kurt => {
            if n < 4 {
                return Ok(Value::Null);
            }
            let m2 = moment(&valid, 2);
            if m2 == 0.0 {
                return Ok(Value::Float(0.0));
            }
            let nf = n as f64;
            let g2 = moment(&valid, 4) / (m2 * m2) - 3.0;
            ((nf + 1.0) * g2 + 6.0) * (nf - 1.0) / ((nf - 2.0) * (nf - 3.0))
        }
        AggMethod::Median => {
            let mut sorted = valid.clone();
            sorted.sort_by(f64::total_cmp);
            if n % 2 == 1 {
                sorted[n / 2]
            } else {
                (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
            }
        }
        AggMethod::ArgMax | AggMethod::ArgMin => {
            let mut best: Option<(usize, f64)> = None;
            for (i, &x) in values.iter().enumerate() {
                if x.is_nan() {
                    continue;
                }
                let replace = match best {
                    None => true,
                    Some((_, b)) if method == AggMethod::ArgMax => x > b,
                    Some((_, b)) => x < b,
                };
                if replace {
                    best = Some((i, x));
                }
            }
            return Ok(best.map(|(i, _)| Value::Int(i as i64)).unwrap_or(Value::Null));
        }
        AggMethod::Rank => {
            let Some(&last) = values.last() else {
                return Ok(Value::Null);
            };
            if last.is_nan() {
                return Ok(Value::Null);
            }
            let below = valid.iter().filter(|&&x| x < last).count() as f64;
            let equal = valid.iter().filter(|&&x| x == last).count() as f64;
            below + (equal + 1.0) / 2.0
        }
        AggMethod::Wma => {
            let mut weighted = 0.0;
            let mut weights = 0.0;
            for (i, &x) in values.iter().enumerate() {
                if x.is_nan() {
                    continue;
                }
                let w = (i + 1) as f64;
                weighted += w * x;
                weights += w;
            }
            weighted / weights
        }
        AggMethod::Len
        | AggMethod::Count
        | AggMethod::First
        | AggMethod::Last
        | AggMethod::Corr
        | AggMethod::Cov => return Err(SheafError::eval(format!("`{method}` handled above"))),
    };
    Ok(Value::from(out))
}

fn sum(values: &[f64], stable: bool) -> f64 {
    if !stable {
        return values.iter().sum();
    }
    // Kahan summation.
    let mut total = 0.0;
    let mut carry = 0.0;
    for &x in values {
        let y = x - carry;
        let t = total + y;
        carry = (t - total) - y;
        total = t;
    }
    total
}

fn moment(values: &[f64], k: i32) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|x| (x - mean).powi(k)).sum::<f64>() / n
}

fn pair_stat(method: AggMethod, pairs: &[(f64, f64)]) -> f64 {
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let cov = pairs.iter().map(|(x, y)| (x - mx) * (y - my)).sum::<f64>();
    match method {
        AggMethod::Cov => cov / (n - 1.0),
        _ => {
            let vx = pairs.iter().map(|(x, _)| (x - mx).powi(2)).sum::<f64>();
            let vy = pairs.iter().map(|(_, y)| (y - my).powi(2)).sum::<f64>();
            cov / (vx * vy).sqrt()
        }
    }
}

pub(crate) fn horizontal(method: AggMethod, arrs: &[Array], opts: &AggOptions) -> Result<Array> {
    let Some(first) = arrs.first() else {
        return Err(SheafError::invalid("horizontal aggregation needs at least one column"));
    };
    let len = first.len();
    if let Some(bad) = arrs.iter().find(|a| a.len() != len) {
        return Err(SheafError::invalid(format!(
            "horizontal inputs differ in length: {len} vs {}",
            bad.len()
        )));
    }
    let columns: Vec<Vec<f64>> = arrs.iter().map(Array::to_f64).collect::<Result<_>>()?;
    let mut out = Vec::with_capacity(len);
    for row in 0..len {
        let cells = Array::Float(columns.iter().map(|c| c[row]).collect());
        let value = reduce(method, &cells, None, opts)?;
        out.push(value.as_f64().unwrap_or(f64::NAN));
    }
    Ok(Array::Float(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_addition_propagates_nulls() {
        let a = Array::Int(vec![Some(1), None, Some(3)]);
        let b = Array::from(vec![10i64]);
        let out = binary(BinaryOp::Add, &a, &b).expect("add");
        assert_eq!(out, Array::Int(vec![Some(11), None, Some(13)]));
    }

    #[test]
    fn comparisons_yield_null_for_missing() {
        let a = Array::from(vec![1.0, f64::NAN]);
        let b = Array::from(vec![1i64, 2]);
        let out = binary(BinaryOp::Ge, &a, &b).expect("ge");
        assert_eq!(out, Array::Bool(vec![Some(true), None]));
    }

    #[test]
    fn reductions_respect_min_periods() {
        let arr = Array::from(vec![1.0, f64::NAN, 3.0]);
        assert_eq!(
            reduce(AggMethod::Mean, &arr, None, &AggOptions::default()).expect("mean"),
            Value::Float(2.0)
        );
        assert_eq!(
            reduce(AggMethod::Sum, &arr, None, &AggOptions::min_periods(3)).expect("sum"),
            Value::Null
        );
        let ints = Array::from(vec![4i64, 2, 5]);
        assert_eq!(
            reduce(AggMethod::Max, &ints, None, &AggOptions::default()).expect("max"),
            Value::Int(5)
        );
    }

    #[test]
    fn correlation_of_linear_series_is_one() {
        let x = Array::from(vec![1.0, 2.0, 3.0, 4.0]);
        let y = Array::from(vec![2.0, 4.0, 6.0, 8.0]);
        let corr = reduce(AggMethod::Corr, &x, Some(&y), &AggOptions::default()).expect("corr");
        let value = corr.as_f64().expect("float");
        assert!((value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn horizontal_mean_skips_nulls() {
        let a = Array::from(vec![1.0, f64::NAN]);
        let b = Array::from(vec![3.0, 5.0]);
        let out = horizontal(AggMethod::Mean, &[a, b], &AggOptions::default()).expect("hmean");
        assert_eq!(out, Array::Float(vec![2.0, 5.0]));
    }
}
