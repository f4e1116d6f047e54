//! Row-wise aggregations across several columns.
//!
//! The helpers accept either ready-made columns or selectors. With columns the
//! result is built immediately; with selectors it stays deferred until the
//! selector is resolved against a frame or window.

use crate::engine::{AggMethod, AggOptions};
use crate::error::{Result, SheafError};
use crate::expr::{Column, Node};
use crate::selector::{Arg, Selector, SelectorArgs};

/// Inputs a horizontal helper can combine.
pub trait Horizontal: Sized {
    /// Combined result.
    type Output;

    /// Combines `inputs` with module function `name`.
    fn combine(inputs: Vec<Self>, name: &str, method: AggMethod, min_periods: usize)
        -> Result<Self::Output>;
}

impl Horizontal for Column {
    type Output = Column;

    fn combine(
        inputs: Vec<Self>,
        name: &str,
        method: AggMethod,
        min_periods: usize,
    ) -> Result<Column> {
        if inputs.is_empty() {
            return Err(SheafError::invalid(format!("`{name}` needs at least one column")));
        }
        Ok(Column::from_node(Node::Horizontal {
            method,
            inputs,
            opts: AggOptions::min_periods(min_periods),
        })
        .alias(name))
    }
}

impl Horizontal for Selector {
    type Output = Selector;

    fn combine(inputs: Vec<Self>, name: &str, _: AggMethod, min_periods: usize) -> Result<Selector> {
        if inputs.is_empty() {
            return Err(SheafError::invalid(format!("`{name}` needs at least one column")));
        }
        let args = SelectorArgs::positional([Arg::from(inputs)])
            .kwarg("min_periods", min_periods);
        Ok(Selector::module(name).call(args))
    }
}

/// Row-wise maximum.
pub fn hmax<T: Horizontal>(inputs: Vec<T>) -> Result<T::Output> {
    T::combine(inputs, "hmax", AggMethod::Max, 1)
}

/// Row-wise minimum.
pub fn hmin<T: Horizontal>(inputs: Vec<T>) -> Result<T::Output> {
    T::combine(inputs, "hmin", AggMethod::Min, 1)
}

/// Row-wise mean.
pub fn hmean<T: Horizontal>(inputs: Vec<T>) -> Result<T::Output> {
    T::combine(inputs, "hmean", AggMethod::Mean, 1)
}

/// Row-wise sum.
pub fn hsum<T: Horizontal>(inputs: Vec<T>) -> Result<T::Output> {
    T::combine(inputs, "hsum", AggMethod::Sum, 1)
}

/// Row-wise standard deviation; rows with fewer than three values are null.
pub fn hstd<T: Horizontal>(inputs: Vec<T>) -> Result<T::Output> {
    T::combine(inputs, "hstd", AggMethod::Std, 3)
}
