//! Reference [`ArrayEngine`] backed by plain vectors.

use tracing::debug;

use super::array::Array;
use super::duration::TimeDelta;
use super::value::Value;
use super::{
    index, kernels, AggMethod, AggOptions, ArrayEngine, BinaryOp, Closed, Keep, OuterJoinIdx,
    StartBy, TimeGroups, UnaryOp,
};
use crate::error::{Result, SheafError};

/// Single-threaded engine operating on in-memory [`Array`]s.
///
/// The `par` hint is accepted and ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryEngine;

impl MemoryEngine {
    /// Creates the engine.
    pub fn new() -> Self {
        Self
    }
}

impl ArrayEngine for MemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    fn unary(&self, op: UnaryOp, arr: &Array) -> Result<Array> {
        kernels::unary(op, arr)
    }

    fn binary(&self, op: BinaryOp, lhs: &Array, rhs: &Array) -> Result<Array> {
        kernels::binary(op, lhs, rhs)
    }

    fn reduce(
        &self,
        method: AggMethod,
        arr: &Array,
        other: Option<&Array>,
        opts: &AggOptions,
    ) -> Result<Value> {
        kernels::reduce(method, arr, other, opts)
    }

    fn horizontal(&self, method: AggMethod, arrs: &[Array], opts: &AggOptions) -> Result<Array> {
        kernels::horizontal(method, arrs, opts)
    }

    fn take(&self, arr: &Array, idx: &Array, checked: bool) -> Result<Array> {
        let positions = idx.to_opt_positions()?;
        if checked {
            let len = arr.len();
            if let Some(bad) = positions.iter().flatten().find(|&&i| i >= len) {
                return Err(SheafError::OutOfBounds { index: *bad, len });
            }
        }
        Ok(arr.take_opt(&positions))
    }

    fn filter(&self, arr: &Array, mask: &Array) -> Result<Array> {
        arr.filter(&mask.to_mask()?)
    }

    fn mask_to_idx(&self, mask: &Array) -> Result<Array> {
        let mask = mask.to_mask()?;
        Ok(Array::Usize(
            mask.iter()
                .enumerate()
                .filter(|(_, keep)| **keep)
                .map(|(i, _)| i)
                .collect(),
        ))
    }

    fn fix_window_starts(&self, len: usize, window: usize) -> Result<Array> {
        if window == 0 {
            return Err(SheafError::invalid("rolling window must be positive"));
        }
        Ok(Array::Usize(index::fix_window_starts(len, window)))
    }

    fn time_window_starts(
        &self,
        time: &Array,
        duration: TimeDelta,
        start_by: StartBy,
    ) -> Result<Array> {
        let times = time.to_i64_strict()?;
        Ok(Array::Usize(index::time_window_starts(
            &times, duration, start_by,
        )?))
    }

    fn time_offset_idxs(
        &self,
        time: &Array,
        window: TimeDelta,
        offset: TimeDelta,
    ) -> Result<Array> {
        let times = time.to_i64_strict()?;
        Ok(Array::VecUsize(index::time_offset_idxs(&times, window, offset)?))
    }

    fn group_idxs(&self, keys: &[&Array], sort: bool, par: bool) -> Result<Array> {
        debug!(keys = keys.len(), sort, par, "computing group index");
        Ok(Array::VecUsize(index::group_idxs(keys, sort)?))
    }

    fn time_groups(&self, time: &Array, duration: TimeDelta, closed: Closed) -> Result<TimeGroups> {
        let times = time.to_i64_strict()?;
        index::time_groups(&times, duration, closed)
    }

    fn left_join_idx(&self, left: &[&Array], right: &[&Array]) -> Result<Array> {
        Ok(Array::OptUsize(index::left_join_idx(left, right)?))
    }

    fn outer_join_idx(
        &self,
        left: &[&Array],
        right: &[&Array],
        sort: bool,
        rev: bool,
    ) -> Result<OuterJoinIdx> {
        index::outer_join_idx(left, right, sort, rev)
    }

    fn unique_idx(&self, keys: &[&Array], keep: Keep) -> Result<Array> {
        Ok(Array::Usize(index::unique_idx(keys, keep)?))
    }

    fn sort_idx(&self, keys: &[&Array], rev: bool) -> Result<Array> {
        Ok(Array::Usize(index::sort_idx(keys, rev)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_sum_over_fixed_starts() {
        let engine = MemoryEngine::new();
        let arr = Array::from(vec![1i64, 2, 3, 4]);
        let starts = engine.fix_window_starts(arr.len(), 2).expect("starts");
        let starts = starts.to_positions().expect("positions");
        let out = engine
            .agg_by_starts(AggMethod::Sum, &arr, None, &starts, &AggOptions::default())
            .expect("rolling sum");
        assert_eq!(out, Array::from(vec![1i64, 3, 5, 7]));
    }

    #[test]
    fn unchecked_take_yields_nulls() {
        let engine = MemoryEngine::new();
        let arr = Array::from(vec![1.5, 2.5]);
        let idx = Array::OptUsize(vec![Some(1), None]);
        let out = engine.take(&arr, &idx, false).expect("take");
        assert_eq!(out.values(), vec![Value::Float(2.5), Value::Null]);
        let bad = Array::Usize(vec![5]);
        assert!(engine.take(&arr, &bad, true).is_err());
    }

    #[test]
    fn group_starts_aggregate_segments() {
        let engine = MemoryEngine::new();
        let arr = Array::from(vec![1.0, 2.0, 3.0, 4.0]);
        let out = engine
            .agg_by_group_starts(AggMethod::Mean, &arr, None, &[0, 1, 4], &AggOptions::default())
            .expect("group mean");
        assert_eq!(out, Array::Float(vec![1.0, 3.0]));
    }
}
