//! Index primitives of the reference engine: window starts, groups, joins.

use ahash::AHashMap;
use tracing::trace;

use super::array::{compare_rows, row_key, Array, RowKey};
use super::duration::{add_delta, truncate, TimeDelta};
use super::{Closed, Keep, OuterJoinIdx, StartBy, TimeGroups};
use crate::error::{Result, SheafError};

fn key_len(keys: &[&Array]) -> Result<usize> {
    let Some(first) = keys.first() else {
        return Err(SheafError::invalid("at least one key column is required"));
    };
    let len = first.len();
    if keys.iter().any(|k| k.len() != len) {
        return Err(SheafError::invalid("key columns differ in length"));
    }
    Ok(len)
}

fn check_key_dtypes(left: &[&Array], right: &[&Array]) -> Result<()> {
    for (l, r) in left.iter().zip(right) {
        if l.dtype() != r.dtype() {
            return Err(SheafError::type_mismatch(
                l.dtype().to_string(),
                r.dtype().to_string(),
            ));
        }
    }
    Ok(())
}

pub(crate) fn fix_window_starts(len: usize, window: usize) -> Vec<usize> {
    (0..len).map(|i| (i + 1).saturating_sub(window)).collect()
}

pub(crate) fn time_window_starts(
    times: &[i64],
    duration: TimeDelta,
    start_by: StartBy,
) -> Result<Vec<usize>> {
    let mut out = Vec::with_capacity(times.len());
    let Some(&first) = times.first() else {
        return Ok(out);
    };
    let mut start = 0usize;
    match start_by {
        StartBy::Full => {
            for (i, &t) in times.iter().enumerate() {
                if t >= add_delta(times[start], duration)? {
                    for j in start + 1..=i {
                        start = j;
                        if t < add_delta(times[j], duration)? {
                            break;
                        }
                    }
                }
                out.push(start);
            }
        }
        StartBy::DurationStart => {
            let mut bucket = truncate(first, duration)?;
            for (i, &t) in times.iter().enumerate() {
                if t >= add_delta(bucket, duration)? {
                    bucket = truncate(t, duration)?;
                    start = i;
                }
                out.push(start);
            }
        }
    }
    Ok(out)
}

pub(crate) fn time_offset_idxs(
    times: &[i64],
    window: TimeDelta,
    offset: TimeDelta,
) -> Result<Vec<Vec<usize>>> {
    if window.has_months() || offset.has_months() {
        return Err(SheafError::invalid(
            "offset windows require fixed-length durations",
        ));
    }
    if offset.nanos <= 0 || window.nanos < offset.nanos {
        return Err(SheafError::invalid(format!(
            "offset window {window} must be at least the offset {offset}"
        )));
    }
    let max_steps = window.nanos / offset.nanos;
    let step_at = |t: i64, steps: i64| {
        offset
            .nanos
            .checked_mul(steps)
            .and_then(|d| t.checked_add(d))
            .ok_or_else(|| SheafError::eval("offset window overflows the timestamp range"))
    };
    let mut out: Vec<Vec<usize>> = (0..times.len()).map(|i| vec![i]).collect();
    for (i, &ti) in times.iter().enumerate() {
        let horizon = ti.saturating_add(window.nanos);
        let mut steps = 0i64;
        let mut last = ti;
        for (j, &tj) in times.iter().enumerate().skip(i + 1) {
            if steps == max_steps && tj > horizon {
                break;
            }
            let gap = tj
                .checked_sub(last)
                .ok_or_else(|| SheafError::eval("offset window overflows the timestamp range"))?;
            if gap < offset.nanos {
                continue;
            }
            if gap == offset.nanos {
                out[j].push(i);
                steps += 1;
                last = step_at(ti, steps)?;
            } else if tj <= horizon {
                steps += gap / offset.nanos;
                last = step_at(ti, steps)?;
                if tj == last {
                    out[j].push(i);
                }
            }
        }
    }
    for idx in &mut out {
        idx.sort_unstable();
    }
    Ok(out)
}

pub(crate) fn group_idxs(keys: &[&Array], sort: bool) -> Result<Vec<Vec<usize>>> {
    let len = key_len(keys)?;
    let mut positions: AHashMap<RowKey, usize> = AHashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for i in 0..len {
        let key = row_key(keys, i);
        match positions.get(&key) {
            Some(&g) => groups[g].push(i),
            None => {
                positions.insert(key, groups.len());
                groups.push(vec![i]);
            }
        }
    }
    if sort {
        groups.sort_by(|a, b| compare_rows(keys, a[0], b[0], false));
    }
    trace!(groups = groups.len(), rows = len, "grouped rows");
    Ok(groups)
}

pub(crate) fn time_groups(times: &[i64], duration: TimeDelta, closed: Closed) -> Result<TimeGroups> {
    if duration.is_zero() || duration.nanos < 0 || duration.months < 0 {
        return Err(SheafError::invalid(format!(
            "group duration must be positive, got {duration}"
        )));
    }
    let mut labels = Vec::new();
    let mut starts = Vec::new();
    if let Some(&first) = times.first() {
        match closed {
            Closed::Left => {
                let mut start = truncate(first, duration)?;
                labels.push(start);
                starts.push(0);
                for (i, &t) in times.iter().enumerate() {
                    if t >= add_delta(start, duration)? {
                        start = truncate(t, duration)?;
                        labels.push(start);
                        starts.push(i);
                    }
                }
            }
            Closed::Right => {
                let back = duration.neg();
                let mut start = truncate(first, duration)?;
                if start == first {
                    start = add_delta(start, back)?;
                }
                labels.push(start);
                starts.push(0);
                for (i, &t) in times.iter().enumerate() {
                    if t > add_delta(start, duration)? {
                        start = truncate(t, duration)?;
                        if start == t {
                            start = add_delta(start, back)?;
                        }
                        labels.push(start);
                        starts.push(i);
                    }
                }
            }
        }
    }
    starts.push(times.len());
    Ok(TimeGroups { labels, starts })
}

/// Right rows are consumed from the back of their group; the first row of
/// the group is reused once it is the only one left.
pub(crate) fn left_join_idx(left: &[&Array], right: &[&Array]) -> Result<Vec<Option<usize>>> {
    if left.len() != right.len() {
        return Err(SheafError::invalid(format!(
            "join needs the same number of keys on both sides, got {} and {}",
            left.len(),
            right.len()
        )));
    }
    check_key_dtypes(left, right)?;
    let left_len = key_len(left)?;
    let right_len = key_len(right)?;
    let mut lookup: AHashMap<RowKey, Vec<usize>> = AHashMap::with_capacity(right_len);
    for i in 0..right_len {
        lookup.entry(row_key(right, i)).or_default().push(i);
    }
    let mut out = Vec::with_capacity(left_len);
    for i in 0..left_len {
        let hit = match lookup.get_mut(&row_key(left, i)) {
            None => None,
            Some(rows) if rows.len() > 1 => rows.pop(),
            Some(rows) => rows.first().copied(),
        };
        out.push(hit);
    }
    Ok(out)
}

/// Union of keys: left keys in first-appearance order (duplicates keep the
/// first row), then right keys not seen on the left. Duplicate right keys
/// keep the last row.
pub(crate) fn outer_join_idx(
    left: &[&Array],
    right: &[&Array],
    sort: bool,
    rev: bool,
) -> Result<OuterJoinIdx> {
    if left.len() != right.len() {
        return Err(SheafError::invalid(format!(
            "join needs the same number of keys on both sides, got {} and {}",
            left.len(),
            right.len()
        )));
    }
    check_key_dtypes(left, right)?;
    let left_len = key_len(left)?;
    let right_len = key_len(right)?;
    let mut rows: AHashMap<RowKey, usize> = AHashMap::with_capacity(left_len + right_len);
    let mut left_idx: Vec<Option<usize>> = Vec::with_capacity(left_len);
    let mut right_idx: Vec<Option<usize>> = Vec::with_capacity(left_len);
    for i in 0..left_len {
        let key = row_key(left, i);
        if rows.contains_key(&key) {
            continue;
        }
        rows.insert(key, left_idx.len());
        left_idx.push(Some(i));
        right_idx.push(None);
    }
    for i in 0..right_len {
        let key = row_key(right, i);
        match rows.get(&key) {
            Some(&row) => right_idx[row] = Some(i),
            None => {
                rows.insert(key, left_idx.len());
                left_idx.push(None);
                right_idx.push(Some(i));
            }
        }
    }
    let mut keys = Vec::with_capacity(left.len());
    for (l, r) in left.iter().zip(right) {
        keys.push(l.take_opt(&left_idx).coalesce(&r.take_opt(&right_idx))?);
    }
    if sort {
        let key_refs: Vec<&Array> = keys.iter().collect();
        let mut order: Vec<usize> = (0..left_idx.len()).collect();
        order.sort_by(|&a, &b| compare_rows(&key_refs, a, b, rev));
        keys = keys.iter().map(|k| k.take(&order)).collect::<Result<_>>()?;
        left_idx = order.iter().map(|&o| left_idx[o]).collect();
        right_idx = order.iter().map(|&o| right_idx[o]).collect();
    }
    trace!(rows = left_idx.len(), sort, rev, "outer join index");
    Ok(OuterJoinIdx {
        keys,
        left_idx,
        right_idx,
    })
}

pub(crate) fn unique_idx(keys: &[&Array], keep: Keep) -> Result<Vec<usize>> {
    let len = key_len(keys)?;
    let mut seen: AHashMap<RowKey, usize> = AHashMap::with_capacity(len);
    let mut order = Vec::new();
    for i in 0..len {
        let key = row_key(keys, i);
        match seen.get_mut(&key) {
            Some(slot) => {
                if keep == Keep::Last {
                    *slot = i;
                }
            }
            None => {
                seen.insert(key, i);
                order.push(i);
            }
        }
    }
    if keep == Keep::First {
        return Ok(order);
    }
    let mut out: Vec<usize> = seen.into_values().collect();
    out.sort_unstable();
    Ok(out)
}

pub(crate) fn sort_idx(keys: &[&Array], rev: bool) -> Result<Vec<usize>> {
    let len = key_len(keys)?;
    let mut order: Vec<usize> = (0..len).collect();
    order.sort_by(|&a, &b| compare_rows(keys, a, b, rev));
    Ok(order)
}
