use std::sync::Arc;

use sheaf::engine::duration::parse_datetime;
use sheaf::expr::registry::FunctionRegistry;
use sheaf::prelude::*;
use sheaf::window::{GroupBy, GroupInfo, Rolling};

fn registry() -> Arc<FunctionRegistry> {
    Arc::new(FunctionRegistry::builtin())
}

fn floats(vals: &[Option<f64>]) -> Vec<Value> {
    vals.iter()
        .map(|v| v.map_or(Value::Null, Value::Float))
        .collect()
}

fn days(stamps: &[&str]) -> Result<Column> {
    let times = stamps
        .iter()
        .map(|d| parse_datetime(d))
        .collect::<Result<Vec<_>>>()?;
    Ok(Column::new("t", Array::datetime(times)))
}

fn eval(column: &Column) -> Result<Column> {
    column.eval(&MemoryEngine::new())
}

#[test]
fn window_strings_parse_to_counts_or_durations() -> Result<()> {
    assert_eq!("3".parse::<Window>()?, Window::Count(3));
    assert_eq!("2d".parse::<Window>()?, Window::Duration(TimeDelta::days(2)));
    assert!("3x".parse::<Window>().is_err());
    Ok(())
}

#[test]
fn offset_window_gathers_whole_steps_back() -> Result<()> {
    let t = days(&["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"])?;
    let a = Column::new("a", vec![1.0, 2.0, 3.0, 4.0]);
    let opts = RollingOptions::offset(TimeDelta::days(2), TimeDelta::days(1), t);
    let rolling = Rolling::new(a, opts, registry())?;
    assert_eq!(rolling.kind(), RollingType::Offset);
    let sums = eval(&rolling.agg(AggMethod::Sum)?)?;
    assert_eq!(
        sums.values()?,
        floats(&[Some(1.0), Some(3.0), Some(6.0), Some(9.0)])
    );
    Ok(())
}

#[test]
fn offset_window_wider_than_the_data_covers_every_step() -> Result<()> {
    let t = days(&["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"])?;
    let a = Column::new("a", vec![1.0, 2.0, 3.0, 4.0]);
    let opts = RollingOptions::offset(TimeDelta::days(100_000), TimeDelta::days(1), t);
    let sums = eval(&Rolling::new(a, opts, registry())?.agg(AggMethod::Sum)?)?;
    assert_eq!(
        sums.values()?,
        floats(&[Some(1.0), Some(3.0), Some(6.0), Some(10.0)])
    );
    Ok(())
}

#[test]
fn offset_window_skips_gaps_that_are_not_whole_steps() -> Result<()> {
    let t = days(&[
        "2024-01-01 00:00:00",
        "2024-01-01 12:00:00",
        "2024-01-02 00:00:00",
    ])?;
    let a = Column::new("a", vec![1.0, 10.0, 100.0]);
    let opts = RollingOptions::offset(TimeDelta::days(1), TimeDelta::days(1), t);
    let sums = eval(&Rolling::new(a, opts, registry())?.agg(AggMethod::Sum)?)?;
    assert_eq!(
        sums.values()?,
        floats(&[Some(1.0), Some(10.0), Some(101.0)])
    );
    Ok(())
}

#[test]
fn offset_windows_reject_calendar_months() -> Result<()> {
    let t = days(&["2024-01-01", "2024-02-01"])?;
    let a = Column::new("a", vec![1.0, 2.0]);
    let opts = RollingOptions::offset("2mo".parse()?, "1mo".parse()?, t);
    let rolling = Rolling::new(a, opts, registry())?;
    assert!(eval(&rolling.agg(AggMethod::Sum)?).is_err());
    Ok(())
}

#[test]
fn duration_start_restarts_at_boundaries() -> Result<()> {
    let t = days(&[
        "2024-01-01 06:00:00",
        "2024-01-01 18:00:00",
        "2024-01-02 06:00:00",
        "2024-01-02 18:00:00",
    ])?;
    let a = Column::new("a", vec![1.0, 2.0, 3.0, 4.0]);
    let full = Rolling::new(
        a.clone(),
        RollingOptions::duration(TimeDelta::days(1), t.clone()),
        registry(),
    )?;
    assert_eq!(
        eval(&full.agg(AggMethod::Sum)?)?.values()?,
        floats(&[Some(1.0), Some(3.0), Some(5.0), Some(7.0)])
    );
    let restarting = Rolling::new(
        a,
        RollingOptions::duration(TimeDelta::days(1), t).start_by(StartBy::DurationStart),
        registry(),
    )?;
    assert_eq!(
        eval(&restarting.agg(AggMethod::Sum)?)?.values()?,
        floats(&[Some(1.0), Some(3.0), Some(3.0), Some(7.0)])
    );
    Ok(())
}

#[test]
fn paired_rolling_reduction_reads_others() -> Result<()> {
    let a = Column::new("a", vec![1.0, 2.0, 3.0, 4.0]);
    let b = Column::new("b", vec![2.0, 4.0, 6.0, 8.0]);
    let rolling = Rolling::new(a, RollingOptions::fixed(3).others([b]), registry())?;
    let corr = eval(&rolling.call("corr")?)?;
    let values = corr.values()?;
    assert_eq!(values.len(), 4);
    match &values[3] {
        Value::Float(v) => assert!((v - 1.0).abs() < 1e-12),
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn precomputed_starts_drive_a_rolling_window() -> Result<()> {
    let a = Column::new("a", vec![1.0, 2.0, 3.0]);
    let starts = Column::unnamed(Array::Usize(vec![0, 0, 2]));
    let rolling = Rolling::new(a, RollingOptions::with_idx(starts, None), registry())?;
    assert_eq!(rolling.kind(), RollingType::Start);
    assert_eq!(
        eval(&rolling.agg(AggMethod::Max)?)?.values()?,
        floats(&[Some(1.0), Some(2.0), Some(3.0)])
    );
    Ok(())
}

#[test]
fn right_closed_time_groups_label_left_edges() -> Result<()> {
    let t = days(&[
        "2024-01-01 00:00:00",
        "2024-01-01 12:00:00",
        "2024-01-02 00:00:00",
    ])?;
    let v = Column::new("v", vec![1.0, 2.0, 4.0]);
    let opts = GroupByOptions::duration(TimeDelta::days(1), t).closed(Closed::Right);
    let group = GroupBy::new(v, opts, registry())?;
    assert_eq!(group.kind(), GroupByType::Time);
    let labels = group.labels()?.expect("computed labels");
    let expected: Vec<Value> = ["2023-12-31", "2024-01-01"]
        .iter()
        .map(|d| parse_datetime(d).map(Value::DateTime))
        .collect::<Result<_>>()?;
    assert_eq!(eval(&labels)?.values()?, expected);
    assert_eq!(
        eval(&group.agg(AggMethod::Sum)?)?.values()?,
        floats(&[Some(1.0), Some(6.0)])
    );
    Ok(())
}

#[test]
fn precomputed_group_idxs_skip_key_planning() -> Result<()> {
    let v = Column::new("v", vec![1.0, 2.0, 3.0, 4.0]);
    let idxs = Column::unnamed(Array::VecUsize(vec![vec![3, 0], vec![1, 2]]));
    let group = GroupBy::new(v, GroupByOptions::with_idxs(idxs, GroupByType::Default), registry())?;
    assert!(matches!(group.info(), GroupInfo::Idxs(_)));
    assert_eq!(
        eval(&group.call("last")?)?.values()?,
        floats(&[Some(1.0), Some(3.0)])
    );
    Ok(())
}

#[test]
fn selector_ts_methods_resolve_to_rolling_windows() -> Result<()> {
    let frame = Frame::from_pairs([("a", Array::from(vec![1.0, 2.0, 3.0, 4.0]))]);
    let out = frame
        .select([s("a").ts("mean", 2).alias("sma")])?
        .eval()?;
    assert_eq!(
        out.column("sma")?.values()?,
        floats(&[Some(1.0), Some(1.5), Some(2.5), Some(3.5)])
    );
    Ok(())
}

#[test]
fn zero_length_fixed_window_is_a_config_error() {
    let frame = Frame::from_pairs([("a", Array::from(vec![1.0]))]);
    assert!(matches!(
        frame.rolling(RollingOptions::fixed(0)),
        Err(SheafError::Config(_))
    ));
}
