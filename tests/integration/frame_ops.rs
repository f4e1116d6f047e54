use std::sync::Arc;

use sheaf::engine::duration::parse_datetime;
use sheaf::prelude::*;
use sheaf::window::GroupKeys;

fn values(frame: &Frame, name: &str) -> Result<Vec<Value>> {
    frame.column(name)?.values()
}

fn grouped() -> Frame {
    Frame::from_pairs([
        ("v", Array::from(vec![1i64, 2, 3, 4, 5])),
        ("g", Array::from(vec!["a", "b", "a", "a", "c"])),
    ])
}

#[test]
fn groupby_shorthand_and_keys_in_first_occurrence_order() -> Result<()> {
    let out = grouped()
        .groupby(GroupByOptions::keys(["g"]).sort(false))?
        .agg(Vec::<ColumnExpr>::new(), &[AggSpec::parse("v", "max")?])?
        .eval()?;
    assert_eq!(out.names(), vec!["v", "g"]);
    assert_eq!(
        values(&out, "v")?,
        vec![Value::Int(4), Value::Int(2), Value::Int(5)]
    );
    assert_eq!(
        values(&out, "g")?,
        vec![Value::from("a"), Value::from("b"), Value::from("c")]
    );
    Ok(())
}

#[test]
fn groupby_sorted_keys_and_body_expressions() -> Result<()> {
    let frame = Frame::from_pairs([
        ("v", Array::from(vec![1.0, 2.0, 3.0, 4.0, 5.0])),
        ("g", Array::from(vec!["b", "a", "b", "b", "a"])),
    ]);
    let out = frame
        .groupby(GroupByOptions::keys(["g"]))?
        .agg(
            [Selector::new().mean().alias("v_mean"), s("v").count().alias("n")],
            &[],
        )?
        .eval()?;
    assert_eq!(out.names(), vec!["v_mean", "n", "g"]);
    assert_eq!(values(&out, "g")?, vec![Value::from("a"), Value::from("b")]);
    assert_eq!(
        values(&out, "v_mean")?,
        vec![Value::Float(3.5), Value::Float(8.0 / 3.0)]
    );
    assert_eq!(values(&out, "n")?, vec![Value::Int(2), Value::Int(3)]);
    Ok(())
}

#[test]
fn key_shorthand_is_replaced_by_first_value() -> Result<()> {
    let out = grouped()
        .groupby(GroupByOptions::keys(["g"]).sort(false))?
        .agg(
            Vec::<ColumnExpr>::new(),
            &[AggSpec::new("g", AggMethod::Count), AggSpec::new("v", AggMethod::Sum)],
        )?
        .eval()?;
    assert_eq!(out.names(), vec!["g", "v"]);
    assert_eq!(
        values(&out, "g")?,
        vec![Value::from("a"), Value::from("b"), Value::from("c")]
    );
    assert_eq!(
        values(&out, "v")?,
        vec![Value::Int(8), Value::Int(2), Value::Int(5)]
    );
    Ok(())
}

#[test]
fn time_groupby_appends_bucket_labels() -> Result<()> {
    let times = [
        "2024-01-01 00:00:00",
        "2024-01-01 12:00:00",
        "2024-01-02 01:00:00",
        "2024-01-03 05:00:00",
    ]
    .iter()
    .map(|t| parse_datetime(t))
    .collect::<Result<Vec<_>>>()?;
    let frame = Frame::from_pairs([
        ("t", Array::datetime(times)),
        ("v", Array::from(vec![1.0, 2.0, 3.0, 4.0])),
    ]);
    let out = frame
        .groupby(GroupByOptions::duration(TimeDelta::days(1), "t"))?
        .agg([s("v").sum()], &[])?
        .eval()?;
    assert_eq!(out.names(), vec!["v", "t"]);
    assert_eq!(
        values(&out, "v")?,
        vec![Value::Float(3.0), Value::Float(3.0), Value::Float(4.0)]
    );
    let labels: Vec<Value> = ["2024-01-01", "2024-01-02", "2024-01-03"]
        .iter()
        .map(|d| parse_datetime(d).map(Value::DateTime))
        .collect::<Result<_>>()?;
    assert_eq!(values(&out, "t")?, labels);

    let unlabeled = frame
        .groupby(GroupByOptions::duration(TimeDelta::days(1), "t").label(false))?
        .agg([s("v").sum()], &[])?;
    assert_eq!(unlabeled.names(), vec!["v"]);
    Ok(())
}

#[test]
fn groupby_option_conflicts_are_config_errors() {
    let both = GroupByOptions {
        idxs: Some(Column::unnamed(Array::VecUsize(vec![vec![0]]))),
        ..GroupByOptions::keys(["g"])
    };
    assert!(matches!(grouped().groupby(both), Err(SheafError::Config(_))));
    let neither = GroupByOptions {
        by: None,
        ..GroupByOptions::default()
    };
    assert!(matches!(grouped().groupby(neither), Err(SheafError::Config(_))));
    let step = GroupByOptions {
        by: Some(GroupKeys::Step(2)),
        ..GroupByOptions::default()
    };
    let planned = grouped().groupby(step).expect("step grouping is tagged");
    assert!(matches!(
        planned.agg(Vec::<ColumnExpr>::new(), &[AggSpec::new("v", AggMethod::Sum)]),
        Err(SheafError::NotImplemented(_))
    ));
}

#[test]
fn frame_rolling_skips_the_time_column() -> Result<()> {
    let times = (0..4)
        .map(|d| parse_datetime(&format!("2024-03-0{} 00:00:00", d + 1)))
        .collect::<Result<Vec<_>>>()?;
    let frame = Frame::from_pairs([
        ("t", Array::datetime(times)),
        ("a", Array::from(vec![1.0, 2.0, 3.0, 4.0])),
        ("b", Array::from(vec![4.0, 3.0, 2.0, 1.0])),
    ]);
    let out = frame
        .rolling(RollingOptions::duration(TimeDelta::days(2), "t"))?
        .agg(AggMethod::Sum, AggOptions::default())?
        .eval()?;
    assert_eq!(out.names(), vec!["a", "b"]);
    assert_eq!(
        values(&out, "a")?,
        vec![
            Value::Float(1.0),
            Value::Float(3.0),
            Value::Float(5.0),
            Value::Float(7.0)
        ]
    );
    Ok(())
}

#[test]
fn frame_rolling_apply_sees_every_column() -> Result<()> {
    let frame = Frame::from_pairs([
        ("a", Array::from(vec![1.0, 2.0, 3.0])),
        ("b", Array::from(vec![10.0, 20.0, 30.0])),
    ]);
    let out = frame
        .rolling(RollingOptions::fixed(2))?
        .apply([(s("a") + s("b")).sum().alias("ab")])?
        .eval()?;
    assert_eq!(
        values(&out, "ab")?,
        vec![Value::Float(11.0), Value::Float(33.0), Value::Float(55.0)]
    );
    Ok(())
}

#[test]
fn structural_edits_leave_the_source_untouched() -> Result<()> {
    let session = Session::default().shared();
    let frame = Frame::new(
        vec![
            Column::new("a", vec![1i64, 2]),
            Column::unnamed(vec![3i64, 4]),
        ],
        Arc::clone(&session),
        true,
    );
    assert_eq!(frame.names(), vec!["a", "column_0"]);
    let renamed = frame.rename(Renames::List(vec!["x".into(), "y".into()]))?;
    let dropped = renamed.drop(["x"])?;
    assert_eq!(frame.names(), vec!["a", "column_0"]);
    assert_eq!(dropped.names(), vec!["y"]);

    let mut edited = frame.clone();
    edited.set_many(vec!["a", "b"], vec![Column::scalar(0i64), Column::unnamed(vec![7i64, 8])])?;
    assert_eq!(edited.names(), vec!["a", "column_0", "b"]);
    assert!(matches!(
        edited.set(9usize, Column::scalar(1i64)),
        Err(SheafError::OutOfBounds { index: 9, len: 3 })
    ));
    assert_eq!(values(&frame.eval()?, "a")?, vec![Value::Int(1), Value::Int(2)]);
    Ok(())
}

#[test]
fn filter_and_slice_apply_to_every_column() -> Result<()> {
    let frame = Frame::from_pairs([
        ("a", Array::from(vec![1i64, 5, 3, 7])),
        ("b", Array::from(vec!["w", "x", "y", "z"])),
    ]);
    let a = frame.column("a")?;
    let out = frame.filter(a.gt(2i64))?.eval()?;
    assert_eq!(
        values(&out, "b")?,
        vec![Value::from("x"), Value::from("y"), Value::from("z")]
    );
    let sliced = frame.slice(1, 3).eval()?;
    assert_eq!(values(&sliced, "a")?, vec![Value::Int(5), Value::Int(3)]);
    Ok(())
}
