use sheaf::prelude::*;

fn values(frame: &Frame, name: &str) -> Result<Vec<Value>> {
    frame.column(name)?.values()
}

fn ints(vals: &[Option<i64>]) -> Vec<Value> {
    vals.iter()
        .map(|v| v.map_or(Value::Null, Value::Int))
        .collect()
}

fn left() -> Frame {
    Frame::from_pairs([
        ("on", Array::from(vec!["a", "b", "a", "c"])),
        ("va", Array::from(vec![1i64, 2, 3, 4])),
    ])
}

fn right() -> Frame {
    Frame::from_pairs([
        ("on", Array::from(vec!["b", "b", "c"])),
        ("vb", Array::from(vec![10i64, 20, 30])),
    ])
}

#[test]
fn left_join_keeps_left_rows_and_last_right_match() -> Result<()> {
    let joined = left().join(&right(), JoinOptions::on(["on"]))?.eval()?;
    assert_eq!(joined.names(), vec!["on", "va", "vb"]);
    assert_eq!(values(&joined, "va")?, ints(&[Some(1), Some(2), Some(3), Some(4)]));
    assert_eq!(values(&joined, "vb")?, ints(&[None, Some(20), None, Some(30)]));
    Ok(())
}

#[test]
fn outer_join_coalesces_keys_and_sorts() -> Result<()> {
    let joined = left()
        .join(&right(), JoinOptions::on(["on"]).how(JoinHow::Outer))?
        .eval()?;
    assert_eq!(joined.names(), vec!["va", "on", "vb"]);
    assert_eq!(
        values(&joined, "on")?,
        vec![Value::from("a"), Value::from("b"), Value::from("c")]
    );
    assert_eq!(values(&joined, "va")?, ints(&[Some(1), Some(2), Some(4)]));
    assert_eq!(values(&joined, "vb")?, ints(&[None, Some(20), Some(30)]));
    Ok(())
}

#[test]
fn outer_join_without_sort_keeps_encounter_order() -> Result<()> {
    let l = Frame::from_pairs([
        ("k", Array::from(vec![3i64, 1])),
        ("x", Array::from(vec![30i64, 10])),
    ]);
    let r = Frame::from_pairs([
        ("k", Array::from(vec![2i64, 3])),
        ("y", Array::from(vec![200i64, 300])),
    ]);
    let joined = l
        .join(&r, JoinOptions::on(["k"]).how(JoinHow::Outer).sort(false))?
        .eval()?;
    assert_eq!(values(&joined, "k")?, ints(&[Some(3), Some(1), Some(2)]));
    assert_eq!(values(&joined, "x")?, ints(&[Some(30), Some(10), None]));
    assert_eq!(values(&joined, "y")?, ints(&[Some(300), None, Some(200)]));
    Ok(())
}

#[test]
fn right_join_mirrors_left_join() -> Result<()> {
    let joined = left()
        .join(&right(), JoinOptions::on(["on"]).how("right".parse()?))?
        .eval()?;
    assert_eq!(joined.names(), vec!["on", "vb", "va"]);
    assert_eq!(values(&joined, "va")?, ints(&[Some(2), Some(2), Some(4)]));
    Ok(())
}

#[test]
fn join_keys_must_pair_up() {
    let opts = JoinOptions::left_right(vec!["on"], vec![]);
    assert!(matches!(
        left().join(&right(), opts),
        Err(SheafError::InvalidArgument(_))
    ));
    assert!(matches!(
        left().join(&right(), JoinOptions::on(["on"]).how(JoinHow::Inner)),
        Err(SheafError::NotImplemented(_))
    ));
}

#[test]
fn join_keys_of_different_dtypes_are_rejected() {
    let l = Frame::from_pairs([
        ("k", Array::from(vec![1i64, 2])),
        ("va", Array::from(vec![10i64, 20])),
    ]);
    let r = Frame::from_pairs([
        ("k", Array::from(vec![1.0, 2.0])),
        ("vb", Array::from(vec![100i64, 200])),
    ]);
    for how in [JoinHow::Left, JoinHow::Outer] {
        match l.join(&r, JoinOptions::on(["k"]).how(how)).and_then(|f| f.eval()) {
            Err(SheafError::TypeMismatch { expected, found }) => {
                assert_eq!((expected.as_str(), found.as_str()), ("i64", "f64"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn outer_join_right_columns_replace_same_named_left_columns() -> Result<()> {
    let l = Frame::from_pairs([
        ("k", Array::from(vec![1i64, 2])),
        ("v", Array::from(vec![10i64, 20])),
    ]);
    let r = Frame::from_pairs([
        ("k", Array::from(vec![2i64, 3])),
        ("v", Array::from(vec![200i64, 300])),
    ]);
    let outer = l
        .join(&r, JoinOptions::on(["k"]).how(JoinHow::Outer))?
        .eval()?;
    assert_eq!(outer.names(), vec!["v", "k"]);
    assert_eq!(values(&outer, "k")?, ints(&[Some(1), Some(2), Some(3)]));
    assert_eq!(values(&outer, "v")?, ints(&[None, Some(200), Some(300)]));

    let left = l.join(&r, JoinOptions::on(["k"]))?.eval()?;
    assert_eq!(left.names(), vec!["k", "v"]);
    assert_eq!(values(&left, "v")?, ints(&[None, Some(200)]));
    Ok(())
}

#[test]
fn eager_join_is_materialized() -> Result<()> {
    let joined = left().join(&right(), JoinOptions::on(["on"]).eager(true))?;
    assert!(joined.columns().iter().all(Column::is_materialized));
    Ok(())
}

fn three_frames() -> Vec<Frame> {
    vec![
        Frame::from_pairs([
            ("k", Array::from(vec![1i64, 2])),
            ("v", Array::from(vec![10i64, 20])),
        ]),
        Frame::from_pairs([
            ("k", Array::from(vec![3i64, 2])),
            ("v", Array::from(vec![300i64, 200])),
        ]),
        Frame::from_pairs([
            ("k", Array::from(vec![4i64, 1])),
            ("v", Array::from(vec![4000i64, 1000])),
        ]),
    ]
}

#[test]
fn three_way_alignment_fills_missing_keys_with_nulls() -> Result<()> {
    let aligned = align_frames(&three_frames(), ["k"], AlignOptions::default())?;
    assert_eq!(aligned.len(), 3);
    let evaluated = aligned
        .iter()
        .map(Frame::eval)
        .collect::<Result<Vec<_>>>()?;
    for frame in &evaluated {
        assert_eq!(values(frame, "k")?, ints(&[Some(1), Some(2), Some(3), Some(4)]));
    }
    assert_eq!(
        values(&evaluated[0], "v")?,
        ints(&[Some(10), Some(20), None, None])
    );
    assert_eq!(
        values(&evaluated[1], "v")?,
        ints(&[None, Some(200), Some(300), None])
    );
    assert_eq!(
        values(&evaluated[2], "v")?,
        ints(&[Some(1000), None, None, Some(4000)])
    );
    Ok(())
}

#[test]
fn index_alignment_matches_frame_alignment() -> Result<()> {
    let frames = three_frames();
    let aligned = get_align_frames_idx(&frames, ["k"], true, false)?;
    assert_eq!(aligned.idxs.len(), 3);
    let session = Session::default();
    let keys = session.eval(&aligned.keys)?;
    assert_eq!(keys[0].values()?, ints(&[Some(1), Some(2), Some(3), Some(4)]));

    let frame_view = align_frames(&frames, ["k"], AlignOptions::default())?;
    for (frame, (source, idx)) in frame_view.iter().zip(frames.iter().zip(&aligned.idxs)) {
        let expected = source.column("v")?.take_unchecked(idx);
        let got = session.eval(&[expected, frame.column("v")?])?;
        assert_eq!(got[0].values()?, got[1].values()?);
    }
    Ok(())
}

#[test]
fn descending_alignment() -> Result<()> {
    let opts = AlignOptions {
        rev: true,
        ..AlignOptions::default()
    };
    let aligned = align_frames(&three_frames(), ["k"], opts)?;
    let first = aligned[0].eval()?;
    assert_eq!(values(&first, "k")?, ints(&[Some(4), Some(3), Some(2), Some(1)]));
    assert_eq!(values(&first, "v")?, ints(&[None, None, Some(20), Some(10)]));
    Ok(())
}
