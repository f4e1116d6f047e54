use proptest::prelude::*;
use sheaf::prelude::*;
use std::collections::BTreeSet;

fn arb_keys(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..6, 1..=max_len)
}

fn arb_unique_keys() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::btree_set(0i64..20, 1..10)
        .prop_map(|keys| keys.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

fn arb_floats(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-100.0f64..100.0, len)
}

fn keyed(keys: &[i64], tag: i64) -> Frame {
    let vals: Vec<i64> = (0..keys.len() as i64).map(|i| i + tag).collect();
    Frame::from_pairs([
        ("k", Array::from(keys.to_vec())),
        ("v", Array::from(vals)),
    ])
}

fn ints(values: Vec<Value>) -> Vec<Option<i64>> {
    values
        .into_iter()
        .map(|v| match v {
            Value::Int(i) => Some(i),
            Value::Null => None,
            other => panic!("unexpected {other:?}"),
        })
        .collect()
}

fn int_column(frame: &Frame, name: &str) -> Vec<Option<i64>> {
    ints(frame.column(name).unwrap().values().unwrap())
}

fn rows(frame: &Frame) -> BTreeSet<(Option<i64>, Option<i64>, Option<i64>)> {
    let k = int_column(frame, "k");
    let a = int_column(frame, "a");
    let b = int_column(frame, "b");
    k.into_iter()
        .zip(a)
        .zip(b)
        .map(|((k, a), b)| (k, a, b))
        .collect()
}

proptest! {
    #[test]
    fn prop_self_left_join_is_identity(keys in arb_unique_keys()) {
        let frame = keyed(&keys, 0);
        let joined = frame.join(&frame, JoinOptions::on(["k"])).unwrap().eval().unwrap();
        prop_assert_eq!(int_column(&joined, "k"), int_column(&frame, "k"));
        prop_assert_eq!(int_column(&joined, "v"), int_column(&frame, "v"));
    }

    #[test]
    fn prop_outer_join_is_commutative_in_content(
        left in arb_unique_keys(),
        right in arb_unique_keys(),
    ) {
        let l = keyed(&left, 0).rename(Renames::List(vec!["k".into(), "a".into()])).unwrap();
        let r = keyed(&right, 100).rename(Renames::List(vec!["k".into(), "b".into()])).unwrap();
        let outer = JoinOptions::on(["k"]).how(JoinHow::Outer);
        let lr = l.join(&r, outer.clone()).unwrap().eval().unwrap();
        let rl = r.join(&l, outer).unwrap().eval().unwrap();
        prop_assert_eq!(rows(&lr), rows(&rl));
    }

    #[test]
    fn prop_left_join_preserves_left_rows(left in arb_keys(12), right in arb_keys(12)) {
        let joined = keyed(&left, 0)
            .join(&keyed(&right, 100).rename(Renames::Map(vec![("v".into(), "w".into())])).unwrap(),
                JoinOptions::on(["k"]))
            .unwrap()
            .eval()
            .unwrap();
        let expected_v: Vec<Option<i64>> = (0..left.len() as i64).map(Some).collect();
        prop_assert_eq!(int_column(&joined, "v"), expected_v);
        let w = int_column(&joined, "w");
        for (key, matched) in left.iter().zip(&w) {
            match matched {
                Some(row) => prop_assert_eq!(right[(*row - 100) as usize], *key),
                None => prop_assert!(!right.contains(key)),
            }
        }
    }

    #[test]
    fn prop_outer_join_keys_are_the_sorted_union(left in arb_keys(12), right in arb_keys(12)) {
        let joined = keyed(&left, 0)
            .join(&keyed(&right, 100), JoinOptions::on(["k"]).how(JoinHow::Outer))
            .unwrap()
            .eval()
            .unwrap();
        let union: BTreeSet<i64> = left.iter().chain(&right).copied().collect();
        let keys: Vec<Option<i64>> = union.into_iter().map(Some).collect();
        prop_assert_eq!(int_column(&joined, "k"), keys);
    }

    #[test]
    fn prop_unique_is_idempotent(keys in arb_keys(20), keep_last in any::<bool>()) {
        let keep = if keep_last { Keep::Last } else { Keep::First };
        let once = keyed(&keys, 0).unique(["k"], keep).unwrap().eval().unwrap();
        let twice = once.unique(["k"], keep).unwrap().eval().unwrap();
        let distinct: BTreeSet<i64> = keys.iter().copied().collect();
        prop_assert_eq!(once.height(), Some(distinct.len()));
        prop_assert_eq!(int_column(&once, "v"), int_column(&twice, "v"));
    }

    #[test]
    fn prop_sort_orders_a_permutation(keys in arb_keys(20), rev in any::<bool>()) {
        let sorted = keyed(&keys, 0).sort(["k"], rev).unwrap().eval().unwrap();
        let out: Vec<i64> = int_column(&sorted, "k").into_iter().flatten().collect();
        let mut expected = keys.clone();
        expected.sort_unstable();
        if rev {
            expected.reverse();
        }
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn prop_fixed_window_sum_matches_naive(
        (values, window) in (1usize..16).prop_flat_map(|n| (arb_floats(n), 1usize..=n))
    ) {
        let frame = Frame::from_pairs([("a", Array::from(values.clone()))]);
        let out = frame
            .rolling(RollingOptions::fixed(window))
            .unwrap()
            .agg(AggMethod::Sum, AggOptions::default())
            .unwrap()
            .eval()
            .unwrap();
        let got = out.column("a").unwrap().values().unwrap();
        for (i, value) in got.iter().enumerate() {
            let start = (i + 1).saturating_sub(window);
            let naive: f64 = values[start..=i].iter().sum();
            match value {
                Value::Float(v) => prop_assert!((v - naive).abs() < 1e-9),
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn prop_fixed_window_nulls_below_min_periods(
        (len, window, min_periods) in (1usize..16)
            .prop_flat_map(|n| (Just(n), 1usize..=n))
            .prop_flat_map(|(n, w)| (Just(n), Just(w), 1usize..=w))
    ) {
        let values: Vec<f64> = (0..len).map(|i| i as f64).collect();
        let a = Column::new("a", values);
        let out = sheaf::window::Rolling::new(
            a,
            RollingOptions::fixed(window),
            std::sync::Arc::clone(Session::default().registry()),
        )
        .unwrap()
        .agg_with(AggMethod::Sum, AggOptions::min_periods(min_periods))
        .unwrap()
        .eval(&MemoryEngine::new())
        .unwrap();
        for (i, value) in out.values().unwrap().iter().enumerate() {
            let span = i + 1 - (i + 1).saturating_sub(window);
            prop_assert_eq!(value.is_null(), span < min_periods);
        }
    }

    #[test]
    fn prop_index_alignment_agrees_with_frame_alignment(
        a in arb_keys(6),
        b in arb_keys(6),
        c in arb_keys(6),
    ) {
        let dedup = |keys: &[i64], tag: i64| keyed(keys, tag).unique(["k"], Keep::First).unwrap();
        let frames = vec![dedup(&a, 0), dedup(&b, 100), dedup(&c, 1000)];
        let aligned = align_frames(&frames, ["k"], AlignOptions::default()).unwrap();
        let index = get_align_frames_idx(&frames, ["k"], true, false).unwrap();
        let session = Session::default();
        for ((frame, source), idx) in aligned.iter().zip(&frames).zip(&index.idxs) {
            let via_index = source.column("v").unwrap().take_unchecked(idx);
            let got = session.eval(&[via_index, frame.column("v").unwrap()]).unwrap();
            prop_assert_eq!(ints(got[0].values().unwrap()), ints(got[1].values().unwrap()));
        }
        let union: BTreeSet<i64> = a.iter().chain(&b).chain(&c).copied().collect();
        let keys = session.eval(&index.keys).unwrap();
        let expected: Vec<Option<i64>> = union.into_iter().map(Some).collect();
        prop_assert_eq!(ints(keys[0].values().unwrap()), expected);
    }

    #[test]
    fn prop_dropna_leaves_no_nulls(mask in prop::collection::vec(any::<bool>(), 1..20)) {
        let data: Vec<Option<i64>> = mask
            .iter()
            .enumerate()
            .map(|(i, keep)| keep.then_some(i as i64))
            .collect();
        let frame = Frame::from_pairs([("a", Array::from(data))]);
        let out = frame.dropna(Vec::<ColumnKey>::new(), DropHow::Any).unwrap().eval().unwrap();
        let got = int_column(&out, "a");
        prop_assert_eq!(got.len(), mask.iter().filter(|m| **m).count());
        prop_assert!(got.iter().all(Option::is_some));
    }
}
