use sheaf::prelude::*;
use sheaf::selector::Resolved;

fn frame() -> Frame {
    Frame::from_pairs([
        ("open", Array::from(vec![1.0, 4.0, 2.0])),
        ("close", Array::from(vec![2.0, 3.0, 5.0])),
        ("volume", Array::from(vec![100i64, 200, 300])),
    ])
}

fn floats(vals: &[f64]) -> Vec<Value> {
    vals.iter().copied().map(Value::Float).collect()
}

#[test]
fn arithmetic_selectors_resolve_against_a_frame() -> Result<()> {
    let body = (s("close") - s("open")).alias("body");
    let out = frame().with_columns([body])?.eval()?;
    assert_eq!(out.names(), vec!["open", "close", "volume", "body"]);
    assert_eq!(out.column("body")?.values()?, floats(&[1.0, -1.0, 3.0]));
    Ok(())
}

#[test]
fn reflected_scalars_and_negation() -> Result<()> {
    let out = frame()
        .select([(10.0 - s("open")).alias("gap"), (-s("close")).alias("neg")])?
        .eval()?;
    assert_eq!(out.column("gap")?.values()?, floats(&[9.0, 6.0, 8.0]));
    assert_eq!(out.column("neg")?.values()?, floats(&[-2.0, -3.0, -5.0]));
    Ok(())
}

#[test]
fn regex_and_list_bases_fan_out() -> Result<()> {
    let frame = frame();
    match s("^(open|close)$").abs().resolve(&frame)? {
        Resolved::Many(cols) => {
            let names: Vec<_> = cols.iter().filter_map(Column::name).collect();
            assert_eq!(names, vec!["open", "close"]);
        }
        other => panic!("unexpected {other:?}"),
    }
    let out = frame.select([s_many(["volume", "open"])])?;
    assert_eq!(out.names(), vec!["volume", "open"]);
    let positional = frame.select([s_at(2)])?;
    assert_eq!(positional.names(), vec!["volume"]);
    Ok(())
}

#[test]
fn module_functions_take_selector_lists() -> Result<()> {
    let out = frame()
        .select([hmax(vec![s("open"), s("close")])?.alias("hi")])?
        .eval()?;
    assert_eq!(out.column("hi")?.values()?, floats(&[2.0, 4.0, 5.0]));
    Ok(())
}

#[test]
fn comparisons_build_masks() -> Result<()> {
    let frame = frame();
    let mask = s("close").gt(s("open"));
    let out = frame.filter(mask)?.eval()?;
    assert_eq!(
        out.column("volume")?.values()?,
        vec![Value::Int(100), Value::Int(300)]
    );
    Ok(())
}

#[test]
fn display_is_a_readable_call_chain() {
    let sel = (s("close") - s("open")).alias("body").mean();
    assert_eq!(
        sel.to_string(),
        "s(`close`).__sub__(s(`open`)).alias(\"body\").mean()"
    );
    assert_eq!(s_at(1).sum().to_string(), "s(#1).sum()");
}

#[test]
fn misuse_surfaces_as_selector_errors() {
    let frame = frame();
    let pending = Selector::module("hmax");
    match pending.resolve(&frame) {
        Err(SheafError::Selector(msg)) => {
            assert_eq!(msg, "mod_func should not be used before a function call")
        }
        other => panic!("unexpected {other:?}"),
    }
    let dangling = s("open").call0();
    assert!(matches!(dangling.resolve(&frame), Err(SheafError::Selector(_))));
    let unbound = Selector::new().sum();
    assert!(matches!(unbound.resolve(&frame), Err(SheafError::Selector(_))));
    let unknown = s("open").method("no_such_method", SelectorArgs::default());
    assert!(unknown.resolve(&frame).is_err());
    assert!(s("missing").resolve(&frame).is_err());
}

#[test]
fn unbound_selectors_bind_inside_windows() -> Result<()> {
    let frame = frame();
    let out = frame
        .rolling(RollingOptions::fixed(2))?
        .apply([Selector::new().max().alias("hi"), s("volume").sum()])?
        .eval()?;
    assert_eq!(out.names(), vec!["hi", "volume"]);
    assert_eq!(out.column("hi")?.values()?, floats(&[1.0, 4.0, 4.0]));
    assert_eq!(
        out.column("volume")?.values()?,
        vec![Value::Int(100), Value::Int(300), Value::Int(500)]
    );
    Ok(())
}
