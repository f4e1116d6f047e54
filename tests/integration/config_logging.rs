use std::fs;
use std::sync::Arc;

use sheaf::logging::init_logging;
use sheaf::prelude::*;
use sheaf::Config;

const CUSTOM: &str = r#"
[naming]
auto_prefix = "c"

[join]
sort = false

[align]
suffix = "__al"

[logging]
filter = "sheaf=debug"
"#;

#[test]
fn config_file_overrides_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sheaf.toml");
    fs::write(&path, CUSTOM)?;
    let config = Config::load(&path)?;
    assert_eq!(config.naming.auto_prefix, "c");
    assert!(!config.join.sort);
    assert!(config.join.simplify);
    assert_eq!(config.align.suffix, "__al");
    assert_eq!(config.logging.filter, "sheaf=debug");
    Ok(())
}

#[test]
fn missing_and_malformed_files_are_errors() -> Result<()> {
    let dir = tempfile::tempdir()?;
    assert!(matches!(
        Config::load(dir.path().join("absent.toml")),
        Err(SheafError::Io(_))
    ));
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[naming\nauto_prefix = 1")?;
    assert!(matches!(Config::load(&path), Err(SheafError::Toml(_))));
    assert!(matches!(
        Config::from_toml_str("[align]\nsuffix = \"\""),
        Err(SheafError::Config(_))
    ));
    Ok(())
}

#[test]
fn session_config_reaches_frame_operations() -> Result<()> {
    let session = Session::with_config(Config::from_toml_str(CUSTOM)?).shared();
    let frame = Frame::new(
        vec![Column::new("k", vec![3i64, 1]), Column::unnamed(vec![30i64, 10])],
        Arc::clone(&session),
        true,
    );
    assert_eq!(frame.names(), vec!["k", "c0"]);

    let other = Frame::new(
        vec![Column::new("k", vec![2i64]), Column::new("w", vec![200i64])],
        Arc::clone(&session),
        true,
    );
    let joined = frame
        .join(&other, JoinOptions::on(["k"]).how(JoinHow::Outer))?
        .eval()?;
    assert_eq!(
        joined.column("k")?.values()?,
        vec![Value::Int(3), Value::Int(1), Value::Int(2)]
    );

    let acc = sheaf::join::align_frames_outer(
        &[frame, other],
        ["k"],
        AlignOptions::default(),
    )?;
    assert_eq!(acc.names(), vec!["c0__al0", "k", "w__al1"]);
    Ok(())
}

#[test]
fn logging_initializes_once() {
    assert!(matches!(
        init_logging("sheaf=notalevel"),
        Err(SheafError::Config(_))
    ));
    init_logging("sheaf=trace").expect("first init");
    match init_logging("warn") {
        Err(SheafError::Config(msg)) => assert_eq!(msg, "Logging already initialized"),
        other => panic!("unexpected {other:?}"),
    }
    let frame = Frame::from_pairs([("a", Array::from(vec![1i64, 2]))]);
    frame.eval().expect("evaluation under an active subscriber");
}
