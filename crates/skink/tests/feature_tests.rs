use skink::{
    Engine, Era, ErrorCategory, FeatureControl, FeatureTag, HostArray, HostValue, InterpreterOptions, RunOptions,
    era_preset, merge_presets,
};

fn era_engine(era: Era) -> Engine {
    Engine::new(era_preset(era))
}

/// Under the ES5 preset, `let` fails with a feature error naming the tag.
#[test]
fn es5_rejects_let_const() {
    let err = era_engine(Era::Es5).evaluate("let x = 1;", RunOptions::default()).unwrap_err();
    assert_eq!(err.category, ErrorCategory::Feature);
    assert!(err.message.contains("LetConst"), "{}", err.message);
    assert!(err.header().starts_with("Feature[E2001]"), "{}", err.header());
}

#[test]
fn es5_still_runs_es5_code() {
    let engine = era_engine(Era::Es5);
    assert_eq!(
        engine
            .evaluate("var total = 0; for (var k in {a: 1, b: 2}) { total += 1; } total", RunOptions::default())
            .unwrap(),
        HostValue::Number(2.0)
    );
}

#[test]
fn era_progression_unlocks_features() {
    // Exponentiation arrived in ES2016.
    let err = era_engine(Era::Es2015).evaluate("2 ** 3", RunOptions::default()).unwrap_err();
    assert_eq!(err.category, ErrorCategory::Feature);
    assert_eq!(era_engine(Era::Es2016).evaluate("2 ** 3", RunOptions::default()).unwrap(), HostValue::Number(8.0));

    // Optional chaining arrived in ES2020.
    let err = era_engine(Era::Es2019)
        .evaluate("const o = null; o?.x", RunOptions::default())
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::Feature);
    assert_eq!(
        era_engine(Era::Es2020).evaluate("const o = null; o?.x", RunOptions::default()).unwrap(),
        HostValue::Undefined
    );

    // Static blocks arrived in ES2022.
    let err = era_engine(Era::Es2021)
        .evaluate("class C { static { } }", RunOptions::default())
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::Feature);
}

/// Feature gating happens before any side effect of the gated node.
#[test]
fn gating_is_pre_effect() {
    let log = HostArray::new(Vec::new());
    let mut options = era_preset(Era::Es2015);
    options.globals.insert("log".to_owned(), HostValue::Array(log.clone()));
    let engine = Engine::new(options);

    // The class body would push, but class fields are not enabled in ES2015:
    // the run fails before the static block body can execute.
    let err = engine
        .evaluate("class C { static { log.push('ran'); } }", RunOptions::default())
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::Feature);
    assert!(log.is_empty(), "gated node must not execute: {:?}", log.to_vec());
}

/// Per-run feature overlays merge with the engine's under the
/// whitelist-wins rule.
#[test]
fn per_run_feature_overlays() {
    let engine = era_engine(Era::Es2020);
    assert_eq!(engine.evaluate("1 ?? 2", RunOptions::default()).unwrap(), HostValue::Number(1.0));

    let mut restricted = RunOptions::default();
    restricted.features = Some(FeatureControl::blacklist(vec![FeatureTag::NullishCoalescing]));
    let err = engine.evaluate("1 ?? 2", restricted).unwrap_err();
    assert_eq!(err.category, ErrorCategory::Feature);

    // The restriction was per-run only.
    assert_eq!(engine.evaluate("1 ?? 2", RunOptions::default()).unwrap(), HostValue::Number(1.0));
}

#[test]
fn lexical_features_gate_before_execution() {
    let engine = era_engine(Era::Es2020);
    let err = engine.evaluate("const n = 1_000; n", RunOptions::default()).unwrap_err();
    assert_eq!(err.category, ErrorCategory::Feature);
    assert!(err.message.contains("NumericSeparators"), "{}", err.message);

    let engine = era_engine(Era::Es2021);
    assert_eq!(engine.evaluate("const n = 1_000; n", RunOptions::default()).unwrap(), HostValue::Number(1000.0));
}

#[test]
fn merged_presets_combine_globals_and_features() {
    let mut console_bundle = InterpreterOptions::default();
    let log = HostArray::new(Vec::new());
    console_bundle.globals.insert("sink".to_owned(), HostValue::Array(log.clone()));

    let merged = merge_presets([era_preset(Era::Es2020), console_bundle]);
    let engine = Engine::new(merged);
    engine
        .evaluate("sink.push('from-es2020' + (null ?? '!'))", RunOptions::default())
        .unwrap();
    assert_eq!(log.to_vec(), vec![HostValue::String("from-es2020!".to_owned())]);
}

/// Feature controls round-trip through the serde config shape.
#[test]
fn feature_control_deserializes_from_config_json() {
    let control: FeatureControl =
        serde_json::from_str(r#"{"mode": "whitelist", "features": ["LetConst", "Classes"]}"#).unwrap();
    let engine = Engine::new(InterpreterOptions {
        feature_control: Some(control),
        ..InterpreterOptions::default()
    });
    engine.evaluate("let x = 1;", RunOptions::default()).unwrap();
    let err = engine.evaluate("const f = () => 1;", RunOptions::default()).unwrap_err();
    assert_eq!(err.category, ErrorCategory::Feature);
}

#[test]
fn absent_feature_control_enables_everything() {
    let engine = Engine::new(InterpreterOptions::default());
    assert_eq!(
        engine
            .evaluate("class C { #x = 1n; get x() { return this.#x; } } typeof new C().x", RunOptions::default())
            .unwrap(),
        HostValue::String("bigint".to_owned())
    );
}
