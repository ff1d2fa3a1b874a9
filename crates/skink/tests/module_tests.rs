use std::{cell::RefCell, collections::HashMap, rc::Rc};

use skink::{
    Engine, HostValue, InterpreterOptions, ModuleOptions, ResolvedModule, RunOptions,
};

/// Builds an engine whose resolver serves the given specifier → source map
/// and counts how many times each module body runs (via a host counter).
fn engine_with_modules(sources: &[(&str, &str)]) -> (Engine, Rc<RefCell<Vec<String>>>) {
    let map: HashMap<String, String> = sources
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    let evaluations: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let mut options = InterpreterOptions::default();
    options.modules = ModuleOptions {
        enabled: true,
        resolver: Some(Rc::new(move |specifier, _importer| {
            map.get(specifier).map(|source| ResolvedModule::Source {
                source: source.clone(),
                path: specifier.to_owned(),
            })
        })),
        cache: Some(true),
        max_depth: None,
    };
    let log = evaluations.clone();
    options.globals.insert(
        "trace".to_owned(),
        HostValue::function("trace", move |args| {
            if let Some(HostValue::String(s)) = args.first() {
                log.borrow_mut().push(s.clone());
            }
            Ok(HostValue::Undefined)
        }),
    );
    (Engine::new(options), evaluations)
}

#[tokio::test]
async fn named_default_and_renamed_imports() {
    let (engine, _) = engine_with_modules(&[(
        "lib.js",
        "export const one = 1; export function twice(n) { return n * 2; } export default 'fallback';",
    )]);
    let source = r#"
        import fallback, { one, twice as double } from "lib.js";
        export const result = fallback + ':' + double(one + 2);
    "#;
    let ns = engine.evaluate_module(source, "main.js", RunOptions::default()).await.unwrap();
    let HostValue::Object(ns) = ns else { panic!("expected namespace object") };
    assert_eq!(ns.get("result"), Some(HostValue::String("fallback:6".to_owned())));
}

#[tokio::test]
async fn namespace_objects_are_frozen_snapshots() {
    let (engine, _) = engine_with_modules(&[("m.js", "export const a = 1; export default 2;")]);
    let ns = engine
        .evaluate_module("export * from \"m.js\"; import d from \"m.js\"; export { d as renamed };", "entry.js", RunOptions::default())
        .await
        .unwrap();
    let HostValue::Object(ns) = ns else { panic!("expected namespace object") };
    // `export *` re-exports everything except `default`.
    assert_eq!(ns.get("a"), Some(HostValue::Number(1.0)));
    assert_eq!(ns.get("default"), None);
    assert_eq!(ns.get("renamed"), Some(HostValue::Number(2.0)));
}

/// With the cache enabled, a module body runs exactly once no matter how
/// many import paths reach it, and repeated dynamic imports see the same
/// namespace object.
#[tokio::test]
async fn module_bodies_run_exactly_once() {
    let (engine, evaluations) = engine_with_modules(&[
        ("shared.js", "trace('shared'); export const id = 7;"),
        ("a.js", "import { id } from \"shared.js\"; export const a = id;"),
        ("b.js", "import { id } from \"shared.js\"; export const b = id;"),
    ]);
    let source = r#"
        import { a } from "a.js";
        import { b } from "b.js";
        const again = await import("shared.js");
        const once = await import("shared.js");
        export const same = again === once;
        export const total = a + b;
    "#;
    let ns = engine.evaluate_module(source, "main.js", RunOptions::default()).await.unwrap();
    let HostValue::Object(ns) = ns else { panic!("expected namespace object") };
    assert_eq!(ns.get("total"), Some(HostValue::Number(14.0)));
    assert_eq!(ns.get("same"), Some(HostValue::Bool(true)));
    assert_eq!(evaluations.borrow().as_slice(), ["shared".to_owned()]);
}

/// Import cycles terminate: the cycle's bindings are TDZ holes at module
/// entry and live once evaluation completes.
#[tokio::test]
async fn cyclic_imports_resolve_without_recursion() {
    let (engine, _) = engine_with_modules(&[
        (
            "a.js",
            "import { readA, b } from \"b.js\"; export const a = 'a' + b; export const check = readA();",
        ),
        (
            "b.js",
            "import { a } from \"a.js\"; export const b = 'b'; export function readA() { return typeof a; }",
        ),
    ]);
    let ns = engine
        .evaluate_module("export { a, check } from \"a.js\";", "main.js", RunOptions::default())
        .await
        .unwrap();
    let HostValue::Object(ns) = ns else { panic!("expected namespace object") };
    assert_eq!(ns.get("a"), Some(HostValue::String("ab".to_owned())));
    // At a.js's evaluation time its own binding was still uninitialized.
    assert_eq!(ns.get("check"), Some(HostValue::String("undefined".to_owned())));
}

/// Touching an uninitialized cyclic binding at module-body top level is a
/// TDZ reference error.
#[tokio::test]
async fn cyclic_top_level_access_hits_the_tdz() {
    let (engine, _) = engine_with_modules(&[
        ("a.js", "import { b } from \"b.js\"; export const a = 1;"),
        ("b.js", "import { a } from \"a.js\"; export const b = a + 1;"),
    ]);
    let err = engine
        .evaluate_module("import { a } from \"a.js\";", "main.js", RunOptions::default())
        .await
        .unwrap_err();
    assert!(err.message.contains("before initialization"), "{}", err.message);
}

#[tokio::test]
async fn missing_modules_and_exports_are_reported() {
    let (engine, _) = engine_with_modules(&[("a.js", "export const x = 1;")]);
    let err = engine
        .evaluate_module("import \"nope.js\";", "main.js", RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, skink::codes::RUNTIME_MODULE_NOT_FOUND);
    assert!(err.message.contains("nope.js"), "{}", err.message);

    let err = engine
        .evaluate_module("import { missing } from \"a.js\";", "main.js", RunOptions::default())
        .await
        .unwrap_err();
    assert!(err.message.contains("does not export 'missing'"), "{}", err.message);
}

#[tokio::test]
async fn depth_limit_bounds_the_graph() {
    let chain: Vec<(String, String)> = (0..10)
        .map(|i| {
            let source = if i == 9 {
                "export const v = 9;".to_owned()
            } else {
                format!("export {{ v }} from \"m{}.js\";", i + 1)
            };
            (format!("m{i}.js"), source)
        })
        .collect();
    let refs: Vec<(&str, &str)> = chain.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let (engine, _) = engine_with_modules(&refs);

    // Same graph behind a tight depth limit.
    let map: HashMap<String, String> = chain.iter().cloned().collect();
    let mut tight = InterpreterOptions::default();
    tight.modules = ModuleOptions {
        enabled: true,
        resolver: Some(Rc::new(move |specifier, _| {
            map.get(specifier).map(|source| ResolvedModule::Source {
                source: source.clone(),
                path: specifier.to_owned(),
            })
        })),
        cache: Some(true),
        max_depth: Some(3),
    };
    let tight_engine = Engine::new(tight);
    let err = tight_engine
        .evaluate_module("import { v } from \"m0.js\";", "main.js", RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, skink::codes::RUNTIME_MODULE_DEPTH);

    // The permissive engine loads the same chain fine.
    let ns = engine
        .evaluate_module("export { v } from \"m0.js\";", "main.js", RunOptions::default())
        .await
        .unwrap();
    let HostValue::Object(ns) = ns else { panic!("expected namespace object") };
    assert_eq!(ns.get("v"), Some(HostValue::Number(9.0)));
}

#[tokio::test]
async fn host_namespace_resolutions_skip_parsing() {
    let mut options = InterpreterOptions::default();
    options.modules = ModuleOptions {
        enabled: true,
        resolver: Some(Rc::new(|specifier, _| {
            (specifier == "host:config").then(|| ResolvedModule::Namespace {
                value: HostValue::object([("default".to_owned(), HostValue::Number(5.0)), ("mode".to_owned(), HostValue::String("safe".to_owned()))]),
                path: "host:config".to_owned(),
            })
        })),
        cache: Some(true),
        max_depth: None,
    };
    let engine = Engine::new(options);
    let ns = engine
        .evaluate_module(
            "import conf, { mode } from \"host:config\"; export const out = conf + ':' + mode;",
            "main.js",
            RunOptions::default(),
        )
        .await
        .unwrap();
    let HostValue::Object(ns) = ns else { panic!("expected namespace object") };
    assert_eq!(ns.get("out"), Some(HostValue::String("5:safe".to_owned())));
}

#[tokio::test]
async fn module_cache_surface() {
    let (engine, evaluations) = engine_with_modules(&[("m.js", "trace('m'); export const x = 1;")]);
    assert!(engine.is_module_system_enabled());
    engine
        .evaluate_module("import { x } from \"m.js\";", "main.js", RunOptions::default())
        .await
        .unwrap();
    let exports = engine.get_module_exports("m.js").expect("cached module");
    let HostValue::Object(exports) = exports else { panic!("expected namespace object") };
    assert_eq!(exports.get("x"), Some(HostValue::Number(1.0)));

    engine.clear_module_cache();
    assert!(engine.get_module_exports("m.js").is_none());
    engine
        .evaluate_module("import { x } from \"m.js\";", "main2.js", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(evaluations.borrow().len(), 2);
}

#[tokio::test]
async fn top_level_await_in_modules() {
    let mut options = InterpreterOptions::default();
    options.modules = ModuleOptions {
        enabled: true,
        resolver: Some(Rc::new(|_, _| None)),
        cache: Some(true),
        max_depth: None,
    };
    options.globals.insert(
        "later".to_owned(),
        HostValue::async_function("later", |_| Box::pin(async { Ok(HostValue::Number(8.0)) })),
    );
    let engine = Engine::new(options);
    let ns = engine
        .evaluate_module("export const v = await later();", "main.js", RunOptions::default())
        .await
        .unwrap();
    let HostValue::Object(ns) = ns else { panic!("expected namespace object") };
    assert_eq!(ns.get("v"), Some(HostValue::Number(8.0)));
}
