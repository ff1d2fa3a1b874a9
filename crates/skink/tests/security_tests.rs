use skink::{
    Engine, ErrorCategory, HostError, HostValue, InterpreterOptions, RunOptions, SecurityOptions, codes,
};

fn engine_with_host_object() -> (Engine, skink::HostObject) {
    let obj = skink::HostObject::new([
        ("name".to_owned(), HostValue::String("host".to_owned())),
        ("count".to_owned(), HostValue::Number(1.0)),
    ]);
    let mut options = InterpreterOptions::default();
    options.globals.insert("config".to_owned(), HostValue::Object(obj.clone()));
    (Engine::new(options), obj)
}

/// Reads proxy through to the host; writes never reach it.
#[test]
fn host_objects_are_read_only() {
    let (engine, obj) = engine_with_host_object();
    assert_eq!(
        engine.evaluate("config.name + config.count", RunOptions::default()).unwrap(),
        HostValue::String("host1".to_owned())
    );

    let err = engine.evaluate("config.count = 99", RunOptions::default()).unwrap_err();
    assert_eq!(err.category, ErrorCategory::Security);
    assert_eq!(err.code, codes::SECURITY_HOST_WRITE);
    assert_eq!(obj.get("count"), Some(HostValue::Number(1.0)));
}

/// With `throw_on_host_write` off, writes are silently dropped; the host
/// object still never changes.
#[test]
fn host_write_policy_can_silently_ignore() {
    let obj = skink::HostObject::new([("x".to_owned(), HostValue::Number(1.0))]);
    let mut options = InterpreterOptions::default();
    options.globals.insert("o".to_owned(), HostValue::Object(obj.clone()));
    options.security = Some(SecurityOptions {
        throw_on_host_write: false,
        ..SecurityOptions::default()
    });
    let engine = Engine::new(options);
    assert_eq!(
        engine.evaluate("o.x = 5; o.x", RunOptions::default()).unwrap(),
        HostValue::Number(1.0)
    );
    assert_eq!(obj.get("x"), Some(HostValue::Number(1.0)));
}

/// Security errors are infrastructure failures: sandbox `try/catch` cannot
/// swallow them.
#[test]
fn security_errors_are_uncatchable() {
    let (engine, _) = engine_with_host_object();
    let err = engine
        .evaluate("try { config.__proto__ } catch (e) { 'caught' }", RunOptions::default())
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::Security);
}

#[test]
fn forbidden_names_are_blocked_on_host_values() {
    let (engine, _) = engine_with_host_object();
    for access in ["config.prototype", "config.constructor", "config.__defineGetter__"] {
        let err = engine.evaluate(access, RunOptions::default()).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Security, "{access}");
    }
}

#[test]
fn configured_blocked_names_extend_the_default_set() {
    let obj = skink::HostObject::new([("internalToken".to_owned(), HostValue::String("s3cret".to_owned()))]);
    let mut options = InterpreterOptions::default();
    options.globals.insert("api".to_owned(), HostValue::Object(obj));
    options.security = Some(SecurityOptions {
        blocked_property_names: vec!["internalToken".to_owned()],
        ..SecurityOptions::default()
    });
    let engine = Engine::new(options);
    let err = engine.evaluate("api.internalToken", RunOptions::default()).unwrap_err();
    assert_eq!(err.code, codes::SECURITY_FORBIDDEN_PROPERTY);
}

/// Prototype pollution is rejected in every syntactic form.
#[test]
fn prototype_pollution_vectors_are_rejected() {
    let engine = Engine::new(InterpreterOptions::default());
    let attempts = [
        "({}).__proto__",
        "const o = {}; o.__proto__ = {}",
        "const o = {}; o['__proto__'] = {}",
        "const k = '__pro' + 'to__'; ({})[k] = 1",
        "({ __proto__: {} })",
        "Object.assign({}, { ['__proto' + '__']: 1 })",
        "Object.setPrototypeOf({}, {})",
        "const k = 'construc' + 'tor'; ({})[k]",
    ];
    for attempt in attempts {
        let err = engine.evaluate(attempt, RunOptions::default()).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Security, "{attempt}");
    }
}

/// The intrinsic prototypes exposed through `Object.getPrototypeOf` reject
/// every mutation path.
#[test]
fn intrinsic_prototypes_are_immutable() {
    let engine = Engine::new(InterpreterOptions::default());
    let attempts = [
        "Object.getPrototypeOf({}).polluted = 1",
        "Object.getPrototypeOf([]).polluted = 1",
        "Object.defineProperty(Object.getPrototypeOf({}), 'x', { value: 1 })",
        "delete Object.getPrototypeOf([]).polluted",
    ];
    for attempt in attempts {
        let err = engine.evaluate(attempt, RunOptions::default()).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Security, "{attempt}");
        assert_eq!(err.code, codes::SECURITY_PROTO_POLLUTION, "{attempt}");
    }
}

/// A static `constructor` read is ordinary property access (and absent), so
/// it stays legal while the computed form is gated.
#[test]
fn static_constructor_reads_are_allowed() {
    let engine = Engine::new(InterpreterOptions::default());
    assert_eq!(
        engine.evaluate("typeof ({}).constructor", RunOptions::default()).unwrap(),
        HostValue::String("undefined".to_owned())
    );
}

/// Host callback failures surface as catchable runtime errors with the
/// message controlled by policy, and the stack is the sandbox's own.
#[test]
fn host_errors_are_sanitized_per_policy() {
    let boom = HostValue::function("boom", |_| Err(HostError::new("db password is hunter2")));

    let mut options = InterpreterOptions::default();
    options.globals.insert("boom".to_owned(), boom.clone());
    let engine = Engine::new(options);
    assert_eq!(
        engine
            .evaluate("try { boom() } catch (e) { e.message }", RunOptions::default())
            .unwrap(),
        HostValue::String("db password is hunter2".to_owned())
    );

    let mut options = InterpreterOptions::default();
    options.globals.insert("boom".to_owned(), boom);
    options.security = Some(SecurityOptions {
        hide_host_error_messages: true,
        ..SecurityOptions::default()
    });
    let engine = Engine::new(options);
    assert_eq!(
        engine
            .evaluate("try { boom() } catch (e) { e.message }", RunOptions::default())
            .unwrap(),
        HostValue::String("error details hidden".to_owned())
    );
}

/// Uncaught host-callback errors carry the sandbox call trace, not the
/// host's.
#[test]
fn stacks_are_reconstructed_from_the_sandbox() {
    let mut options = InterpreterOptions::default();
    options
        .globals
        .insert("explode".to_owned(), HostValue::function("explode", |_| Err(HostError::new("nope"))));
    let engine = Engine::new(options);
    let err = engine
        .evaluate("function outer() { return inner(); } function inner() { return explode(); } outer()", RunOptions::default())
        .unwrap_err();
    let names: Vec<_> = err.stack.iter().filter_map(|f| f.function.as_deref()).collect();
    assert!(names.contains(&"outer"), "stack: {names:?}");
    assert!(names.contains(&"inner"), "stack: {names:?}");
}

/// Host functions mutate host state only through the host's own closures.
#[test]
fn host_callables_observe_their_own_mutations() {
    let log = skink::HostArray::new(Vec::new());
    let mut options = InterpreterOptions::default();
    options.globals.insert("log".to_owned(), HostValue::Array(log.clone()));
    let engine = Engine::new(options);
    engine
        .evaluate("log.push('a'); log.push('b'); log.length", RunOptions::default())
        .unwrap();
    assert_eq!(
        log.to_vec(),
        vec![HostValue::String("a".to_owned()), HostValue::String("b".to_owned())]
    );
}

/// Sandbox results deep-convert for the host; sandbox-only values degrade to
/// display stand-ins rather than leaking references.
#[test]
fn outbound_values_are_owned_copies() {
    let engine = Engine::new(InterpreterOptions::default());
    let value = engine
        .evaluate("({ n: 1, list: [1, 2], f: () => 1 })", RunOptions::default())
        .unwrap();
    let HostValue::Object(obj) = value else { panic!("expected object") };
    assert_eq!(obj.get("n"), Some(HostValue::Number(1.0)));
    assert!(matches!(obj.get("f"), Some(HostValue::Repr(r)) if r.contains("Function")));
}
