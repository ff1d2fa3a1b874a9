use pretty_assertions::assert_eq;
use skink::{Engine, HostValue, InterpreterOptions, RunOptions};

fn eval(source: &str) -> HostValue {
    let engine = Engine::new(InterpreterOptions::default());
    engine.evaluate(source, RunOptions::default()).unwrap()
}

fn eval_err(source: &str) -> skink::Error {
    let engine = Engine::new(InterpreterOptions::default());
    engine.evaluate(source, RunOptions::default()).unwrap_err()
}

/// The program result is the value of the last evaluated expression
/// statement.
#[test]
fn completion_value_is_last_expression() {
    assert_eq!(eval("1 + 2"), HostValue::Number(3.0));
    assert_eq!(eval("let x = 10; x * 2"), HostValue::Number(20.0));
    assert_eq!(eval("if (true) { 'yes' } else { 'no' }"), HostValue::String("yes".to_owned()));
}

#[test]
fn arithmetic_and_coercion() {
    assert_eq!(eval("2 ** 10"), HostValue::Number(1024.0));
    assert_eq!(eval("'1' + 2"), HostValue::String("12".to_owned()));
    assert_eq!(eval("'6' * '7'"), HostValue::Number(42.0));
    assert_eq!(eval("1 / 0"), HostValue::Number(f64::INFINITY));
    assert_eq!(eval("5 % 3"), HostValue::Number(2.0));
    assert_eq!(eval("[2] + 2"), HostValue::String("22".to_owned()));
}

#[test]
fn equality_operators_and_same_value() {
    assert_eq!(eval("null == undefined"), HostValue::Bool(true));
    assert_eq!(eval("null === undefined"), HostValue::Bool(false));
    assert_eq!(eval("NaN === NaN"), HostValue::Bool(false));
    assert_eq!(eval("Object.is(NaN, NaN)"), HostValue::Bool(true));
    assert_eq!(eval("Object.is(0, -0)"), HostValue::Bool(false));
    assert_eq!(eval("1 == '1'"), HostValue::Bool(true));
}

/// Optional chaining short-circuits on null/undefined only; other falsy
/// values proceed through the chain.
#[test]
fn optional_chaining_short_circuit() {
    assert_eq!(eval(r#"let o = null; o?.a.b.c ?? "d""#), HostValue::String("d".to_owned()));
    assert_eq!(eval("let s = ''; s?.length"), HostValue::Number(0.0));
    assert_eq!(eval("let n = 0; n?.toString()"), HostValue::String("0".to_owned()));
    // Side effects to the right of the short-circuit are suppressed.
    assert_eq!(
        eval("let hits = 0; const f = () => { hits += 1; return 'k'; }; let o = undefined; o?.[f()]; hits"),
        HostValue::Number(0.0)
    );
    // Optional calls short-circuit on a missing method.
    assert_eq!(eval("let o = {}; o.missing?.() ?? 'none'"), HostValue::String("none".to_owned()));
}

#[test]
fn destructuring_with_defaults_rest_and_nesting() {
    assert_eq!(eval("const [a, , b = 9, ...rest] = [1, 2, undefined, 4, 5]; a + b + rest.length"), HostValue::Number(12.0));
    assert_eq!(
        eval("const {x, y: {z} = {z: 3}, ...others} = {x: 1, w: 5, v: 6}; x + z + Object.keys(others).length"),
        HostValue::Number(6.0)
    );
    assert_eq!(eval("let a = 0, b = 0; [a, b] = [b + 1, a + 2]; a * 10 + b"), HostValue::Number(12.0));
    assert_eq!(
        eval("function f({a = 1, b} = {b: 2}) { return a * 10 + b; } f()"),
        HostValue::Number(12.0)
    );
}

#[test]
fn spread_drives_the_iterator_protocol() {
    assert_eq!(eval("const xs = [1, 2]; [...xs, 3].join(',')"), HostValue::String("1,2,3".to_owned()));
    assert_eq!(eval("[...'ab'].length"), HostValue::Number(2.0));
    assert_eq!(eval("function f(...args) { return args.length; } f(...[1, 2], 3)"), HostValue::Number(3.0));
    assert_eq!(eval("const merged = {...{a: 1}, ...{b: 2}}; merged.a + merged.b"), HostValue::Number(3.0));
}

#[test]
fn custom_iterables_via_symbol_iterator() {
    let source = r"
        const counter = {
            [Symbol.iterator]() {
                let n = 0;
                return { next() { n += 1; return { value: n, done: n > 3 }; } };
            }
        };
        let total = 0;
        for (const v of counter) { total += v; }
        total
    ";
    assert_eq!(eval(source), HostValue::Number(6.0));
}

/// Early exit from `for..of` invokes the iterator's `return()` exactly once.
#[test]
fn for_of_break_closes_the_iterator() {
    let source = r"
        let closed = 0;
        const it = {
            [Symbol.iterator]() {
                return {
                    next() { return { value: 1, done: false }; },
                    return() { closed += 1; return { done: true }; }
                };
            }
        };
        for (const v of it) { break; }
        closed
    ";
    assert_eq!(eval(source), HostValue::Number(1.0));
}

#[test]
fn closures_capture_their_environment() {
    let source = r"
        function counter() {
            let n = 0;
            return () => { n += 1; return n; };
        }
        const c = counter();
        c(); c();
        c()
    ";
    assert_eq!(eval(source), HostValue::Number(3.0));
}

#[test]
fn loop_let_bindings_are_per_iteration() {
    let source = r"
        const fns = [];
        for (let i = 0; i < 3; i++) { fns.push(() => i); }
        fns.map(f => f()).join(',')
    ";
    assert_eq!(eval(source), HostValue::String("0,1,2".to_owned()));
}

#[test]
fn try_catch_finally_completion_rules() {
    assert_eq!(eval("try { throw 'x' } catch (e) { 'caught:' + e }"), HostValue::String("caught:x".to_owned()));
    // Abrupt finally overrides the try completion.
    assert_eq!(
        eval("function f() { try { return 1; } finally { return 2; } } f()"),
        HostValue::Number(2.0)
    );
    assert_eq!(eval("let log = ''; try { log += 't'; } finally { log += 'f'; } log"), HostValue::String("tf".to_owned()));
    // Optional catch binding.
    assert_eq!(eval("try { throw 1 } catch { 'ok' }"), HostValue::String("ok".to_owned()));
}

#[test]
fn uncaught_throw_preserves_the_value_for_the_host() {
    let err = eval_err("throw { code: 42 }");
    assert_eq!(err.category, skink::ErrorCategory::Runtime);
    assert_eq!(err.code, skink::codes::RUNTIME_THROWN);
    let thrown = err.thrown.expect("thrown value is preserved");
    let HostValue::Object(obj) = thrown else { panic!("expected an object, got {thrown:?}") };
    assert_eq!(obj.get("code"), Some(HostValue::Number(42.0)));
}

#[test]
fn reference_errors_name_the_variable() {
    let err = eval_err("missing_variable");
    assert_eq!(err.code, skink::codes::RUNTIME_REFERENCE);
    assert!(err.message.contains("Undefined variable 'missing_variable'"), "{}", err.message);
}

#[test]
fn tdz_applies_to_let_and_const() {
    let err = eval_err("f(); function f() { return x; } let x = 1;");
    assert!(err.message.contains("before initialization"), "{}", err.message);
    assert_eq!(eval("function g() { return y; } let y = 7; g()"), HostValue::Number(7.0));
}

#[test]
fn switch_matches_strictly_and_falls_through() {
    let source = r"
        function pick(v) {
            let out = '';
            switch (v) {
                case 1: out += 'one ';
                case 2: out += 'two'; break;
                default: out = 'other';
            }
            return out;
        }
        pick(1) + '|' + pick(2) + '|' + pick('1')
    ";
    assert_eq!(eval(source), HostValue::String("one two|two|other".to_owned()));
}

#[test]
fn labeled_break_and_continue() {
    let source = r"
        let hits = 0;
        outer: for (let i = 0; i < 3; i++) {
            for (let j = 0; j < 3; j++) {
                if (j === 1) continue outer;
                if (i === 2) break outer;
                hits += 1;
            }
        }
        hits
    ";
    assert_eq!(eval(source), HostValue::Number(2.0));
}

#[test]
fn string_methods_and_utf16_lengths() {
    assert_eq!(eval("'héllo'.length"), HostValue::Number(5.0));
    assert_eq!(eval("'😀'.length"), HostValue::Number(2.0));
    assert_eq!(eval("'abcdef'.slice(1, -1)"), HostValue::String("bcde".to_owned()));
    assert_eq!(eval("'a-b-c'.split('-').length"), HostValue::Number(3.0));
    assert_eq!(eval("'7'.padStart(3, '0')"), HostValue::String("007".to_owned()));
    assert_eq!(eval("' x '.trim()"), HostValue::String("x".to_owned()));
}

#[test]
fn regex_interop_through_string_methods() {
    assert_eq!(eval("/a+/.test('caaat')"), HostValue::Bool(true));
    assert_eq!(eval("'caaat'.replace(/a+/, 'A')"), HostValue::String("cAt".to_owned()));
    assert_eq!(eval("'a1b2'.replace(/[0-9]/g, '#')"), HostValue::String("a#b#".to_owned()));
    assert_eq!(eval("'x=1'.match(/(\\w+)=(\\d+)/)[2]"), HostValue::String("1".to_owned()));
    assert_eq!(eval("'a b'.search(/b/)"), HostValue::Number(2.0));
    // replaceAll insists on a global regex.
    let err = eval_err("'aa'.replaceAll(/a/, 'b')");
    assert!(err.message.contains("global"), "{}", err.message);
}

#[test]
fn template_literals_and_tags() {
    assert_eq!(eval("const n = 6; `${n + 1} geese`"), HostValue::String("7 geese".to_owned()));
    let source = r"
        function tag(strings, a, b) { return strings.raw[1] + a + b; }
        tag`x${1}\n${2}`
    ";
    assert_eq!(eval(source), HostValue::String("\\n12".to_owned()));
}

#[test]
fn getters_setters_and_computed_keys() {
    let source = r"
        const key = 'dyn';
        const o = {
            _v: 1,
            get v() { return this._v; },
            set v(next) { this._v = next * 2; },
            [key + 'amic']: true,
        };
        o.v = 4;
        [o.v, o.dynamic].join(',')
    ";
    assert_eq!(eval(source), HostValue::String("8,true".to_owned()));
}

#[test]
fn object_freeze_and_seal_invariants() {
    let err = eval_err("const o = Object.freeze({a: 1}); o.a = 2;");
    assert!(err.message.contains("read only"), "{}", err.message);
    let err = eval_err("const o = Object.seal({a: 1}); o.b = 2;");
    assert!(err.message.contains("not extensible"), "{}", err.message);
    assert_eq!(eval("const o = Object.seal({a: 1}); o.a = 5; o.a"), HostValue::Number(5.0));
}

#[test]
fn typeof_in_and_instanceof() {
    assert_eq!(eval("typeof undeclared"), HostValue::String("undefined".to_owned()));
    assert_eq!(eval("typeof null"), HostValue::String("object".to_owned()));
    assert_eq!(eval("typeof (() => 1)"), HostValue::String("function".to_owned()));
    assert_eq!(eval("typeof 1n"), HostValue::String("bigint".to_owned()));
    assert_eq!(eval("'a' in {a: 1}"), HostValue::Bool(true));
    assert_eq!(eval("function F() {} new F() instanceof F"), HostValue::Bool(true));
}

/// The intrinsic globals work on both sides of `new` and `instanceof`, not
/// just as bare calls.
#[test]
fn intrinsic_constructors_with_new_and_instanceof() {
    assert_eq!(eval("[] instanceof Array"), HostValue::Bool(true));
    assert_eq!(eval("[] instanceof Object"), HostValue::Bool(true));
    assert_eq!(eval("({}) instanceof Array"), HostValue::Bool(false));
    assert_eq!(eval("({}) instanceof Object"), HostValue::Bool(true));
    assert_eq!(eval("function f() {} f instanceof Object"), HostValue::Bool(true));
    assert_eq!(eval("Symbol() instanceof Symbol"), HostValue::Bool(false));

    assert_eq!(eval("new Array(3).length"), HostValue::Number(3.0));
    assert_eq!(eval("new Array(1, 2, 3).join('-')"), HostValue::String("1-2-3".to_owned()));
    assert_eq!(eval("new Array(4) instanceof Array"), HostValue::Bool(true));
    assert_eq!(eval("const o = new Object(); o.x = 1; o.x"), HostValue::Number(1.0));
    assert_eq!(eval("new Object() instanceof Object"), HostValue::Bool(true));

    let err = eval_err("new Symbol()");
    assert!(err.message.contains("not a constructor"), "{}", err.message);
}

/// `Object.getPrototypeOf` reports the implicit prototype identities of
/// arrays, functions and classes, and the ordinary chain ends in null.
#[test]
fn get_prototype_of_reports_intrinsic_prototypes() {
    assert_eq!(
        eval("Object.getPrototypeOf([]) === Object.getPrototypeOf([1, 2])"),
        HostValue::Bool(true)
    );
    assert_eq!(eval("Object.getPrototypeOf([]) !== null"), HostValue::Bool(true));
    assert_eq!(
        eval("Object.getPrototypeOf(Object.getPrototypeOf([])) === Object.getPrototypeOf({})"),
        HostValue::Bool(true)
    );
    assert_eq!(eval("Object.getPrototypeOf(function f() {}) !== null"), HostValue::Bool(true));
    assert_eq!(
        eval("Object.getPrototypeOf(Object.getPrototypeOf({}))"),
        HostValue::Null
    );
}

#[test]
fn bigint_arithmetic_stays_exact() {
    assert_eq!(
        eval("(9007199254740993n * 2n).toString()"),
        HostValue::String("18014398509481986".to_owned())
    );
    let err = eval_err("1n + 1");
    assert!(err.message.contains("mix BigInt"), "{}", err.message);
}

#[test]
fn array_higher_order_methods() {
    assert_eq!(eval("[1, 2, 3, 4].filter(x => x % 2 === 0).map(x => x * 10).join()"), HostValue::String("20,40".to_owned()));
    assert_eq!(eval("[1, 2, 3].reduce((a, b) => a + b, 10)"), HostValue::Number(16.0));
    assert_eq!(eval("[5, 1, 9].find(x => x > 4)"), HostValue::Number(5.0));
    assert_eq!(eval("[[1, 2], [3, [4]]].flat(2).length"), HostValue::Number(4.0));
    assert_eq!(eval("[1, NaN].includes(NaN)"), HostValue::Bool(true));
    assert_eq!(eval("[1, NaN].indexOf(NaN)"), HostValue::Number(-1.0));
}

#[test]
fn function_call_apply_bind() {
    let source = r"
        function greet(greeting, mark) { return greeting + ' ' + this.name + mark; }
        const who = { name: 'sandbox' };
        const bound = greet.bind(who, 'hi');
        [greet.call(who, 'hey', '.'), greet.apply(who, ['yo', '?']), bound('!')].join('|')
    ";
    assert_eq!(
        eval(source),
        HostValue::String("hey sandbox.|yo sandbox?|hi sandbox!".to_owned())
    );
}

#[test]
fn logical_assignment_short_circuits_the_write() {
    assert_eq!(eval("let a = 1; a ||= 5; a"), HostValue::Number(1.0));
    assert_eq!(eval("let a = 0; a ||= 5; a"), HostValue::Number(5.0));
    assert_eq!(eval("let a = null; a ??= 7; a"), HostValue::Number(7.0));
    assert_eq!(eval("let a = 0; a ??= 7; a"), HostValue::Number(0.0));
    // The setter must not run when the assignment short-circuits.
    let source = r"
        let writes = 0;
        const o = { _x: 1, get x() { return this._x; }, set x(v) { writes += 1; this._x = v; } };
        o.x ||= 9;
        writes
    ";
    assert_eq!(eval(source), HostValue::Number(0.0));
}

#[test]
fn with_statement_shadow_lookup() {
    let source = r"
        const box = { width: 3, height: 4 };
        let area = 0;
        with (box) { area = width * height; }
        area
    ";
    assert_eq!(eval(source), HostValue::Number(12.0));
}

#[test]
fn parse_errors_carry_span_and_excerpt() {
    let err = eval_err("let x = ;");
    assert_eq!(err.category, skink::ErrorCategory::Parse);
    assert!(err.span.is_some());
    assert!(err.excerpt.as_deref().is_some_and(|e| e.contains("let x = ;")));
    assert!(err.header().starts_with("Parse[E"), "{}", err.header());
}

#[test]
fn pre_parsed_trees_are_accepted() {
    let program = skink::parse_program("21 * 2", skink::SourceKind::Script).unwrap();
    let engine = Engine::new(InterpreterOptions::default());
    assert_eq!(engine.evaluate(program, RunOptions::default()).unwrap(), HostValue::Number(42.0));
}

/// A host validator rejects the tree before anything executes.
#[test]
fn validators_run_before_execution() {
    let mut options = InterpreterOptions::default();
    options.validator = Some(std::rc::Rc::new(|program: &skink::Program| {
        if program.body.len() > 2 {
            Err("too many statements".to_owned())
        } else {
            Ok(())
        }
    }));
    let engine = Engine::new(options);
    engine.evaluate("1;", RunOptions::default()).unwrap();
    let err = engine.evaluate("1; 2; 3;", RunOptions::default()).unwrap_err();
    assert_eq!(err.code, skink::codes::RUNTIME_VALIDATION);
    assert!(err.message.contains("too many statements"), "{}", err.message);
}

#[test]
fn var_hoisting_and_function_declarations() {
    assert_eq!(eval("function f() { return v; } var v = 'late'; f()"), HostValue::String("late".to_owned()));
    assert_eq!(eval("early(); function early() { return 1; }"), HostValue::Number(1.0));
    assert_eq!(eval("var before = typeof v2; var v2 = 1; before"), HostValue::String("undefined".to_owned()));
}
