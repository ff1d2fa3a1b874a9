use skink::{Engine, HostArray, HostValue, InterpreterOptions, RunOptions};

fn eval(source: &str) -> HostValue {
    let engine = Engine::new(InterpreterOptions::default());
    engine.evaluate(source, RunOptions::default()).unwrap()
}

#[test]
fn generator_basic_two_way_communication() {
    let source = r"
        function* g() {
            const got = yield 1;
            yield got * 10;
        }
        const it = g();
        const first = it.next();
        const second = it.next(4);
        const third = it.next();
        [first.value, first.done, second.value, third.done].join(',')
    ";
    assert_eq!(eval(source), HostValue::String("1,false,40,true".to_owned()));
}

/// `return()` unwinds pending `finally` blocks before completing; the host
/// observes the finally side effect and a `{value: 99, done: true}` result.
#[test]
fn generator_return_runs_finally_blocks() {
    let log = HostArray::new(Vec::new());
    let engine = Engine::new(InterpreterOptions::default());
    let mut options = RunOptions::default();
    options.globals.insert("log".to_owned(), HostValue::Array(log.clone()));
    let source = r"
        function* g() { try { yield 1; } finally { log.push('f'); } }
        const it = g();
        it.next();
        const r = it.return(99);
        [r.value, r.done].join(',')
    ";
    let value = engine.evaluate(source, options).unwrap();
    assert_eq!(value, HostValue::String("99,true".to_owned()));
    assert_eq!(log.to_vec(), vec![HostValue::String("f".to_owned())]);
}

/// After `return()`, every subsequent `next()` reports `{done: true}`.
#[test]
fn generator_stays_done_after_return() {
    let source = r"
        function* g() { yield 1; yield 2; }
        const it = g();
        it.next();
        it.return(0);
        const a = it.next();
        const b = it.next();
        [a.done, a.value === undefined, b.done].join(',')
    ";
    assert_eq!(eval(source), HostValue::String("true,true,true".to_owned()));
}

#[test]
fn generator_throw_is_catchable_in_flight() {
    let source = r"
        function* g() {
            try { yield 1; } catch (e) { yield 'caught:' + e; }
            yield 'after';
        }
        const it = g();
        it.next();
        const caught = it.throw('boom');
        const after = it.next();
        [caught.value, after.value].join('|')
    ";
    assert_eq!(eval(source), HostValue::String("caught:boom|after".to_owned()));
}

/// A `finally` that returns replaces the caller's `return()` request.
#[test]
fn finally_return_overrides_forced_return() {
    let source = r"
        function* g() { try { yield 1; } finally { return 7; } }
        const it = g();
        it.next();
        const r = it.return(99);
        [r.value, r.done].join(',')
    ";
    assert_eq!(eval(source), HostValue::String("7,true".to_owned()));
}

#[test]
fn yield_star_delegates_and_takes_the_final_value() {
    let source = r"
        function* inner() { yield 'a'; yield 'b'; return 'inner-done'; }
        function* outer() {
            const result = yield* inner();
            yield result;
        }
        const it = outer();
        [it.next().value, it.next().value, it.next().value].join(',')
    ";
    assert_eq!(eval(source), HostValue::String("a,b,inner-done".to_owned()));
}

#[test]
fn generators_drive_for_of_and_spread() {
    let source = r"
        function* range(n) { for (let i = 0; i < n; i++) yield i; }
        const squares = [];
        for (const v of range(4)) squares.push(v * v);
        [...range(3)].length + ':' + squares.join(',')
    ";
    assert_eq!(eval(source), HostValue::String("3:0,1,4,9".to_owned()));
}

/// Breaking out of `for..of` over a generator force-completes it, running
/// its `finally` exactly once.
#[test]
fn for_of_break_closes_the_generator() {
    let source = r"
        let cleanups = 0;
        function* g() { try { yield 1; yield 2; } finally { cleanups += 1; } }
        for (const v of g()) { break; }
        cleanups
    ";
    assert_eq!(eval(source), HostValue::Number(1.0));
}

#[test]
fn parameter_defaults_bind_at_call_time() {
    let source = r"
        let evaluated = 0;
        function side() { evaluated += 1; return 5; }
        function* g(x = side()) { yield x; }
        const it = g();
        const before = evaluated;
        it.next();
        [before, evaluated].join(',')
    ";
    // The default runs when the generator is called, not on first next().
    assert_eq!(eval(source), HostValue::String("1,1".to_owned()));
}

#[test]
fn generator_next_on_running_generator_is_an_error() {
    let source = r"
        let result = 'no error';
        function* g() { try { it.next(); } catch (e) { result = e.message; } yield 1; }
        const it = g();
        it.next();
        result
    ";
    assert_eq!(eval(source), HostValue::String("Generator is already running".to_owned()));
}

#[tokio::test]
async fn async_function_awaits_host_promises() {
    let engine = Engine::new(InterpreterOptions::default());
    let mut options = RunOptions::default();
    options.globals.insert(
        "fetchNumber".to_owned(),
        HostValue::async_function("fetchNumber", |_args| {
            Box::pin(async { Ok(HostValue::Number(21.0)) })
        }),
    );
    let source = r"
        async function double() { return (await fetchNumber()) * 2; }
        await double()
    ";
    let value = engine.evaluate_async(source, options).await.unwrap();
    assert_eq!(value, HostValue::Number(42.0));
}

#[tokio::test]
async fn async_generators_with_for_await() {
    let engine = Engine::new(InterpreterOptions::default());
    let mut options = RunOptions::default();
    options.globals.insert(
        "tick".to_owned(),
        HostValue::async_function("tick", |args| {
            Box::pin(async move { Ok(args.into_iter().next().unwrap_or(HostValue::Undefined)) })
        }),
    );
    let source = r"
        async function* numbers() {
            yield await tick(1);
            yield await tick(2);
        }
        let total = 0;
        for await (const n of numbers()) { total += n; }
        total
    ";
    let value = engine.evaluate_async(source, options).await.unwrap();
    assert_eq!(value, HostValue::Number(3.0));
}

#[tokio::test]
async fn for_await_falls_back_to_sync_iterables() {
    let engine = Engine::new(InterpreterOptions::default());
    let source = r"
        let total = 0;
        for await (const n of [1, 2, 3]) { total += n; }
        total
    ";
    let value = engine.evaluate_async(source, RunOptions::default()).await.unwrap();
    assert_eq!(value, HostValue::Number(6.0));
}

/// Suspension points are hard errors in synchronous runs.
#[test]
fn sync_runs_reject_await() {
    let engine = Engine::new(InterpreterOptions::default());
    let err = engine
        .evaluate("async function f() { await 1; return 2; } f()", RunOptions::default())
        .unwrap_err();
    assert_eq!(err.code, skink::codes::RUNTIME_SYNC_SUSPEND);
}
