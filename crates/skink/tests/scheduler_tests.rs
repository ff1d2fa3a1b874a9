use std::time::Duration;

use skink::{Engine, HostValue, InterpreterOptions, RunOptions};

fn sleep_global() -> HostValue {
    HostValue::async_function("sleep", |args| {
        let ms = args.first().and_then(HostValue::as_number).unwrap_or(0.0) as u64;
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(HostValue::Undefined)
        })
    })
}

fn run_options(secret: &str) -> RunOptions {
    let mut options = RunOptions::default();
    options.globals.insert("sleep".to_owned(), sleep_global());
    options.globals.insert("secret".to_owned(), HostValue::String(secret.to_owned()));
    options
}

/// Two overlapping async runs with distinct per-run globals each see only
/// their own overlay, and a later run sees neither.
#[tokio::test]
async fn per_run_globals_never_leak_between_runs() {
    let engine = Engine::new(InterpreterOptions::default());

    let run_a = engine.evaluate_async("await sleep(20); secret", run_options("A"));
    let run_b = engine.evaluate_async("await sleep(1); secret", run_options("B"));
    let (a, b) = futures::join!(run_a, run_b);
    assert_eq!(a.unwrap(), HostValue::String("A".to_owned()));
    assert_eq!(b.unwrap(), HostValue::String("B".to_owned()));

    let err = engine.evaluate("secret", RunOptions::default()).unwrap_err();
    assert!(err.message.contains("Undefined variable 'secret'"), "{}", err.message);
}

/// Runs commit in submission order: the second run cannot start (let alone
/// finish) before the first releases the gate, even when it would be faster.
#[tokio::test]
async fn overlapping_runs_commit_in_submission_order() {
    let engine = Engine::new(InterpreterOptions::default());
    let order: std::rc::Rc<std::cell::RefCell<Vec<&'static str>>> = std::rc::Rc::default();

    let first = {
        let order = order.clone();
        let fut = engine.evaluate_async("await sleep(15); 1", run_options("x"));
        async move {
            let out = fut.await;
            order.borrow_mut().push("first");
            out
        }
    };
    let second = {
        let order = order.clone();
        let fut = engine.evaluate_async("await sleep(1); 2", run_options("y"));
        async move {
            let out = fut.await;
            order.borrow_mut().push("second");
            out
        }
    };
    let (a, b) = futures::join!(first, second);
    assert_eq!(a.unwrap(), HostValue::Number(1.0));
    assert_eq!(b.unwrap(), HostValue::Number(2.0));
    assert_eq!(order.borrow().as_slice(), ["first", "second"]);
}

/// A synchronous run against an engine that is mid-async-run fails fast
/// instead of blocking.
#[tokio::test]
async fn sync_run_on_a_busy_engine_is_rejected() {
    let engine = Engine::new(InterpreterOptions::default());
    let fut = engine.evaluate_async("await sleep(50); 'done'", run_options("z"));
    futures::pin_mut!(fut);
    // Start the async run so it holds the gate at its suspension point.
    assert!(futures::poll!(fut.as_mut()).is_pending());

    let err = engine.evaluate("1 + 1", RunOptions::default()).unwrap_err();
    assert_eq!(err.code, skink::codes::RUNTIME_ENGINE_BUSY);

    assert_eq!(fut.await.unwrap(), HostValue::String("done".to_owned()));
}

/// Sequential runs share no bindings: neither per-run globals nor script
/// declarations survive into the next run.
#[test]
fn sequential_runs_are_isolated() {
    let engine = Engine::new(InterpreterOptions::default());
    engine.evaluate("var leaked = 'v'; let also = 1;", RunOptions::default()).unwrap();
    assert_eq!(
        engine.evaluate("typeof leaked + ',' + typeof also", RunOptions::default()).unwrap(),
        HostValue::String("undefined,undefined".to_owned())
    );
}

/// Engine globals persist across runs while per-run overlays shadow them for
/// one run only.
#[test]
fn engine_globals_survive_and_overlays_shadow() {
    let mut options = InterpreterOptions::default();
    options.globals.insert("base".to_owned(), HostValue::Number(10.0));
    let engine = Engine::new(options);

    assert_eq!(engine.evaluate("base", RunOptions::default()).unwrap(), HostValue::Number(10.0));

    let mut overlay = RunOptions::default();
    overlay.globals.insert("base".to_owned(), HostValue::Number(99.0));
    assert_eq!(engine.evaluate("base", overlay).unwrap(), HostValue::Number(99.0));

    assert_eq!(engine.evaluate("base", RunOptions::default()).unwrap(), HostValue::Number(10.0));
}

/// Engine-lifetime totals accumulate across runs.
#[test]
fn totals_accumulate_across_runs() {
    let engine = Engine::new(InterpreterOptions::default());
    engine.evaluate("1; 2; 3;", RunOptions::default()).unwrap();
    let after_first = engine.totals().evaluations;
    engine.evaluate("4; 5;", RunOptions::default()).unwrap();
    assert!(engine.totals().evaluations > after_first);
}
