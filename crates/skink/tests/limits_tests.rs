use std::time::Duration;

use skink::{AbortSignal, Engine, HostValue, InterpreterOptions, Limits, RunLimits, RunOptions, codes};

fn limited(per_run: RunLimits) -> RunOptions {
    RunOptions {
        limits: Some(per_run),
        ..RunOptions::default()
    }
}

/// S6: a loop limit of 2 trips on the third back-edge with the fixed
/// message, and nothing observable escaped the run.
#[test]
fn loop_iteration_limit() {
    let engine = Engine::new(InterpreterOptions::default());
    let err = engine
        .evaluate("for (let i = 0; i < 3; i++) {}", limited(RunLimits::new().max_loop_iterations(2)))
        .unwrap_err();
    assert_eq!(err.code, codes::RUNTIME_LIMIT);
    assert!(err.message.contains("Maximum loop iterations exceeded"), "{}", err.message);

    // An ample limit lets the same loop finish.
    engine
        .evaluate("for (let i = 0; i < 3; i++) {}", limited(RunLimits::new().max_loop_iterations(100)))
        .unwrap();
}

#[test]
fn call_depth_limit_stops_runaway_recursion() {
    let engine = Engine::new(InterpreterOptions::default());
    let err = engine
        .evaluate("function f() { return f(); } f()", limited(RunLimits::new().max_call_depth(50)))
        .unwrap_err();
    assert_eq!(err.code, codes::RUNTIME_LIMIT);
    assert!(err.message.contains("Maximum call depth exceeded"), "{}", err.message);
}

/// Deep recursion is bounded even with no explicit configuration (the
/// default call-depth cap protects the host stack).
#[test]
fn default_call_depth_cap_applies() {
    let engine = Engine::new(InterpreterOptions::default());
    let err = engine
        .evaluate("function f() { return f(); } f()", RunOptions::default())
        .unwrap_err();
    assert_eq!(err.code, codes::RUNTIME_LIMIT);
}

#[test]
fn evaluation_limit_counts_statements() {
    let engine = Engine::new(InterpreterOptions::default());
    let err = engine
        .evaluate("let n = 0; while (true) { n += 1; }", limited(RunLimits::new().max_evaluations(100)))
        .unwrap_err();
    assert!(err.message.contains("Maximum evaluations exceeded"), "{}", err.message);
}

/// Counter limits raise catchable runtime errors.
#[test]
fn limit_errors_are_catchable_in_sandbox() {
    let engine = Engine::new(InterpreterOptions::default());
    let value = engine
        .evaluate(
            "let out = 'none'; try { for (let i = 0; i < 10; i++) {} } catch (e) { out = e.name; } out",
            limited(RunLimits::new().max_loop_iterations(2)),
        )
        .unwrap();
    assert_eq!(value, HostValue::String("RangeError".to_owned()));
}

/// A pre-aborted signal stops the run at its first boundary check, and the
/// abort is not catchable.
#[test]
fn abort_signal_is_fatal_and_uncatchable() {
    let engine = Engine::new(InterpreterOptions::default());
    let abort = AbortSignal::new();
    abort.abort();
    let options = RunOptions {
        abort: Some(abort),
        ..RunOptions::default()
    };
    let err = engine.evaluate("try { 1 } catch (e) { 2 }", options).unwrap_err();
    assert_eq!(err.code, codes::RUNTIME_ABORTED);
}

#[tokio::test]
async fn abort_mid_run_drops_pending_work() {
    let engine = Engine::new(InterpreterOptions::default());
    let abort = AbortSignal::new();
    let mut options = RunOptions {
        abort: Some(abort.clone()),
        ..RunOptions::default()
    };
    let signal = abort.clone();
    options.globals.insert(
        "pause".to_owned(),
        HostValue::async_function("pause", move |_| {
            let signal = signal.clone();
            Box::pin(async move {
                signal.abort();
                tokio::task::yield_now().await;
                Ok(HostValue::Undefined)
            })
        }),
    );
    // The abort lands while awaiting; the next resumption observes it.
    let err = engine
        .evaluate_async("await pause(); 'unreachable'", options)
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::RUNTIME_ABORTED);
}

/// Sync runs reject timeouts outright; async runs honor the deadline at the
/// next boundary after it passes.
#[tokio::test]
async fn timeouts_apply_to_async_runs_only() {
    let engine = Engine::new(InterpreterOptions::default());
    let err = engine
        .evaluate(
            "1",
            RunOptions {
                timeout_ms: Some(5),
                ..RunOptions::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.code, codes::RUNTIME_SYNC_SUSPEND);

    let mut options = RunOptions {
        timeout_ms: Some(5),
        ..RunOptions::default()
    };
    options.globals.insert(
        "sleep".to_owned(),
        HostValue::async_function("sleep", |args| {
            let ms = args.first().and_then(HostValue::as_number).unwrap_or(0.0) as u64;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(HostValue::Undefined)
            })
        }),
    );
    let err = engine.evaluate_async("await sleep(50); 'late'", options).await.unwrap_err();
    assert_eq!(err.code, codes::RUNTIME_TIMEOUT);
}

/// Engine-total limits span runs: what run one consumes bounds run two.
#[test]
fn engine_totals_bound_later_runs() {
    let engine = Engine::new(InterpreterOptions {
        limits: Limits {
            per_run: RunLimits::default(),
            total: RunLimits::new().max_loop_iterations(10),
        },
        ..InterpreterOptions::default()
    });
    engine
        .evaluate("for (let i = 0; i < 8; i++) {}", RunOptions::default())
        .unwrap();
    let err = engine
        .evaluate("for (let i = 0; i < 8; i++) {}", RunOptions::default())
        .unwrap_err();
    assert_eq!(err.code, codes::RUNTIME_LIMIT);
}

/// Hosts load limit configuration from config files; the serde shape is part
/// of the public contract.
#[test]
fn limits_deserialize_from_config_json() {
    let limits: RunLimits =
        serde_json::from_str(r#"{"max_call_depth": 10, "max_loop_iterations": 5, "max_evaluations": null}"#).unwrap();
    assert_eq!(limits.max_call_depth, Some(10));
    assert_eq!(limits.max_loop_iterations, Some(5));
    assert_eq!(limits.max_evaluations, None);
}

/// `evaluate_full` reports this run's counters.
#[test]
fn full_results_carry_run_stats() {
    let engine = Engine::new(InterpreterOptions::default());
    let out = engine
        .evaluate_full("let n = 0; for (let i = 0; i < 4; i++) { n += i; } n", RunOptions::default())
        .unwrap();
    assert_eq!(out.value, HostValue::Number(6.0));
    assert!(out.stats.loop_iterations >= 4, "stats: {:?}", out.stats);
    assert!(out.stats.evaluations > 0);
    assert!(out.totals.evaluations >= out.stats.evaluations);
}
