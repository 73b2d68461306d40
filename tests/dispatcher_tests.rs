#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Tests for the dispatcher's invocation contract
//!
//! # Test Coverage
//!
//! - fault containment for panics and `Err` returns (store writes survive)
//! - exactly one handler call per dispatch, whatever the outcome
//! - the default response and descriptor-shaped results
//! - the counter scenarios: fault after write, increment, lost update
//! - diagnostic log entries carrying the invocation id

mod common;

use common::logs::CapturedLogs;
use edgerun::demos::{CounterHandler, FaultyCounterHandler, COUNTER_KEY};
use edgerun::dispatcher::{
    handler_fn, DispatchError, Dispatcher, FaultKind, HandlerOutput, InvocationState, Outcome,
    DEFAULT_HANDLER,
};
use edgerun::ids::InvocationId;
use edgerun::middleware::TracingMiddleware;
use edgerun::response::Response;
use edgerun::store::KvStore;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

#[test]
fn test_panic_is_contained_and_prior_writes_survive() {
    let dispatcher = Dispatcher::new(KvStore::in_memory());
    let handler = handler_fn(|ctx| {
        ctx.store().set("a", json!(1))?;
        ctx.store().set("b", json!(2))?;
        let empty: Vec<u8> = Vec::new();
        let second = empty[1];
        ctx.store().set("c", json!(second))?;
        Ok(Response::new().into())
    });

    let receipt = dispatcher.invoke(&handler);

    assert_eq!(receipt.status(), 500);
    assert_eq!(dispatcher.store().keys(), vec!["a", "b"]);
    match receipt.outcome {
        Outcome::Faulted {
            error: DispatchError::Fault(fault),
        } => {
            assert_eq!(fault.kind, FaultKind::Panic);
            assert!(fault.message.contains("index out of bounds"));
            assert!(fault.location.unwrap().contains(".rs:"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_handler_runs_exactly_once_per_dispatch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = Dispatcher::default();

    let c = Arc::clone(&calls);
    let ok = handler_fn(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new().into())
    });
    let c = Arc::clone(&calls);
    let panics = handler_fn(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        panic!("boom");
    });
    let c = Arc::clone(&calls);
    let errors = handler_fn(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!("nope"))
    });
    let c = Arc::clone(&calls);
    let invalid = handler_fn(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(json!(42).into())
    });

    assert_eq!(dispatcher.dispatch(&ok).status(), 200);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.dispatch(&panics).status(), 500);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(dispatcher.dispatch(&errors).status(), 500);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(dispatcher.dispatch(&invalid).status(), 500);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_default_response_is_stable() {
    let a = Response::new();
    let b = Response::default();
    assert_eq!(a, b);
    assert_eq!(a.status(), 200);
    assert!(a.headers().is_empty());
    assert!(a.body().is_none());
    assert_eq!(
        serde_json::to_value(&a).unwrap(),
        serde_json::to_value(Response::new()).unwrap()
    );
}

#[test]
fn test_descriptor_value_is_a_response() {
    let dispatcher = Dispatcher::default();
    let handler = handler_fn(|_| {
        Ok(json!({
            "status": 201,
            "headers": {"content-type": "text/plain"},
            "body": "created"
        })
        .into())
    });
    let receipt = dispatcher.invoke(&handler);
    assert!(receipt.outcome.is_completed());
    assert_eq!(receipt.status(), 201);
    assert_eq!(receipt.response.get_header("Content-Type"), Some("text/plain"));
    assert_eq!(receipt.response.body(), Some(&json!("created")));
}

#[test]
fn test_status_out_of_range_is_invalid_result() {
    let dispatcher = Dispatcher::default();
    let handler = handler_fn(|_| Ok(HandlerOutput::Value(json!({"status": 42}))));
    let receipt = dispatcher.invoke(&handler);
    assert_eq!(receipt.status(), 500);
    assert!(matches!(
        receipt.outcome,
        Outcome::InvalidResult {
            error: DispatchError::InvalidResult(_)
        }
    ));
}

#[test]
fn test_scenario_fault_after_first_write() {
    let dispatcher = Dispatcher::new(KvStore::in_memory());
    assert_eq!(dispatcher.store().get(COUNTER_KEY).unwrap(), None);

    let receipt = dispatcher.invoke(&FaultyCounterHandler);

    assert_eq!(dispatcher.store().get(COUNTER_KEY).unwrap(), Some(json!(0)));
    assert_eq!(receipt.status(), 500);
    assert_eq!(receipt.console, vec!["Counter: null"]);
    assert_eq!(
        receipt.states,
        vec![
            InvocationState::Created,
            InvocationState::Invoking,
            InvocationState::Faulted,
            InvocationState::Finalized,
        ]
    );
}

#[test]
fn test_scenario_increment_existing_counter() {
    let store = KvStore::in_memory();
    store.set(COUNTER_KEY, json!(5)).unwrap();
    let dispatcher = Dispatcher::new(store.clone());

    let res = dispatcher.dispatch(&CounterHandler);

    assert_eq!(res, Response::new());
    assert_eq!(store.get(COUNTER_KEY).unwrap(), Some(json!(6)));
}

#[test]
fn test_scenario_concurrent_read_then_write_loses_an_update() {
    let store = KvStore::in_memory();
    store.set(COUNTER_KEY, json!(0)).unwrap();
    let mut dispatcher = Dispatcher::new(store.clone());

    // Both invocations read before either writes.
    let barrier = Arc::new(Barrier::new(2));
    let b = Arc::clone(&barrier);
    dispatcher.register_handler(
        DEFAULT_HANDLER,
        handler_fn(move |ctx| {
            let seen = ctx.store().get_as::<i64>(COUNTER_KEY)?.unwrap_or(0);
            b.wait();
            ctx.store().set(COUNTER_KEY, json!(seen + 1))?;
            Ok(Response::new().into())
        }),
    );

    let dispatcher = &dispatcher;
    std::thread::scope(|s| {
        let a = s.spawn(|| dispatcher.dispatch_named(DEFAULT_HANDLER));
        let b = s.spawn(|| dispatcher.dispatch_named(DEFAULT_HANDLER));
        assert_eq!(a.join().unwrap().status(), 200);
        assert_eq!(b.join().unwrap().status(), 200);
    });

    assert_eq!(store.get(COUNTER_KEY).unwrap(), Some(json!(1)));
}

#[test]
fn test_fault_in_one_invocation_does_not_disturb_another() {
    let store = KvStore::in_memory();
    let dispatcher = Dispatcher::new(store.clone());
    std::thread::scope(|s| {
        for i in 0..8 {
            let dispatcher = &dispatcher;
            s.spawn(move || {
                for _ in 0..25 {
                    if i % 2 == 0 {
                        let _ = dispatcher.dispatch(&FaultyCounterHandler);
                    } else {
                        let key = format!("worker-{i}");
                        let handler = handler_fn(move |ctx| {
                            let n = ctx.store().get_as::<i64>(&key)?.unwrap_or(0);
                            ctx.store().set(&key, json!(n + 1))?;
                            Ok(Response::new().into())
                        });
                        assert_eq!(dispatcher.dispatch(&handler).status(), 200);
                    }
                }
            });
        }
    });
    for i in (1..8).step_by(2) {
        assert_eq!(store.get(&format!("worker-{i}")).unwrap(), Some(json!(25)));
    }
}

#[test]
fn test_fault_log_carries_invocation_id() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let dispatcher = Dispatcher::default();
    let id = InvocationId::new();
    let receipt = dispatcher.invoke_with_id("faulty", &FaultyCounterHandler, id);
    assert_eq!(receipt.invocation_id, id);

    let faults = logs.events("Handler faulted");
    assert_eq!(faults.len(), 1);
    let fields = &faults[0]["fields"];
    assert_eq!(fields["invocation_id"], id.to_string());
    assert_eq!(fields["handler_name"], "faulty");
    assert!(fields["fault_message"]
        .as_str()
        .unwrap()
        .contains("index out of bounds"));
    assert_eq!(faults[0]["level"], "ERROR");

    let console = logs.events("Counter: null");
    assert_eq!(console.len(), 1);
    assert_eq!(console[0]["target"], "edgerun::console");
}

#[test]
fn test_unknown_handler_is_404() {
    let dispatcher = Dispatcher::default();
    let res = dispatcher.dispatch_named("nope");
    assert_eq!(res.status(), 404);
    assert_eq!(res.body(), Some(&json!({"error": "handler 'nope' not found"})));
}

#[test]
fn test_tracing_middleware_reports_status_reason() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let mut dispatcher = Dispatcher::default();
    dispatcher.add_middleware(Arc::new(TracingMiddleware));
    let ok = handler_fn(|_| Ok(Response::builder().status(202).build().into()));
    let _ = dispatcher.dispatch(&ok);
    let _ = dispatcher.dispatch(&FaultyCounterHandler);

    let finalized = logs.events("Invocation finalized");
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0]["fields"]["status"], 202);
    assert_eq!(finalized[0]["fields"]["reason"], "Accepted");

    let faulted = logs.events("Invocation finalized with fault");
    assert_eq!(faulted.len(), 1);
    assert_eq!(faulted[0]["fields"]["reason"], "Internal Server Error");
    assert_eq!(faulted[0]["level"], "WARN");
}
