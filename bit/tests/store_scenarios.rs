//! End-to-end store behavior through the public API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bit::testing::{ActionProbe, ListenerProbe};
use bit::path::MAX_ARRAY_PAD;
use bit::store::MAX_NOTIFY_DEPTH;
use bit::{assert_dispatched, count_dispatched, Composer, Store};
use serde_json::json;

#[test]
fn test_read_after_write_and_missing_paths() {
    let store = Store::new(json!({}));
    store.set("user.name", "Sam");

    assert_eq!(store.get("user.name"), Some(json!("Sam")));
    assert_eq!(store.get("user.age"), None);
    assert_eq!(store.get("never.written.anywhere"), None);

    let composite = json!({ "tags": ["a", "b"], "active": true });
    store.set("user.profile", composite.clone());
    assert_eq!(store.get("user.profile"), Some(composite));
}

#[test]
fn test_listener_called_once_per_write() {
    let store = Store::new(json!({}));
    let probe = ListenerProbe::attach(&store);

    store.set("x", 1);
    store.set("y", 2);

    assert_eq!(probe.calls(), 2);
    let trees = probe.snapshots();
    assert_eq!(trees[0]["x"], json!(1));
    assert_eq!(trees[1], json!({ "x": 1, "y": 2 }));
}

#[test]
fn test_every_listener_sees_the_written_value() {
    let store = Store::new(json!({}));
    let probes: Vec<ListenerProbe> = (0..4).map(|_| ListenerProbe::attach(&store)).collect();

    store.set("a.b.c", "deep");

    for probe in &probes {
        assert_eq!(probe.calls(), 1);
        assert_eq!(probe.last().unwrap()["a"]["b"]["c"], json!("deep"));
    }
}

#[test]
fn test_unsubscribed_listener_is_never_called_again() {
    let store = Store::new(json!({}));
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let id = store.subscribe(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    store.set("a", 1);
    store.unsubscribe(id);
    for i in 0..5 {
        store.set("a", i);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_action_overwrite_calls_only_latest() {
    let probe = ActionProbe::new();
    let store = Store::with_middleware(json!({}), probe.clone());
    let fn1 = Arc::new(AtomicUsize::new(0));
    let fn2 = Arc::new(AtomicUsize::new(0));

    let f1 = Arc::clone(&fn1);
    store.register_action("ping", move |_| {
        f1.fetch_add(1, Ordering::SeqCst);
    });
    store.actions().dispatch("ping", ()).unwrap();
    assert_eq!(fn1.load(Ordering::SeqCst), 1);

    let f2 = Arc::clone(&fn2);
    store.register_action("ping", move |_| {
        f2.fetch_add(1, Ordering::SeqCst);
    });
    store.actions().dispatch("ping", ()).unwrap();

    assert_eq!(fn1.load(Ordering::SeqCst), 1);
    assert_eq!(fn2.load(Ordering::SeqCst), 1);
    assert_dispatched!(probe, "ping");
    assert_eq!(count_dispatched!(probe, "ping"), 2);
}

#[test]
fn test_composed_binding_follows_writes() {
    let unit = Composer::new(json!({ "a": { "b": 1 } })).compose().unwrap();
    let bound = unit.context().use_props("a.b");
    assert_eq!(bound.get(), Some(json!(1)));

    unit.store().set("a.b", 2);
    assert_eq!(bound.get(), Some(json!(2)));
    assert!(unit.take_render_request());
}

/// Listener chain `a -> b -> c -> d`: each level writes the next path from
/// inside its own notification, three levels deep.
#[test]
fn test_reentrant_writes_depth_three() {
    let store = Store::new(json!({}));
    let chain = [("a", "b"), ("b", "c"), ("c", "d")];
    for (from, to) in chain {
        let writer = store.clone();
        store.subscribe(move |tree| {
            if tree.get(from).is_some() && tree.get(to).is_none() {
                writer.set(to, true);
            }
        });
    }
    let probe = ListenerProbe::attach(&store);

    store.set("a", true);

    let full = json!({ "a": true, "b": true, "c": true, "d": true });
    assert_eq!(*store.state(), full);
    // One sweep per write. Outer sweeps resume on the live tree, so no
    // listener is handed a tree older than one it has already seen.
    assert_eq!(probe.snapshots(), [full.clone(), full.clone(), full.clone(), full]);
}

#[test]
fn test_binding_registered_after_writer_follows_nested_write() {
    let unit = Composer::new(json!({})).compose().unwrap();
    let store = unit.store().clone();
    let writer = store.clone();
    store.subscribe(move |tree| {
        if tree.get("a").is_some() && tree.get("b").is_none() {
            writer.set("b", 1);
        }
    });
    let bound = unit.context().use_props("b");

    store.set("a", true);

    assert_eq!(store.get("b"), Some(json!(1)));
    assert_eq!(bound.get(), Some(json!(1)));
    assert_eq!(bound.version(), 1);
}

#[test]
fn test_numeric_segments_past_padding_limit() {
    let store = Store::new(json!({ "items": ["a"] }));

    let huge = format!("items.{}", usize::MAX);
    store.set(&huge, 1);
    // Kept as an object key; the existing item survives under "0".
    assert_eq!(store.get(&huge), Some(json!(1)));
    assert_eq!(store.get("items.0"), Some(json!("a")));

    let fresh = Store::new(json!({}));
    fresh.set("list.4000000000", "far");
    assert_eq!(fresh.get("list"), Some(json!({ "4000000000": "far" })));

    let err = Store::new(json!({ "items": [] }))
        .try_set("items.4000000000", 1)
        .unwrap_err();
    assert!(matches!(err, bit::BitError::IndexTooFar { .. }));

    let padded = Store::new(json!({ "items": [] }));
    padded.set(&format!("items.{MAX_ARRAY_PAD}"), true);
    assert_eq!(
        padded.get_as::<Vec<serde_json::Value>>("items").map(|v| v.len()),
        Some(MAX_ARRAY_PAD + 1)
    );
}

#[test]
fn test_runaway_listener_recursion_is_cut_off() {
    let store = Store::new(json!({ "n": 0 }));
    let writer = store.clone();
    store.subscribe(move |tree| {
        let n = tree["n"].as_u64().unwrap_or_default();
        writer.set("n", n + 1);
    });

    store.set("n", 1);

    // Every nested write applied, the sweep stopped at the depth limit.
    let n = store.get_as::<u64>("n").unwrap();
    assert_eq!(n as usize, MAX_NOTIFY_DEPTH + 1);
}

#[test]
fn test_panicking_listener_does_not_starve_others() {
    let store = Store::new(json!({}));
    let before = ListenerProbe::attach(&store);
    store.subscribe(|_| panic!("listener failure"));
    let after = ListenerProbe::attach(&store);

    store.set("a", 1);

    assert_eq!(before.calls(), 1);
    assert_eq!(after.calls(), 1);
}

#[test]
fn test_try_set_refuses_to_write_through_primitive() {
    let store = Store::new(json!({ "user": "Sam" }));
    let err = store.try_set("user.name", "Sam").unwrap_err();
    assert!(matches!(err, bit::BitError::NotAContainer { .. }));

    // The lenient write replaces the primitive with a container.
    store.set("user.name", "Sam");
    assert_eq!(store.get("user"), Some(json!({ "name": "Sam" })));
}
