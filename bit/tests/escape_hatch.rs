//! Root store access from outside the view tree
//!
//! The root slot is process-wide, so everything touching it lives in one
//! test.

use bit::global::is_registered;
use bit::{
    root_actions, root_props, root_store, ActionSet, BitError, Composer, WorkerContext, STORE_KEY,
};
use serde_json::json;

#[test]
fn test_root_unit_is_reachable_through_the_escape_hatch() {
    assert!(root_store().is_none());
    assert_eq!(root_props("session.user"), None);

    let unit = Composer::new(json!({ "session": { "user": "ana" } }))
        .worker(|ctx: &WorkerContext| {
            let store = ctx.store().clone();
            ActionSet::new().action("logout", move |_| {
                store.set("session.user", serde_json::Value::Null);
            })
        })
        .root()
        .compose()
        .unwrap();

    assert!(is_registered(&STORE_KEY));
    let found = root_store().unwrap();
    assert!(bit::Store::ptr_eq(&found, unit.store()));

    assert_eq!(root_props("session.user"), Some(json!("ana")));
    unit.store().set("session.user", "sam");
    assert_eq!(root_props("session.user"), Some(json!("sam")));
    assert_eq!(root_props("session.missing"), None);

    root_actions().unwrap().dispatch("logout", ()).unwrap();
    assert_eq!(unit.store().get("session.user"), Some(json!(null)));

    // A second root is refused and the first stays in place.
    let err = Composer::new(json!({})).root().compose().unwrap_err();
    assert!(matches!(err, BitError::AlreadyRegistered("STORE")));
    assert!(bit::Store::ptr_eq(&root_store().unwrap(), unit.store()));

    // Non-root units never touch the slot.
    let other = Composer::new(json!({ "session": { "user": "zoe" } }))
        .compose()
        .unwrap();
    assert_eq!(other.store().get("session.user"), Some(json!("zoe")));
    assert_eq!(root_props("session.user"), Some(json!(null)));
}
