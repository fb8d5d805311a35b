//! Process-wide escape hatch for code outside the view tree
//!
//! Route guards, key handlers and other imperative call sites sometimes need
//! the current state without having a [`Context`](crate::Context) threaded
//! through to them. This module is the one sanctioned way around the
//! ownership graph: a small set of named slots, each written once and read
//! any number of times, keyed by a typed [`GlobalKey`] so a read cannot ask
//! for the wrong type.
//!
//! It is deliberately narrow. Anything that can receive a `Context` or a
//! `Store` handle should take it as a parameter instead.
//!
//! ```
//! use bit_core::global::{register_global, retrieve_global, GlobalKey};
//!
//! static API_BASE: GlobalKey<String> = GlobalKey::new("doc.api_base");
//!
//! assert_eq!(retrieve_global(&API_BASE), None);
//! register_global(&API_BASE, "https://edge.example".to_string()).unwrap();
//! assert!(register_global(&API_BASE, "again".to_string()).is_err());
//! assert_eq!(retrieve_global(&API_BASE).as_deref(), Some("https://edge.example"));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::OnceLock;

use parking_lot::RwLock;
use serde_json::Value;

use crate::action::Actions;
use crate::error::{BitError, Result};
use crate::store::Store;

type Slots = RwLock<HashMap<&'static str, Box<dyn Any + Send + Sync>>>;

static SLOTS: OnceLock<Slots> = OnceLock::new();

fn slots() -> &'static Slots {
    SLOTS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Typed name of a global slot.
pub struct GlobalKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> GlobalKey<T> {
    /// Key for the slot called `name`.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Slot name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for GlobalKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobalKey").field(&self.name).finish()
    }
}

/// Slot holding the application root's store.
pub static STORE_KEY: GlobalKey<Store> = GlobalKey::new("STORE");

/// Fill a slot. Each slot can be written once per process.
pub fn register_global<T>(key: &GlobalKey<T>, value: T) -> Result<()>
where
    T: Any + Send + Sync,
{
    let mut slots = slots().write();
    if slots.contains_key(key.name) {
        return Err(BitError::AlreadyRegistered(key.name));
    }
    slots.insert(key.name, Box::new(value));
    tracing::debug!(key = key.name, "Global registered");
    Ok(())
}

/// Read a slot. `None` until it has been registered.
pub fn retrieve_global<T>(key: &GlobalKey<T>) -> Option<T>
where
    T: Any + Send + Sync + Clone,
{
    let slots = slots().read();
    let value = slots.get(key.name)?;
    match value.downcast_ref::<T>() {
        Some(value) => Some(value.clone()),
        None => {
            tracing::warn!(
                key = key.name,
                "Global slot holds a different type than requested"
            );
            None
        }
    }
}

/// Whether a slot has been filled.
pub fn is_registered<T>(key: &GlobalKey<T>) -> bool {
    slots().read().contains_key(key.name)
}

/// The root store, once the root unit is ready.
pub fn root_store() -> Option<Store> {
    retrieve_global(&STORE_KEY)
}

/// Read a path from the root store without subscribing.
///
/// `None` both when the path is unset and when no root store exists yet.
pub fn root_props(path: &str) -> Option<Value> {
    root_store()?.get(path)
}

/// The root store's action registry.
pub fn root_actions() -> Option<Actions> {
    root_store().map(|store| store.actions().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static COUNTER: GlobalKey<u32> = GlobalKey::new("test.counter");
    static MISTYPED: GlobalKey<String> = GlobalKey::new("test.mistyped");
    static MISTYPED_AS_NUMBER: GlobalKey<u64> = GlobalKey::new("test.mistyped");
    static LOCAL_STORE: GlobalKey<Store> = GlobalKey::new("test.store");

    #[test]
    fn test_write_once_read_many() {
        assert!(!is_registered(&COUNTER));
        register_global(&COUNTER, 7).unwrap();
        assert!(matches!(
            register_global(&COUNTER, 8),
            Err(BitError::AlreadyRegistered("test.counter"))
        ));
        assert_eq!(retrieve_global(&COUNTER), Some(7));
        assert_eq!(retrieve_global(&COUNTER), Some(7));
    }

    #[test]
    fn test_type_mismatch_reads_none() {
        register_global(&MISTYPED, "text".to_string()).unwrap();
        assert_eq!(retrieve_global(&MISTYPED_AS_NUMBER), None);
    }

    #[test]
    fn test_store_identity_survives() {
        let store = Store::new(json!({ "a": 1 }));
        register_global(&LOCAL_STORE, store.clone()).unwrap();

        let found = retrieve_global(&LOCAL_STORE).unwrap();
        assert!(Store::ptr_eq(&store, &found));

        store.set("a", 2);
        assert_eq!(found.get("a"), Some(json!(2)));
    }
}
