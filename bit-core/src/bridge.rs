//! State-to-view binding
//!
//! A [`Binding`] follows one path in the store. Its listener re-resolves
//! the path after every write (the store has no per-path dependency
//! tracking), and when the resolved value differs from the bound one it
//! stores the new value, bumps the binding's version and raises the
//! [`RenderSignal`] shared with the runtime.
//!
//! Dropping a binding unsubscribes its listener.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::path::StatePath;
use crate::selector::Selector;
use crate::store::{Store, Subscription};

/// Flag raised when something bound to the store changed and the unit
/// should be drawn again.
#[derive(Clone, Default)]
pub struct RenderSignal(Arc<AtomicBool>);

impl RenderSignal {
    /// New, lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a render.
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a render is pending.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Consume the pending request, if any.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl fmt::Debug for RenderSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RenderSignal").field(&self.is_requested()).finish()
    }
}

/// Creates bindings against one store.
#[derive(Clone, Debug)]
pub struct Bridge {
    store: Store,
    render: RenderSignal,
}

impl Bridge {
    /// Bridge raising `render` whenever one of its bindings changes.
    pub fn new(store: Store, render: RenderSignal) -> Self {
        Self { store, render }
    }

    /// Bind to `path`, starting from its current value.
    pub fn use_props(&self, path: impl Into<StatePath>) -> Binding {
        let path = path.into();
        let initial = path.resolve(&self.store.state()).cloned();
        let current = Arc::new(Mutex::new(initial));
        let version = Arc::new(AtomicU64::new(0));

        let subscription = {
            let path = path.clone();
            let current = Arc::clone(&current);
            let version = Arc::clone(&version);
            let render = self.render.clone();
            self.store.subscribe_scoped(move |tree| {
                let next = path.resolve(tree);
                let mut bound = current.lock();
                if bound.as_ref() != next {
                    *bound = next.cloned();
                    version.fetch_add(1, Ordering::AcqRel);
                    render.request();
                }
            })
        };

        tracing::trace!(path = %path, "Binding created");
        Binding {
            path,
            current,
            version,
            _subscription: subscription,
        }
    }

    /// Bind to a typed selector.
    pub fn use_selector<T: DeserializeOwned>(&self, selector: &Selector<T>) -> SelectorBinding<T> {
        SelectorBinding {
            binding: self.use_props(selector.path()),
            _marker: PhantomData,
        }
    }

    /// The bridged store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The signal raised by this bridge's bindings.
    pub fn render_signal(&self) -> &RenderSignal {
        &self.render
    }
}

/// Live view of one store path.
pub struct Binding {
    path: StatePath,
    current: Arc<Mutex<Option<Value>>>,
    version: Arc<AtomicU64>,
    _subscription: Subscription,
}

impl Binding {
    /// Current value, `None` while the path is unset.
    pub fn get(&self) -> Option<Value> {
        self.current.lock().clone()
    }

    /// Current value deserialized, `None` when unset or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self) -> Option<T> {
        let value = self.current.lock().clone()?;
        serde_json::from_value(value).ok()
    }

    /// Run `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        f(self.current.lock().as_ref())
    }

    /// Number of changes observed since the binding was created.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// The bound path.
    pub fn path(&self) -> &StatePath {
        &self.path
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("path", &self.path.as_str())
            .field("value", &self.get())
            .field("version", &self.version())
            .finish()
    }
}

/// Binding read through a typed selector.
pub struct SelectorBinding<T> {
    binding: Binding,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> SelectorBinding<T> {
    /// Current typed value.
    pub fn get(&self) -> Option<T> {
        self.binding.get_as()
    }

    /// Number of changes observed.
    pub fn version(&self) -> u64 {
        self.binding.version()
    }

    /// The untyped binding underneath.
    pub fn raw(&self) -> &Binding {
        &self.binding
    }
}

impl<T> fmt::Debug for SelectorBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SelectorBinding").field(&self.binding).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bridge(state: Value) -> (Store, Bridge) {
        let store = Store::new(state);
        let bridge = Bridge::new(store.clone(), RenderSignal::new());
        (store, bridge)
    }

    #[test]
    fn test_initial_value_and_update() {
        let (store, bridge) = bridge(json!({ "a": { "b": 1 } }));
        let binding = bridge.use_props("a.b");
        assert_eq!(binding.get(), Some(json!(1)));
        assert_eq!(binding.version(), 0);

        store.set("a.b", 2);
        assert_eq!(binding.get(), Some(json!(2)));
        assert_eq!(binding.version(), 1);
        assert!(bridge.render_signal().take());
    }

    #[test]
    fn test_unrelated_writes_do_not_request_render() {
        let (store, bridge) = bridge(json!({ "a": 1 }));
        let binding = bridge.use_props("a");

        store.set("other", true);
        assert_eq!(binding.version(), 0);
        assert!(!bridge.render_signal().is_requested());
    }

    #[test]
    fn test_never_set_path_stays_none() {
        let (store, bridge) = bridge(json!({}));
        let binding = bridge.use_props("never.set");
        store.set("x", 1);
        store.set("y", 2);
        assert_eq!(binding.get(), None);
    }

    #[test]
    fn test_parent_replacement_updates_child_binding() {
        let (store, bridge) = bridge(json!({ "vip": { "name": "Ana" } }));
        let binding = bridge.use_props("vip.name");

        store.set("vip", json!({ "name": "Ben" }));
        assert_eq!(binding.get_as::<String>().as_deref(), Some("Ben"));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let (store, bridge) = bridge(json!({}));
        let binding = bridge.use_props("a");
        assert_eq!(store.listener_count(), 1);
        drop(binding);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_selector_binding() {
        let (store, bridge) = bridge(json!({}));
        let q: Selector<String> = Selector::new("consolidation.vip.consolidatorQ");
        let binding = bridge.use_selector(&q);
        assert_eq!(binding.get(), None);

        store.put(&q, "maria".to_string()).unwrap();
        assert_eq!(binding.get().as_deref(), Some("maria"));
    }
}
