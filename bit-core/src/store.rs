//! Keyed mutable store with synchronous change broadcast

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::action::{ActionArgs, Actions};
use crate::error::Result;
use crate::path::StatePath;
use crate::selector::Selector;
use crate::StateTree;

/// Callback invoked with the whole state tree after every write.
pub type Listener = Arc<dyn Fn(&StateTree) + Send + Sync>;

/// Deepest allowed nesting of listener sweeps on one thread.
///
/// A listener that writes to the store starts a nested sweep. Past this
/// depth the write is still applied but its sweep is skipped.
pub const MAX_NOTIFY_DEPTH: usize = 64;

thread_local! {
    static NOTIFY_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Identifies a subscribed listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

struct Inner {
    state: RwLock<Arc<StateTree>>,
    listeners: Mutex<BTreeMap<ListenerId, Listener>>,
    next_listener: AtomicU64,
    actions: Actions,
    middleware: Arc<dyn Middleware>,
}

/// Observable state container.
///
/// `Store` is a cheap handle: clones point at the same tree, listeners and
/// action registry. Every [`set`](Store::set) synchronously notifies every
/// listener, in subscription order, before returning. Each listener is
/// handed the tree as it stands when that listener runs, so writes made by
/// an earlier listener are already visible to later ones.
///
/// The handle is `Send + Sync`, but write ordering is only meaningful when
/// all writes come from one task. [`BitRuntime`](crate::runtime::BitRuntime)
/// is that task; async work reports back through messages instead of
/// writing directly.
///
/// # Example
///
/// ```
/// use bit_core::Store;
/// use serde_json::json;
///
/// let store = Store::new(json!({}));
/// store.set("user.name", "Sam");
/// assert_eq!(store.get("user.name"), Some(json!("Sam")));
/// assert_eq!(store.get("user.age"), None);
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    /// Create a store seeded with `state`.
    pub fn new(state: impl Into<StateTree>) -> Self {
        Self::with_middleware(state, NoopMiddleware)
    }

    /// Create a store whose writes and action calls pass through `middleware`.
    pub fn with_middleware<M: Middleware + 'static>(
        state: impl Into<StateTree>,
        middleware: M,
    ) -> Self {
        Self::with_shared_middleware(state, Arc::new(middleware))
    }

    pub(crate) fn with_shared_middleware(
        state: impl Into<StateTree>,
        middleware: Arc<dyn Middleware>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(Arc::new(state.into())),
                listeners: Mutex::new(BTreeMap::new()),
                next_listener: AtomicU64::new(1),
                actions: Actions::new(Arc::clone(&middleware)),
                middleware,
            }),
        }
    }

    /// Read the value at `path`.
    ///
    /// Missing segments give `None`; this never fails.
    pub fn get(&self, path: &str) -> Option<Value> {
        let path = StatePath::parse(path);
        let state = self.inner.state.read();
        path.resolve(&state).cloned()
    }

    /// Read and deserialize the value at `path`.
    ///
    /// `None` when the path is missing or holds a different shape.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        let value = self.get(path)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(err) => {
                tracing::debug!(path, error = %err, "Stored value has unexpected shape");
                None
            }
        }
    }

    /// Snapshot of the whole tree.
    pub fn state(&self) -> Arc<StateTree> {
        Arc::clone(&self.inner.state.read())
    }

    /// Write `value` at `path` and notify every listener.
    ///
    /// Missing containers are created on the way. A non-container value in
    /// the way is replaced (see [`try_set`](Store::try_set) for the strict
    /// variant). Returns the written value.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Value {
        let path = StatePath::parse(path);
        let value = value.into();
        self.inner.middleware.before_set(path.as_str(), &value);

        {
            let mut state = self.inner.state.write();
            path.assign(Arc::make_mut(&mut state), value.clone());
        }

        let notified = self.notify();
        self.inner.middleware.after_set(path.as_str(), notified);
        value
    }

    /// Write `value` at `path`, refusing to replace a non-container value
    /// that sits in the way. Nothing is written or notified on error.
    pub fn try_set(&self, path: &str, value: impl Into<Value>) -> Result<Value> {
        let path = StatePath::parse(path);
        let value = value.into();

        path.check_writable(&self.state())?;
        self.inner.middleware.before_set(path.as_str(), &value);
        {
            let mut state = self.inner.state.write();
            path.try_assign(Arc::make_mut(&mut state), value.clone())?;
        }

        let notified = self.notify();
        self.inner.middleware.after_set(path.as_str(), notified);
        Ok(value)
    }

    /// Read a typed selector.
    pub fn select<T: DeserializeOwned>(&self, selector: &Selector<T>) -> Option<T> {
        self.get_as(selector.path())
    }

    /// Write through a typed selector.
    pub fn put<T: Serialize>(&self, selector: &Selector<T>, value: T) -> Result<Value> {
        let value = serde_json::to_value(value)?;
        Ok(self.set(selector.path(), value))
    }

    /// Live handle to this store's actions.
    pub fn actions(&self) -> &Actions {
        &self.inner.actions
    }

    /// Insert or overwrite an action. No listener is notified.
    pub fn register_action<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn(&ActionArgs) + Send + Sync + 'static,
    {
        self.inner.actions.register(name, callback);
    }

    /// Subscribe a closure. Every call creates a new subscription.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StateTree) + Send + Sync + 'static,
    {
        self.insert_listener(Arc::new(listener))
    }

    /// Subscribe a shared listener.
    ///
    /// Subscribing the same `Arc` again returns the existing id instead of
    /// adding a second entry.
    pub fn subscribe_listener(&self, listener: Listener) -> ListenerId {
        {
            let listeners = self.inner.listeners.lock();
            if let Some((id, _)) = listeners.iter().find(|(_, l)| Arc::ptr_eq(l, &listener)) {
                return *id;
            }
        }
        self.insert_listener(listener)
    }

    /// Subscribe a closure for as long as the returned guard lives.
    pub fn subscribe_scoped<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StateTree) + Send + Sync + 'static,
    {
        let id = self.subscribe(listener);
        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a listener. Returns whether it was subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        remove_listener(&self.inner, id)
    }

    /// Number of subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Whether two handles point at the same store.
    pub fn ptr_eq(a: &Store, b: &Store) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    fn insert_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().insert(id, listener);
        tracing::trace!(listener = id.0, "Listener subscribed");
        id
    }

    /// Run every listener against the current tree, isolating panics.
    ///
    /// The listener list is copied first, so listeners may subscribe,
    /// unsubscribe or write without deadlocking. The tree is re-read before
    /// each call so a nested write is never followed by an older tree.
    /// Returns how many listeners ran.
    fn notify(&self) -> usize {
        let depth = NOTIFY_DEPTH.with(|d| d.get());
        if depth >= MAX_NOTIFY_DEPTH {
            tracing::error!(
                depth,
                "Listener writes nested too deeply, skipping notification sweep"
            );
            return 0;
        }

        let listeners: Vec<(ListenerId, Listener)> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        NOTIFY_DEPTH.with(|d| d.set(depth + 1));
        let _reset = DepthReset(depth);
        for (id, listener) in &listeners {
            let tree = self.state();
            if catch_unwind(AssertUnwindSafe(|| listener(&tree))).is_err() {
                tracing::error!(listener = id.0, "Listener panicked, continuing sweep");
            }
        }
        listeners.len()
    }
}

struct DepthReset(usize);

impl Drop for DepthReset {
    fn drop(&mut self) {
        NOTIFY_DEPTH.with(|d| d.set(self.0));
    }
}

fn remove_listener(inner: &Inner, id: ListenerId) -> bool {
    let removed = inner.listeners.lock().remove(&id).is_some();
    if removed {
        tracing::trace!(listener = id.0, "Listener unsubscribed");
    }
    removed
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.inner.state.read())
            .field("listeners", &self.listener_count())
            .field("actions", &self.inner.actions)
            .finish()
    }
}

/// Guard that unsubscribes its listener when dropped.
///
/// Holding a guard does not keep the store alive.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: ListenerId,
    store: Weak<Inner>,
}

impl Subscription {
    /// Id of the guarded listener.
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            remove_listener(&inner, self.id);
        }
    }
}

/// Middleware trait for observing writes and action calls
///
/// Implement this trait to add logging, persistence, or other
/// cross-cutting concerns to your store. Hooks take `&self`; keep any
/// bookkeeping behind interior mutability.
pub trait Middleware: Send + Sync {
    /// Called before a value is written
    fn before_set(&self, path: &str, value: &Value) {
        let _ = (path, value);
    }

    /// Called after a write, with the number of listeners notified
    fn after_set(&self, path: &str, listeners_notified: usize) {
        let _ = (path, listeners_notified);
    }

    /// Called before an action handler runs
    fn on_dispatch(&self, action: &str, args: &ActionArgs) {
        let _ = (action, args);
    }
}

/// A no-op middleware that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMiddleware;

impl Middleware for NoopMiddleware {}

/// Middleware that logs writes and action calls (for debugging)
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    /// Whether to log before a write
    pub log_before: bool,
    /// Whether to log after a write
    pub log_after: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware with default settings (log after only)
    pub fn new() -> Self {
        Self {
            log_before: false,
            log_after: true,
        }
    }

    /// Create a logging middleware that logs both before and after
    pub fn verbose() -> Self {
        Self {
            log_before: true,
            log_after: true,
        }
    }
}

impl Middleware for LoggingMiddleware {
    fn before_set(&self, path: &str, value: &Value) {
        if self.log_before {
            tracing::debug!(path, %value, "Writing state");
        }
    }

    fn after_set(&self, path: &str, listeners_notified: usize) {
        if self.log_after {
            tracing::debug!(path, listeners_notified, "State written");
        }
    }

    fn on_dispatch(&self, action: &str, args: &ActionArgs) {
        tracing::debug!(action, args = args.len(), "Dispatching action");
    }
}

/// Compose multiple middleware into a single middleware
#[derive(Default)]
pub struct ComposedMiddleware {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl fmt::Debug for ComposedMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedMiddleware")
            .field("middlewares_count", &self.middlewares.len())
            .finish()
    }
}

impl ComposedMiddleware {
    /// Create a new composed middleware
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the composition
    pub fn add<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Box::new(middleware));
        self
    }
}

impl Middleware for ComposedMiddleware {
    fn before_set(&self, path: &str, value: &Value) {
        for middleware in &self.middlewares {
            middleware.before_set(path, value);
        }
    }

    fn after_set(&self, path: &str, listeners_notified: usize) {
        // Call in reverse order for proper nesting
        for middleware in self.middlewares.iter().rev() {
            middleware.after_set(path, listeners_notified);
        }
    }

    fn on_dispatch(&self, action: &str, args: &ActionArgs) {
        for middleware in &self.middlewares {
            middleware.on_dispatch(action, args);
        }
    }
}
