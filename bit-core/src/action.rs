//! Named action registry shared by a worker and its views

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{BitError, Result};
use crate::store::{Middleware, NoopMiddleware};

/// A registered action callback.
///
/// Actions are fire-and-forget: the handler's only effect is whatever it
/// does to the store or the outside world.
pub type ActionHandler = Arc<dyn Fn(&ActionArgs) + Send + Sync>;

/// Positional arguments passed to an action.
///
/// # Example
///
/// ```
/// use bit_core::ActionArgs;
///
/// let args = ActionArgs::new().with("vip-1").with(3);
/// let id: String = args.require(0).unwrap();
/// assert_eq!(id, "vip-1");
/// assert_eq!(args.get::<u32>(1), Some(3));
/// assert_eq!(args.get::<u32>(2), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionArgs(Vec<Value>);

impl ActionArgs {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument. Values that fail to serialize become `null`.
    pub fn with(mut self, value: impl Serialize) -> Self {
        self.0
            .push(serde_json::to_value(value).unwrap_or(Value::Null));
        self
    }

    /// Raw argument at `index`.
    pub fn raw(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Typed argument at `index`, `None` when missing or mistyped.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Option<T> {
        self.require(index).ok()
    }

    /// Typed argument at `index`, with the reason when it is unusable.
    pub fn require<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let value = self
            .0
            .get(index)
            .ok_or(BitError::MissingArgument { index })?;
        serde_json::from_value(value.clone())
            .map_err(|source| BitError::InvalidArgument { index, source })
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All arguments.
    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }
}

impl From<()> for ActionArgs {
    fn from(_: ()) -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for ActionArgs {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl From<Value> for ActionArgs {
    fn from(value: Value) -> Self {
        Self(vec![value])
    }
}

/// A batch of actions a worker publishes at initialisation.
///
/// Later entries with the same name replace earlier ones.
#[derive(Default, Clone)]
pub struct ActionSet {
    entries: BTreeMap<String, ActionHandler>,
}

impl ActionSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an action.
    pub fn action<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&ActionArgs) + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(handler));
        self
    }

    /// Add an already shared handler.
    pub fn handler(mut self, name: impl Into<String>, handler: ActionHandler) -> Self {
        self.entries.insert(name.into(), handler);
        self
    }

    /// Names in this set.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSet")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl IntoIterator for ActionSet {
    type Item = (String, ActionHandler);
    type IntoIter = std::collections::btree_map::IntoIter<String, ActionHandler>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Live handle to a store's action registry.
///
/// Clones share the same registry, so a handle taken before the worker
/// registers still sees its actions afterwards. Reading the registry is not
/// reactive: nothing re-renders when an action is added.
#[derive(Clone)]
pub struct Actions {
    handlers: Arc<RwLock<HashMap<String, ActionHandler>>>,
    middleware: Arc<dyn Middleware>,
}

impl Default for Actions {
    fn default() -> Self {
        Self::new(Arc::new(NoopMiddleware))
    }
}

impl Actions {
    pub(crate) fn new(middleware: Arc<dyn Middleware>) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            middleware,
        }
    }

    /// Insert or overwrite an action. The last registration wins.
    pub fn register<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&ActionArgs) + Send + Sync + 'static,
    {
        self.register_handler(name, Arc::new(handler));
    }

    /// Insert or overwrite an action with a shared handler.
    pub fn register_handler(&self, name: impl Into<String>, handler: ActionHandler) {
        let name = name.into();
        let replaced = self.handlers.write().insert(name.clone(), handler).is_some();
        tracing::debug!(action = %name, replaced, "Action registered");
    }

    /// Register every entry of a set.
    pub fn register_all(&self, set: ActionSet) {
        for (name, handler) in set {
            self.register_handler(name, handler);
        }
    }

    /// Call an action by name.
    ///
    /// The handler runs without any registry lock held, so it may dispatch
    /// or register other actions.
    pub fn dispatch(&self, name: &str, args: impl Into<ActionArgs>) -> Result<()> {
        let args = args.into();
        let handler = self
            .get(name)
            .ok_or_else(|| BitError::ActionNotRegistered(name.to_string()))?;
        self.middleware.on_dispatch(name, &args);
        handler(&args);
        Ok(())
    }

    /// Look up a handler.
    pub fn get(&self, name: &str) -> Option<ActionHandler> {
        self.handlers.read().get(name).cloned()
    }

    /// Whether an action is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no action is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl fmt::Debug for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actions")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_and_dispatch() {
        let actions = Actions::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        actions.register("ping", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        actions.dispatch("ping", ()).unwrap();
        actions.dispatch("ping", ()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_last_registration_wins() {
        let actions = Actions::default();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        actions.register("ping", move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        actions.dispatch("ping", ()).unwrap();

        let s = Arc::clone(&second);
        actions.register("ping", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        actions.dispatch("ping", ()).unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn test_unknown_action() {
        let actions = Actions::default();
        let err = actions.dispatch("missing", ()).unwrap_err();
        assert!(matches!(err, BitError::ActionNotRegistered(name) if name == "missing"));
    }

    #[test]
    fn test_clones_share_registry() {
        let actions = Actions::default();
        let view_handle = actions.clone();
        assert!(!view_handle.contains("late"));

        actions.register("late", |_| {});
        assert!(view_handle.contains("late"));
    }

    #[test]
    fn test_handler_may_dispatch_reentrantly() {
        let actions = Actions::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        actions.register("inner", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let handle = actions.clone();
        actions.register("outer", move |_| {
            handle.dispatch("inner", ()).unwrap();
        });

        actions.dispatch("outer", ()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_args_typed_access() {
        let args = ActionArgs::new().with("vip-7").with("cons");
        assert_eq!(args.len(), 2);
        assert_eq!(args.get::<String>(1).as_deref(), Some("cons"));
        assert!(matches!(
            args.require::<String>(5),
            Err(BitError::MissingArgument { index: 5 })
        ));
        assert!(matches!(
            args.require::<u64>(0),
            Err(BitError::InvalidArgument { index: 0, .. })
        ));
    }

    #[test]
    fn test_register_all_from_set() {
        let set = ActionSet::new().action("a", |_| {}).action("b", |_| {});
        assert_eq!(set.names().collect::<Vec<_>>(), ["a", "b"]);

        let actions = Actions::default();
        actions.register_all(set);
        assert_eq!(actions.names(), ["a", "b"]);
    }
}
