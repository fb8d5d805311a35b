//! Wires one store, one worker and one view into a mountable [`Unit`]
//!
//! Composition runs in a fixed order:
//!
//! 1. the store is built from the initial state ([`ComposeStage::StoreConstructed`]);
//! 2. the worker, if any, runs [`Worker::initialize`] and its [`ActionSet`]
//!    is registered ([`ComposeStage::WorkerRegistered`]);
//! 3. the [`Context`] is published, the root store is exposed through the
//!    escape hatch when [`Composer::root`] was asked for, and `on_ready`
//!    runs ([`ComposeStage::Ready`]);
//! 4. the view, if any, is mounted.
//!
//! Views therefore always see the worker's actions.
//!
//! # Example
//!
//! ```ignore
//! let unit = Composer::new(json!({ "consolidation": { "vip": {} } }))
//!     .worker(|ctx: &WorkerContext| {
//!         let store = ctx.store().clone();
//!         ActionSet::new().action("selectVip", move |args| {
//!             store.set("consolidation.vip.selectedId", args.raw(0).cloned().unwrap_or_default());
//!         })
//!     })
//!     .view(VipList::default())
//!     .root()
//!     .compose()?;
//! ```

use std::fmt;
use std::sync::Arc;

use ratatui::layout::Rect;
use ratatui::Frame;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::action::{ActionArgs, ActionSet, Actions};
use crate::bridge::{Binding, Bridge, RenderSignal, SelectorBinding};
use crate::error::Result;
use crate::event::EventKind;
use crate::global::{register_global, STORE_KEY};
use crate::path::StatePath;
use crate::query::{Completion, QueryClient, QueryCompletions, QueryConfig, QueryState};
use crate::selector::Selector;
use crate::store::{Middleware, NoopMiddleware, Store};
use crate::StateTree;

/// Where a unit is in its composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComposeStage {
    Uninitialized,
    StoreConstructed,
    WorkerRegistered,
    /// Context published. Terminal for the unit's lifetime.
    Ready,
}

impl fmt::Display for ComposeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComposeStage::Uninitialized => "uninitialized",
            ComposeStage::StoreConstructed => "store-constructed",
            ComposeStage::WorkerRegistered => "worker-registered",
            ComposeStage::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Logic-only part of a unit.
///
/// Runs once, before any view is mounted, and returns the actions it
/// publishes. It may also read and write the store and register queries.
pub trait Worker: Send + 'static {
    fn initialize(&mut self, ctx: &WorkerContext) -> ActionSet;
}

impl<F> Worker for F
where
    F: FnMut(&WorkerContext) -> ActionSet + Send + 'static,
{
    fn initialize(&mut self, ctx: &WorkerContext) -> ActionSet {
        self(ctx)
    }
}

/// What a worker can reach while initializing.
#[derive(Debug)]
pub struct WorkerContext {
    store: Store,
    queries: QueryClient,
}

impl WorkerContext {
    /// Read a path.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.store.get(path)
    }

    /// Write a path.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Value {
        self.store.set(path, value)
    }

    /// The unit's store. Clone it into action handlers that write state.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Register actions right away instead of returning them.
    pub fn use_actions(&self, actions: ActionSet) {
        self.store.actions().register_all(actions);
    }

    /// The unit's request cache.
    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    /// Shorthand for [`QueryClient::register_query`].
    pub fn register_query<F, Fut, T, E>(
        &self,
        path: impl Into<StatePath>,
        key: impl Into<crate::query::QueryKey>,
        fetcher: F,
    ) -> Result<QueryState>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Serialize,
        E: fmt::Display,
    {
        self.queries.register_query(path, key, fetcher)
    }
}

/// Presentational part of a unit.
pub trait View: 'static {
    /// Called once, after the context is published. Create bindings here.
    fn mount(&mut self, ctx: &Context) {
        let _ = ctx;
    }

    fn render(&mut self, frame: &mut Frame, area: Rect, ctx: &Context);

    /// Returns `true` when the event was used and the view should redraw.
    fn handle_event(&mut self, event: &EventKind, ctx: &Context) -> bool {
        let _ = (event, ctx);
        false
    }
}

impl<F> View for F
where
    F: FnMut(&mut Frame, Rect, &Context) + 'static,
{
    fn render(&mut self, frame: &mut Frame, area: Rect, ctx: &Context) {
        self(frame, area, ctx)
    }
}

/// Marks an outer boundary a unit is composed into.
///
/// Composing with a boundary puts the raw [`Store`] into the published
/// [`Context`]; without one, descendants only get bindings and actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBoundary {
    name: String,
}

impl ContextBoundary {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Value published to a unit's view.
#[derive(Clone, Debug)]
pub struct Context {
    bridge: Bridge,
    actions: Actions,
    queries: QueryClient,
    store: Option<Store>,
    boundary: Option<ContextBoundary>,
}

impl Context {
    /// Bind to a path.
    pub fn use_props(&self, path: impl Into<StatePath>) -> Binding {
        self.bridge.use_props(path)
    }

    /// Bind to a typed selector.
    pub fn use_selector<T: DeserializeOwned>(&self, selector: &Selector<T>) -> SelectorBinding<T> {
        self.bridge.use_selector(selector)
    }

    /// Read a path once, without subscribing.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.bridge.store().get(path)
    }

    /// Live action registry.
    pub fn use_actions(&self) -> &Actions {
        &self.actions
    }

    /// Call an action by name.
    pub fn dispatch(&self, name: &str, args: impl Into<ActionArgs>) -> Result<()> {
        self.actions.dispatch(name, args)
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    /// The raw store, present only when composed into a [`ContextBoundary`].
    pub fn store(&self) -> Option<&Store> {
        self.store.as_ref()
    }

    pub fn boundary(&self) -> Option<&ContextBoundary> {
        self.boundary.as_ref()
    }
}

/// Full composed surface handed to `on_ready`.
pub struct Ready<'a> {
    store: &'a Store,
    context: &'a Context,
    queries: &'a QueryClient,
}

impl Ready<'_> {
    pub fn store(&self) -> &Store {
        self.store
    }

    pub fn context(&self) -> &Context {
        self.context
    }

    pub fn queries(&self) -> &QueryClient {
        self.queries
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.store.get(path)
    }

    pub fn set(&self, path: &str, value: impl Into<Value>) -> Value {
        self.store.set(path, value)
    }

    pub fn use_props(&self, path: impl Into<StatePath>) -> Binding {
        self.context.use_props(path)
    }
}

type OnReady = Box<dyn FnOnce(&Ready<'_>) -> Result<()>>;

/// Builder for a [`Unit`].
pub struct Composer {
    initial: StateTree,
    worker: Option<Box<dyn Worker>>,
    view: Option<Box<dyn View>>,
    boundary: Option<ContextBoundary>,
    middleware: Arc<dyn Middleware>,
    query_config: QueryConfig,
    on_ready: Option<OnReady>,
    root: bool,
}

impl Composer {
    /// Start composing a unit seeded with `initial`.
    pub fn new(initial: impl Into<StateTree>) -> Self {
        Self {
            initial: initial.into(),
            worker: None,
            view: None,
            boundary: None,
            middleware: Arc::new(NoopMiddleware),
            query_config: QueryConfig::default(),
            on_ready: None,
            root: false,
        }
    }

    pub fn worker(mut self, worker: impl Worker) -> Self {
        self.worker = Some(Box::new(worker));
        self
    }

    pub fn view(mut self, view: impl View) -> Self {
        self.view = Some(Box::new(view));
        self
    }

    /// Compose into an outer boundary, publishing the raw store.
    pub fn context(mut self, boundary: ContextBoundary) -> Self {
        self.boundary = Some(boundary);
        self
    }

    /// Middleware for the unit's store and actions.
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware = Arc::new(middleware);
        self
    }

    pub fn query_config(mut self, config: QueryConfig) -> Self {
        self.query_config = config;
        self
    }

    /// Called once when the unit reaches [`ComposeStage::Ready`], before
    /// the view mounts. An error aborts composition.
    pub fn on_ready<F>(mut self, on_ready: F) -> Self
    where
        F: FnOnce(&Ready<'_>) -> Result<()> + 'static,
    {
        self.on_ready = Some(Box::new(on_ready));
        self
    }

    /// Make this unit the application root, exposing its store through
    /// [`STORE_KEY`]. Only one root can be composed per process.
    pub fn root(mut self) -> Self {
        self.root = true;
        self
    }

    /// Build the unit.
    pub fn compose(self) -> Result<Unit> {
        let Composer {
            initial,
            worker,
            view,
            boundary,
            middleware,
            query_config,
            on_ready,
            root,
        } = self;

        let mut stage = ComposeStage::Uninitialized;
        tracing::debug!(%stage, "Composing unit");

        let store = Store::with_shared_middleware(initial, middleware);
        let (queries, completions) = QueryClient::new(store.clone(), query_config);
        let render = RenderSignal::new();
        stage = advance(stage, ComposeStage::StoreConstructed);

        if let Some(mut worker) = worker {
            let ctx = WorkerContext {
                store: store.clone(),
                queries: queries.clone(),
            };
            let actions = worker.initialize(&ctx);
            tracing::debug!(actions = actions.len(), "Worker initialized");
            store.actions().register_all(actions);
        }
        stage = advance(stage, ComposeStage::WorkerRegistered);

        let context = Context {
            bridge: Bridge::new(store.clone(), render.clone()),
            actions: store.actions().clone(),
            queries: queries.clone(),
            store: boundary.as_ref().map(|_| store.clone()),
            boundary,
        };
        stage = advance(stage, ComposeStage::Ready);

        if root {
            register_global(&STORE_KEY, store.clone())?;
        }
        if let Some(on_ready) = on_ready {
            on_ready(&Ready {
                store: &store,
                context: &context,
                queries: &queries,
            })?;
        }

        let mut unit = Unit {
            store,
            context,
            stage,
            view,
            queries,
            completions,
            render,
        };
        if let Some(view) = unit.view.as_mut() {
            view.mount(&unit.context);
        }
        unit.render.request();
        Ok(unit)
    }
}

impl fmt::Debug for Composer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composer")
            .field("has_worker", &self.worker.is_some())
            .field("has_view", &self.view.is_some())
            .field("boundary", &self.boundary)
            .field("root", &self.root)
            .finish()
    }
}

fn advance(from: ComposeStage, to: ComposeStage) -> ComposeStage {
    tracing::debug!(%from, %to, "Compose stage");
    to
}

/// A composed, mounted unit.
pub struct Unit {
    store: Store,
    context: Context,
    stage: ComposeStage,
    view: Option<Box<dyn View>>,
    queries: QueryClient,
    completions: QueryCompletions,
    render: RenderSignal,
}

impl Unit {
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn stage(&self) -> ComposeStage {
        self.stage
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    /// Draw the view into `area`. Units without a view draw nothing.
    pub fn render(&mut self, frame: &mut Frame, area: Rect) {
        if let Some(view) = self.view.as_mut() {
            view.render(frame, area, &self.context);
        }
    }

    /// Route an event to the view. Returns whether it was used.
    pub fn handle_event(&mut self, event: &EventKind) -> bool {
        let used = match self.view.as_mut() {
            Some(view) => view.handle_event(event, &self.context),
            None => false,
        };
        if used {
            self.render.request();
        }
        used
    }

    /// Ask for a redraw.
    pub fn request_render(&self) {
        self.render.request();
    }

    /// Consume the pending redraw request.
    pub fn take_render_request(&self) -> bool {
        self.render.take()
    }

    /// Write every query result that has already arrived.
    pub fn apply_query_results(&mut self) -> usize {
        let mut applied = 0;
        while let Some(completion) = self.completions.try_recv() {
            self.queries.apply(completion);
            applied += 1;
        }
        applied
    }

    /// Wait for the next query result.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.completions.recv().await
    }

    /// Write one query result.
    pub fn apply_completion(&self, completion: Completion) {
        self.queries.apply(completion);
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("stage", &self.stage)
            .field("has_view", &self.view.is_some())
            .field("store", &self.store)
            .finish()
    }
}
