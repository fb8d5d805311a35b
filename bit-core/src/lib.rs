//! Core types for bit
//!
//! bit is a small observable store for terminal applications: one nested
//! state tree addressed by dot-paths, a registry of named actions, and a
//! composer that wires a logic-only worker and a presentational view to the
//! same store.
//!
//! # Core Concepts
//!
//! - **Store**: state tree plus listeners; every write notifies every listener
//! - **Actions**: named fire-and-forget callbacks published by a worker
//! - **Bridge**: bindings that follow one path and request redraws on change
//! - **Composer**: builds a [`Unit`] from initial state, worker and view
//! - **Escape hatch**: [`global`] slots for code outside the view tree
//! - **Queries**: keyed request cache writing its state into the store
//!
//! # Basic Example
//!
//! ```
//! use bit_core::prelude::*;
//! use serde_json::json;
//!
//! let unit = Composer::new(json!({ "a": { "b": 1 } }))
//!     .worker(|ctx: &WorkerContext| {
//!         let store = ctx.store().clone();
//!         ActionSet::new().action("bump", move |_| {
//!             let next = store.get_as::<i64>("a.b").unwrap_or_default() + 1;
//!             store.set("a.b", next);
//!         })
//!     })
//!     .compose()
//!     .unwrap();
//!
//! let b = unit.context().use_props("a.b");
//! unit.context().dispatch("bump", ()).unwrap();
//! assert_eq!(b.get(), Some(json!(2)));
//! ```
//!
//! # Single writer
//!
//! `Store` handles are `Send + Sync`, but writes are only ordered when they
//! come from one task. [`BitRuntime`] is that task: async work goes through
//! the [`QueryClient`], whose results are written back by the runtime.

pub mod action;
pub mod bridge;
pub mod compose;
pub mod debug;
pub mod error;
pub mod event;
pub mod global;
pub mod path;
pub mod query;
pub mod runtime;
pub mod selector;
pub mod store;
pub mod testing;

/// The state held by a [`Store`]: a nested JSON-like tree.
pub type StateTree = serde_json::Value;

pub use action::{ActionArgs, ActionHandler, ActionSet, Actions};
pub use bridge::{Binding, Bridge, RenderSignal, SelectorBinding};
pub use compose::{
    ComposeStage, Composer, Context, ContextBoundary, Ready, Unit, View, Worker, WorkerContext,
};
pub use error::{BitError, Result};
pub use event::{process_raw_event, spawn_event_poller, EventKind, RawEvent};
pub use global::{
    register_global, retrieve_global, root_actions, root_props, root_store, GlobalKey, STORE_KEY,
};
pub use path::StatePath;
pub use query::{
    Completion, QueryClient, QueryCompletions, QueryConfig, QueryKey, QueryState, QueryStatus,
};
pub use runtime::{BitRuntime, PollerConfig};
pub use selector::Selector;
pub use store::{
    ComposedMiddleware, Listener, ListenerId, LoggingMiddleware, Middleware, NoopMiddleware,
    Store, Subscription,
};

// Re-export ratatui types for convenience
pub use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    Frame,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::action::{ActionArgs, ActionSet, Actions};
    pub use crate::bridge::{Binding, SelectorBinding};
    pub use crate::compose::{Composer, Context, ContextBoundary, Unit, View, Worker, WorkerContext};
    pub use crate::error::{BitError, Result};
    pub use crate::event::EventKind;
    pub use crate::global::{register_global, retrieve_global, GlobalKey, STORE_KEY};
    pub use crate::query::{QueryClient, QueryConfig, QueryKey, QueryState, QueryStatus};
    pub use crate::runtime::{BitRuntime, PollerConfig};
    pub use crate::selector::Selector;
    pub use crate::store::{LoggingMiddleware, Middleware, Store};
    pub use crate::StateTree;

    pub use ratatui::{
        layout::Rect,
        style::{Color, Modifier, Style},
        text::{Line, Span, Text},
        Frame,
    };
}
