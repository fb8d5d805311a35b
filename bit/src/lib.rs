//! bit: observable store, action registry and composer for Rust TUI apps
//!
//! One nested state tree per application root, addressed by dot-paths.
//! Every write notifies every listener; views bind to the paths they show
//! and redraw when those change. A logic-only worker publishes named
//! actions before any view mounts.
//!
//! # Example
//! ```ignore
//! use bit::prelude::*;
//! use serde_json::json;
//!
//! #[derive(Selectors)]
//! #[selectors(prefix = "consolidation.vip", rename_all = "camelCase")]
//! struct VipState {
//!     selected_id: Option<String>,
//!     consolidator_q: String,
//! }
//!
//! let unit = Composer::new(json!({}))
//!     .worker(|ctx: &WorkerContext| {
//!         let store = ctx.store().clone();
//!         ActionSet::new().action("handleAddNewConsolidatorFromVip", move |args| {
//!             let _ = store.put(&VipState::selected_id(), args.get::<String>(0));
//!             let _ = store.put(&VipState::consolidator_q(), args.get(1).unwrap_or_default());
//!         })
//!     })
//!     .view(VipPanel::default())
//!     .root()
//!     .compose()?;
//!
//! BitRuntime::new(unit).run(&mut terminal, |e| e.is_key(KeyCode::Char('q'))).await?;
//! ```

// Re-export everything from core
pub use bit_core::*;

// Re-export derive macros
pub use bit_macros::Selectors;

/// Prelude for convenient imports
pub mod prelude {
    // Store and actions
    pub use bit_core::{
        ActionArgs, ActionSet, Actions, ComposedMiddleware, LoggingMiddleware, Middleware,
        NoopMiddleware, StateTree, Store,
    };

    // Composition
    pub use bit_core::{
        Binding, Composer, Context, ContextBoundary, SelectorBinding, Unit, View, Worker,
        WorkerContext,
    };

    // Escape hatch
    pub use bit_core::{register_global, retrieve_global, root_props, GlobalKey, STORE_KEY};

    // Requests
    pub use bit_core::{QueryClient, QueryConfig, QueryKey, QueryState, QueryStatus};

    // Runtime and events
    pub use bit_core::{BitRuntime, EventKind, PollerConfig};

    // Errors
    pub use bit_core::{BitError, Result};

    // Selectors
    pub use bit_core::Selector;
    pub use bit_macros::Selectors;

    // Debug
    pub use bit_core::debug::{MutationLogConfig, MutationLogMiddleware};

    // Ratatui re-exports
    pub use bit_core::{Color, Frame, Line, Modifier, Rect, Span, Style, Text};
}
