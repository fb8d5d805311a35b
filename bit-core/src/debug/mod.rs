//! Debug and inspection utilities
//!
//! - **Mutation log**: [`MutationLogMiddleware`] records writes and action
//!   dispatches that pass an include/exclude glob filter, into `tracing`
//!   and a ring buffer
//! - **State inspection**: [`state_sections`] flattens the state tree into
//!   titled key/value sections, [`section_lines`] renders them
//!
//! ```ignore
//! use bit::debug::{section_lines, state_sections, MutationLogConfig, MutationLogMiddleware};
//!
//! let log = MutationLogMiddleware::new(MutationLogConfig::new(None, Some("*.isFetching")));
//! let unit = Composer::new(initial).middleware(log.clone()).compose()?;
//!
//! // in a debug view:
//! let lines = section_lines(&state_sections(&unit.store().state()));
//! frame.render_widget(Paragraph::new(lines), area);
//! ```

pub mod mutation_log;
pub mod state;

pub use mutation_log::{
    glob_match, MutationEntry, MutationKind, MutationLogConfig, MutationLogMiddleware,
};
pub use state::{section_lines, state_sections, DebugEntry, DebugSection};
