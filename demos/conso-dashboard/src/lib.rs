//! Consolidation dashboard built on bit
//!
//! A worker loads VIPs from the edge function and publishes
//! `handleAddNewConsolidatorFromVip`; the dashboard view binds to the store
//! and calls it. Modules are public so render tests can drive the view.

pub mod api;
pub mod state;
pub mod view;
pub mod worker;
