//! Session-facing orchestration over the gateway traits.
//!
//! Each submodule owns one slice of client behavior:
//! - values: optimistic cell edits with versioned confirm/revert
//! - metrics: registry CRUD, importance, optimistic drag reorder
//! - scoreboard: pure grid and detail view derivation

pub mod metrics;
pub mod scoreboard;
pub mod values;
