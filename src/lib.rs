//! Client core for multi-brand marketing scoreboards.
//!
//! Brands own metrics; metrics hold one value per calendar month. The
//! grid edits cells optimistically with versioned confirm/revert against
//! a Supabase backend, reorders metrics by drag position, and asks
//! OpenAI for short insights with hard fallback guarantees.

pub mod error;
pub mod insight;
pub mod latency;
pub mod queries;
pub mod services;
pub mod state;
pub mod supabase;
pub mod types;
pub mod util;
pub mod values;

#[cfg(test)]
mod testsupport;
