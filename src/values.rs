//! In-memory value cache with versioned optimistic edits.
//!
//! The store is the session's single source of display truth:
//! `metric_id -> year -> month -> value`. An edit lands in the cache
//! synchronously and persistence settles later; per-cell sequence numbers
//! decide whose settlement still matters.
//!
//! Edit lifecycle:
//! - `stage` applies the new value (or removes the cell) and returns a
//!   ticket. Re-staging the same cell before the first write settles
//!   supersedes it: the seq bumps, the baseline stays.
//! - `confirm` with the latest ticket forgets the baseline; the optimistic
//!   value is confirmed truth.
//! - `revert` with the latest ticket restores the baseline exactly,
//!   including absence. Stale tickets (superseded seq) are ignored on both
//!   paths, so the latest edit always wins.
//!
//! Absent and zero are distinct states everywhere: a cleared cell removes
//! its leaf and prunes empty year/metric branches, it does not write 0.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::CellInputError;

/// Nested cache shape, also the shape snapshots load in.
pub type ValueTree = HashMap<String, BTreeMap<i32, BTreeMap<u32, f64>>>;

/// Cache coordinates of a single cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueKey {
    pub metric_id: String,
    pub year: i32,
    pub month: u32,
}

impl ValueKey {
    pub fn new(metric_id: impl Into<String>, year: i32, month: u32) -> Self {
        Self {
            metric_id: metric_id.into(),
            year,
            month,
        }
    }
}

/// Identifies one staged edit of one cell.
#[derive(Debug, Clone)]
pub struct EditTicket {
    pub key: ValueKey,
    pub seq: u64,
    /// What the edit placed in the cache (`None` = cleared the cell).
    pub applied: Option<f64>,
}

/// Outcome of staging input against the cache.
#[derive(Debug, Clone)]
pub enum Staged {
    /// Input equals the cached state. Nothing changed, nothing to persist.
    Noop,
    /// Cache updated; persist in the background and settle with the ticket.
    Applied(EditTicket),
}

#[derive(Debug, Clone, Copy)]
struct PendingEdit {
    seq: u64,
    /// Last confirmed value before this edit chain began.
    baseline: Option<f64>,
}

#[derive(Debug, Default)]
pub struct ValueStore {
    values: ValueTree,
    pending: HashMap<ValueKey, PendingEdit>,
    next_seq: u64,
}

/// Interpret raw cell input. Empty (after trim) means "clear the cell";
/// anything else must parse to a finite number. Errors leave no trace in
/// the store.
pub fn parse_cell_input(raw: &str) -> Result<Option<f64>, CellInputError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let parsed: f64 = trimmed
        .parse()
        .map_err(|_| CellInputError::NotNumeric(trimmed.to_string()))?;
    if !parsed.is_finite() {
        return Err(CellInputError::NotFinite(trimmed.to_string()));
    }
    Ok(Some(parsed))
}

fn bits_equal(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x.to_bits() == y.to_bits(),
        _ => false,
    }
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace the whole cache from server rows. Drops any pending
    /// edit state; callers resync after, not during, in-flight writes.
    pub fn load_rows(&mut self, rows: &[crate::types::MetricValueRow]) {
        let mut tree: ValueTree = HashMap::new();
        for row in rows {
            tree.entry(row.metric_id.clone())
                .or_default()
                .entry(row.year)
                .or_default()
                .insert(row.month, row.value);
        }
        self.values = tree;
        self.pending.clear();
    }

    pub fn get(&self, metric_id: &str, year: i32, month: u32) -> Option<f64> {
        self.values
            .get(metric_id)
            .and_then(|years| years.get(&year))
            .and_then(|months| months.get(&month))
            .copied()
    }

    fn current(&self, key: &ValueKey) -> Option<f64> {
        self.get(&key.metric_id, key.year, key.month)
    }

    /// Apply an edit to the cache and open (or supersede) its pending
    /// record. `Noop` when the input is bit-identical to the cached state.
    pub fn stage(&mut self, key: ValueKey, new: Option<f64>) -> Staged {
        let current = self.current(&key);
        if bits_equal(current, new) {
            return Staged::Noop;
        }

        match new {
            Some(v) => {
                self.values
                    .entry(key.metric_id.clone())
                    .or_default()
                    .entry(key.year)
                    .or_default()
                    .insert(key.month, v);
            }
            None => self.remove_leaf(&key),
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        let pending = self.pending.entry(key.clone()).or_insert(PendingEdit {
            seq,
            baseline: current,
        });
        pending.seq = seq;

        Staged::Applied(EditTicket {
            key,
            seq,
            applied: new,
        })
    }

    /// Settle a successful write. True when the ticket was still current;
    /// a superseded ticket changes nothing.
    pub fn confirm(&mut self, ticket: &EditTicket) -> bool {
        match self.pending.get(&ticket.key) {
            Some(p) if p.seq == ticket.seq => {
                self.pending.remove(&ticket.key);
                true
            }
            _ => false,
        }
    }

    /// Settle a failed write by restoring the chain baseline. True when
    /// the rollback applied; a superseded ticket changes nothing (a newer
    /// edit owns the cell now).
    pub fn revert(&mut self, ticket: &EditTicket) -> bool {
        let baseline = match self.pending.get(&ticket.key) {
            Some(p) if p.seq == ticket.seq => p.baseline,
            _ => return false,
        };

        match baseline {
            Some(v) => {
                self.values
                    .entry(ticket.key.metric_id.clone())
                    .or_default()
                    .entry(ticket.key.year)
                    .or_default()
                    .insert(ticket.key.month, v);
            }
            None => self.remove_leaf(&ticket.key),
        }
        self.pending.remove(&ticket.key);
        true
    }

    fn remove_leaf(&mut self, key: &ValueKey) {
        if let Some(years) = self.values.get_mut(&key.metric_id) {
            if let Some(months) = years.get_mut(&key.year) {
                months.remove(&key.month);
                if months.is_empty() {
                    years.remove(&key.year);
                }
            }
            if years.is_empty() {
                self.values.remove(&key.metric_id);
            }
        }
    }

    /// Projection for one grid: month values per metric, restricted to
    /// `metric_ids` and `year`. Metrics with no entries that year are
    /// absent from the result, not mapped to an empty map.
    pub fn filtered(
        &self,
        metric_ids: &HashSet<String>,
        year: i32,
    ) -> HashMap<String, BTreeMap<u32, f64>> {
        self.values
            .iter()
            .filter(|(id, _)| metric_ids.contains(id.as_str()))
            .filter_map(|(id, years)| years.get(&year).map(|months| (id.clone(), months.clone())))
            .collect()
    }

    /// Year-to-date sum. `None` when the year has no entries at all;
    /// months that exist contribute their value, absent months contribute
    /// nothing. A year that sums to zero is `Some(0.0)`, not "no data".
    pub fn ytd(&self, metric_id: &str, year: i32) -> Option<f64> {
        let months = self.values.get(metric_id)?.get(&year)?;
        Some(months.values().sum())
    }

    /// All cached years for one metric, for the detail view.
    pub fn metric_years(&self, metric_id: &str) -> Option<&BTreeMap<i32, BTreeMap<u32, f64>>> {
        self.values.get(metric_id)
    }

    /// Cascade removal after a metric delete.
    pub fn remove_metric(&mut self, metric_id: &str) {
        self.values.remove(metric_id);
        self.pending.retain(|key, _| key.metric_id != metric_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: &ValueKey) -> bool {
        self.pending.contains_key(key)
    }
}
