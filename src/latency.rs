//! Per-operation latency rollups for the diag view.
//!
//! Every timed network path in this client is one of a fixed set of
//! operations, each with its own interactive budget. An operation keeps a
//! small ring of recent samples plus counters for budget overruns and
//! degraded completions (reverted saves, fallback insights, empty-state
//! loads). Everything lives in memory; `diag` reads a point-in-time
//! report. Exceeding a budget counts an overrun, it never blocks a call.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

const RING_CAPACITY: usize = 128;

/// The network operations the client times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ValueUpsert,
    ValueDelete,
    SnapshotLoad,
    MetricsReorder,
    InsightGenerate,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::ValueUpsert => "value_upsert",
            Operation::ValueDelete => "value_delete",
            Operation::SnapshotLoad => "snapshot_load",
            Operation::MetricsReorder => "metrics_reorder",
            Operation::InsightGenerate => "insight_generate",
        }
    }

    /// Budget in milliseconds. Cell writes confirm an already-applied
    /// optimistic edit, so they carry the tightest target; insight calls
    /// a completion model and carries the loosest.
    pub fn budget_ms(self) -> u64 {
        match self {
            Operation::ValueUpsert | Operation::ValueDelete => 1_000,
            Operation::MetricsReorder => 2_000,
            Operation::SnapshotLoad => 2_500,
            Operation::InsightGenerate => 6_000,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationReport {
    pub operation: &'static str,
    pub samples: usize,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
    pub budget_ms: u64,
    pub over_budget: u64,
    pub degraded: u64,
    pub last_at: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyReport {
    pub generated_at: String,
    pub operations: Vec<OperationReport>,
}

/// Bounded sample history for one operation. Once full, new samples
/// overwrite the oldest.
#[derive(Debug, Default)]
struct Ring {
    samples_ms: Vec<u64>,
    cursor: usize,
    over_budget: u64,
    degraded: u64,
    last_at: Option<DateTime<Utc>>,
}

impl Ring {
    fn push(&mut self, elapsed_ms: u64) {
        if self.samples_ms.len() < RING_CAPACITY {
            self.samples_ms.push(elapsed_ms);
        } else {
            self.samples_ms[self.cursor] = elapsed_ms;
        }
        self.cursor = (self.cursor + 1) % RING_CAPACITY;
        self.last_at = Some(Utc::now());
    }

    fn report(&self, op: Operation) -> OperationReport {
        let mut sorted = self.samples_ms.clone();
        sorted.sort_unstable();
        OperationReport {
            operation: op.name(),
            samples: sorted.len(),
            p50_ms: rank(&sorted, 50),
            p95_ms: rank(&sorted, 95),
            max_ms: sorted.last().copied().unwrap_or(0),
            budget_ms: op.budget_ms(),
            over_budget: self.over_budget,
            degraded: self.degraded,
            last_at: self.last_at.map(|at| at.to_rfc3339()),
        }
    }
}

/// Floor-rank percentile over an ascending sample list; 0 when empty.
/// The max is reported separately, so the tail bias of flooring is fine.
fn rank(sorted: &[u64], percentile: usize) -> u64 {
    match sorted.len() {
        0 => 0,
        n => sorted[(n - 1) * percentile / 100],
    }
}

#[derive(Default)]
struct LatencyLog {
    rings: Mutex<HashMap<Operation, Ring>>,
}

impl LatencyLog {
    fn global() -> &'static Self {
        static LOG: OnceLock<LatencyLog> = OnceLock::new();
        LOG.get_or_init(Self::default)
    }

    fn observe(&self, op: Operation, elapsed: Duration) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let mut rings = self.rings.lock();
        let ring = rings.entry(op).or_default();
        if elapsed_ms > op.budget_ms() {
            ring.over_budget += 1;
        }
        ring.push(elapsed_ms);
    }

    fn mark_degraded(&self, op: Operation) {
        self.rings.lock().entry(op).or_default().degraded += 1;
    }

    fn report(&self) -> LatencyReport {
        let rings = self.rings.lock();
        let mut operations: Vec<OperationReport> =
            rings.iter().map(|(op, ring)| ring.report(*op)).collect();
        operations.sort_by(|a, b| b.p95_ms.cmp(&a.p95_ms).then(a.operation.cmp(b.operation)));

        LatencyReport {
            generated_at: Utc::now().to_rfc3339(),
            operations,
        }
    }
}

pub fn observe(op: Operation, elapsed: Duration) {
    LatencyLog::global().observe(op, elapsed);
}

pub fn mark_degraded(op: Operation) {
    LatencyLog::global().mark_degraded(op);
}

pub fn report() -> LatencyReport {
    LatencyLog::global().report()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(report: &LatencyReport, op: Operation) -> OperationReport {
        report
            .operations
            .iter()
            .find(|r| r.operation == op.name())
            .cloned()
            .expect("operation in report")
    }

    #[test]
    fn test_rank_floors_between_samples() {
        assert_eq!(rank(&[], 95), 0);
        assert_eq!(rank(&[10, 20, 30], 50), 20);
        assert_eq!(rank(&[10, 20, 30], 100), 30);
        assert_eq!(rank(&[10, 20, 30, 40], 95), 30);
    }

    #[test]
    fn test_ring_overwrites_oldest_samples() {
        let log = LatencyLog::default();
        for ms in 1..=(RING_CAPACITY as u64 + 50) {
            log.observe(Operation::ValueUpsert, Duration::from_millis(ms));
        }

        let upsert = find(&log.report(), Operation::ValueUpsert);
        assert_eq!(upsert.samples, RING_CAPACITY);
        assert_eq!(upsert.max_ms, RING_CAPACITY as u64 + 50);
        // Window holds 51..=178, so the median sits in the newer half.
        assert_eq!(upsert.p50_ms, 114);
    }

    #[test]
    fn test_overrun_counts_against_the_operation_budget() {
        let log = LatencyLog::default();
        let budget = Operation::ValueUpsert.budget_ms();
        log.observe(Operation::ValueUpsert, Duration::from_millis(budget));
        log.observe(Operation::ValueUpsert, Duration::from_millis(budget + 1));

        let upsert = find(&log.report(), Operation::ValueUpsert);
        assert_eq!(upsert.samples, 2);
        assert_eq!(upsert.over_budget, 1);
        assert_eq!(upsert.budget_ms, budget);
    }

    #[test]
    fn test_degraded_counts_without_any_samples() {
        let log = LatencyLog::default();
        log.mark_degraded(Operation::InsightGenerate);
        log.mark_degraded(Operation::InsightGenerate);

        let insight = find(&log.report(), Operation::InsightGenerate);
        assert_eq!(insight.samples, 0);
        assert_eq!(insight.degraded, 2);
        assert_eq!(insight.p95_ms, 0);
    }

    #[test]
    fn test_report_orders_slowest_first() {
        let log = LatencyLog::default();
        log.observe(Operation::ValueUpsert, Duration::from_millis(10));
        log.observe(Operation::SnapshotLoad, Duration::from_millis(500));

        let report = log.report();
        assert_eq!(report.operations[0].operation, "snapshot_load");
        assert_eq!(report.operations[1].operation, "value_upsert");
    }
}
