// Values service — optimistic cell edits.
// Parse, stage into the store, persist in the background, settle by
// ticket seq. The caller gets the applied value back synchronously; the
// write's fate arrives on the PendingWrite handle and, on rollback, as a
// SessionAlert.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::CellInputError;
use crate::latency;
use crate::state::Session;
use crate::types::SessionAlert;
use crate::values::{parse_cell_input, EditTicket, Staged, ValueKey};

/// How an edit settled after its background write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Gateway accepted the write; the optimistic value is confirmed.
    Persisted,
    /// Gateway rejected it; the cell rolled back to its chain baseline.
    Reverted,
    /// A newer edit took over the cell before this one settled.
    Superseded,
}

/// Handle on one edit's background settlement.
#[derive(Debug)]
pub struct PendingWrite {
    rx: oneshot::Receiver<WriteOutcome>,
}

impl PendingWrite {
    pub async fn settled(self) -> WriteOutcome {
        self.rx.await.unwrap_or(WriteOutcome::Superseded)
    }
}

/// Immediate result of an edit: what the cell now shows, plus the
/// settlement handle (`None` for no-ops, which never touch the network).
#[derive(Debug)]
pub struct CellEdit {
    pub applied: Option<f64>,
    pub pending: Option<PendingWrite>,
}

/// Parse raw input and apply it optimistically. The store mutates before
/// this returns; rejected input mutates nothing.
pub fn edit_value(
    session: &Arc<Session>,
    metric_id: &str,
    year: i32,
    month: u32,
    raw: &str,
) -> Result<CellEdit, CellInputError> {
    let new_value = parse_cell_input(raw)?;
    Ok(apply_value(session, metric_id, year, month, new_value))
}

/// Stage an already-parsed value and spawn its write.
pub fn apply_value(
    session: &Arc<Session>,
    metric_id: &str,
    year: i32,
    month: u32,
    new_value: Option<f64>,
) -> CellEdit {
    let key = ValueKey::new(metric_id, year, month);
    let staged = session.store.lock().stage(key, new_value);

    let ticket = match staged {
        Staged::Noop => {
            return CellEdit {
                applied: new_value,
                pending: None,
            }
        }
        Staged::Applied(ticket) => ticket,
    };

    let (tx, rx) = oneshot::channel();
    let session = session.clone();
    tokio::spawn(async move {
        let outcome = persist_edit(&session, &ticket).await;
        let _ = tx.send(outcome);
    });

    CellEdit {
        applied: new_value,
        pending: Some(PendingWrite { rx }),
    }
}

async fn persist_edit(session: &Arc<Session>, ticket: &EditTicket) -> WriteOutcome {
    let key = &ticket.key;
    let operation = if ticket.applied.is_some() {
        latency::Operation::ValueUpsert
    } else {
        latency::Operation::ValueDelete
    };

    let started = Instant::now();
    let result = match ticket.applied {
        Some(value) => session
            .values_gw
            .upsert_value(&key.metric_id, key.year, key.month, value)
            .await
            .map(|_| ()),
        None => session
            .values_gw
            .delete_value(&key.metric_id, key.year, key.month)
            .await,
    };
    latency::observe(operation, started.elapsed());

    match result {
        Ok(()) => {
            if session.store.lock().confirm(ticket) {
                WriteOutcome::Persisted
            } else {
                WriteOutcome::Superseded
            }
        }
        Err(e) => {
            if session.store.lock().revert(ticket) {
                latency::mark_degraded(operation);
                session.push_alert(SessionAlert::ValueSaveFailed {
                    id: Uuid::new_v4().to_string(),
                    metric_id: key.metric_id.clone(),
                    year: key.year,
                    month: key.month,
                    message: e.to_string(),
                });
                WriteOutcome::Reverted
            } else {
                log::debug!(
                    "stale write failure for {} {}-{:02} ignored: {e}",
                    key.metric_id,
                    key.year,
                    key.month
                );
                WriteOutcome::Superseded
            }
        }
    }
}
