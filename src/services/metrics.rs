// Metrics service — registry orchestration.
// Reorder is optimistic with a full resync on failure; importance and
// name edits are write-then-update (the cache changes only after the
// backend accepts).

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::error::SessionError;
use crate::latency;
use crate::services::scoreboard;
use crate::state::Session;
use crate::types::{Importance, Metric, SessionAlert};

/// Move one element of a list to a new position, returning the new list.
/// `to` past the end appends; an out-of-range `from` leaves the list as is.
pub fn move_metric<T: Clone>(list: &[T], from: usize, to: usize) -> Vec<T> {
    let mut items = list.to_vec();
    if from >= items.len() {
        return items;
    }
    let moved = items.remove(from);
    let at = to.min(items.len());
    items.insert(at, moved);
    items
}

/// Dense positions for a reordered id list: exactly 1..=N, no gaps.
pub fn dense_sort_orders(ordered_ids: &[String]) -> Vec<(String, i64)> {
    ordered_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i as i64 + 1))
        .collect()
}

/// Project a new id order onto cached metrics. Metrics named in the order
/// get dense sort_orders and come first; anything else keeps its place at
/// the tail untouched.
fn apply_order(cached: &[Metric], ordered_ids: &[String]) -> Vec<Metric> {
    let mut reordered: Vec<Metric> = Vec::with_capacity(cached.len());
    for (id, position) in dense_sort_orders(ordered_ids) {
        if let Some(m) = cached.iter().find(|m| m.id == id) {
            let mut m = m.clone();
            m.sort_order = Some(position);
            reordered.push(m);
        }
    }
    for m in cached {
        if !ordered_ids.contains(&m.id) {
            reordered.push(m.clone());
        }
    }
    reordered
}

/// Persist a new metric order for one brand. The cached list changes
/// immediately; if the backend rejects the renumber, the brand is
/// re-fetched wholesale and a `ReorderFailed` alert goes out. Returns
/// whether the new order stuck.
pub async fn reorder(session: &Arc<Session>, brand_id: &str, ordered_ids: &[String]) -> bool {
    if ordered_ids.is_empty() {
        return true;
    }

    let cached = session.metrics_for(brand_id);
    session.set_brand_metrics(brand_id, apply_order(&cached, ordered_ids));

    let started = Instant::now();
    let result = session.registry.reorder_metrics(brand_id, ordered_ids).await;
    latency::observe(latency::Operation::MetricsReorder, started.elapsed());

    match result {
        Ok(()) => true,
        Err(e) => {
            log::error!("reorder for brand {brand_id} failed, resyncing: {e}");
            latency::mark_degraded(latency::Operation::MetricsReorder);
            resync_brand(session, brand_id).await;
            session.push_alert(SessionAlert::ReorderFailed {
                id: Uuid::new_v4().to_string(),
                brand_id: brand_id.to_string(),
                message: e.to_string(),
            });
            false
        }
    }
}

/// Reorder by moving the metric at `from` to `to`, both 0-based indexes
/// into the brand's display order.
pub async fn reorder_by_move(
    session: &Arc<Session>,
    brand_id: &str,
    from: usize,
    to: usize,
) -> Result<bool, SessionError> {
    let ordered_view = scoreboard::display_sorted(&session.metrics_for(brand_id));
    if from >= ordered_view.len() {
        return Err(SessionError::InvalidRequest(format!(
            "position {} is out of range (brand has {} metrics)",
            from + 1,
            ordered_view.len()
        )));
    }
    if from == to {
        return Ok(true);
    }

    let ids: Vec<String> = ordered_view.iter().map(|m| m.id.clone()).collect();
    let ordered = move_metric(&ids, from, to);
    Ok(reorder(session, brand_id, &ordered).await)
}

// A reorder failure may have renumbered some rows before dying. The only
// safe recovery is the server's current truth.
async fn resync_brand(session: &Arc<Session>, brand_id: &str) {
    match session.registry.list_metrics(brand_id).await {
        Ok(fresh) => session.set_brand_metrics(brand_id, fresh),
        Err(e) => log::error!("resync for brand {brand_id} failed: {e}"),
    }
}

pub async fn create_metric(
    session: &Arc<Session>,
    brand_id: &str,
    name: &str,
    data_source: Option<&str>,
) -> Result<Metric, SessionError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SessionError::InvalidRequest(
            "metric name must not be empty".to_string(),
        ));
    }

    let created = session
        .registry
        .create_metric(brand_id, name, data_source)
        .await?;

    let mut cached = session.metrics_for(brand_id);
    cached.insert(0, created.clone());
    session.set_brand_metrics(brand_id, cached);
    Ok(created)
}

pub async fn update_metric(
    session: &Arc<Session>,
    metric_id: &str,
    name: &str,
    data_source: Option<&str>,
) -> Result<Metric, SessionError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SessionError::InvalidRequest(
            "metric name must not be empty".to_string(),
        ));
    }

    let updated = session
        .registry
        .update_metric(metric_id, name, data_source)
        .await?;
    update_cached_metric(session, &updated);
    Ok(updated)
}

/// Set a metric's importance, or cycle it green -> amber -> red -> green
/// when no level is given. Not optimistic: the traffic light only changes
/// once the backend confirms.
pub async fn set_importance(
    session: &Arc<Session>,
    metric_id: &str,
    level: Option<Importance>,
) -> Result<Metric, SessionError> {
    let target = match level {
        Some(level) => level,
        None => current_importance(session, metric_id).await?.cycled(),
    };

    let updated = session.registry.set_importance(metric_id, target).await?;
    update_cached_metric(session, &updated);
    Ok(updated)
}

async fn current_importance(
    session: &Arc<Session>,
    metric_id: &str,
) -> Result<Importance, SessionError> {
    if let Some(m) = session.all_metrics().into_iter().find(|m| m.id == metric_id) {
        return Ok(m.importance);
    }
    let m = session.registry.metric_by_id(metric_id).await?;
    Ok(m.importance)
}

/// Delete a metric everywhere: backend (values cascade server-side), the
/// cached registry, and the value store.
pub async fn delete_metric(session: &Arc<Session>, metric_id: &str) -> Result<(), SessionError> {
    session.registry.delete_metric(metric_id).await?;

    for mut entry in session.metrics.iter_mut() {
        entry.value_mut().retain(|m| m.id != metric_id);
    }
    session.store.lock().remove_metric(metric_id);
    Ok(())
}

fn update_cached_metric(session: &Session, updated: &Metric) {
    if let Some(mut entry) = session.metrics.get_mut(&updated.brand_id) {
        if let Some(slot) = entry.value_mut().iter_mut().find(|m| m.id == updated.id) {
            *slot = updated.clone();
        }
    }
}
