//! Session loading and one-off lookups against the backend.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::error::SessionError;
use crate::latency;
use crate::services::scoreboard::{self, MetricDetail};
use crate::state::Session;
use crate::supabase::SupabaseError;
use crate::types::{Brand, SessionAlert};
use crate::util;
use crate::values::ValueStore;

/// Fetch brands, each brand's metrics, and the value snapshot for the
/// configured year window, then swap them into the session atomically
/// (nothing is committed until every fetch succeeded).
///
/// A failed load leaves an empty session and a `LoadFailed` alert rather
/// than an error: the client renders an empty state, never a crash.
pub async fn load_session(session: &Arc<Session>) {
    let started = Instant::now();
    let result = fetch_and_commit(session).await;
    latency::observe(latency::Operation::SnapshotLoad, started.elapsed());

    if let Err(e) = result {
        log::error!("session load failed: {e}");
        latency::mark_degraded(latency::Operation::SnapshotLoad);
        session.set_brands(Vec::new());
        session.metrics.clear();
        *session.store.lock() = ValueStore::default();
        session.push_alert(SessionAlert::LoadFailed {
            id: Uuid::new_v4().to_string(),
            message: e.to_string(),
        });
    }
}

async fn fetch_and_commit(session: &Arc<Session>) -> Result<(), SupabaseError> {
    let brands = session.directory.list_brands().await?;

    let mut metrics_by_brand = Vec::with_capacity(brands.len());
    for brand in &brands {
        let metrics = session.registry.list_metrics(&brand.id).await?;
        metrics_by_brand.push((brand.id.clone(), metrics));
    }

    let years = util::available_years(session.config.start_year, session.config.years_ahead);
    let rows = match (years.first(), years.last()) {
        (Some(&first), Some(&last)) => session.values_gw.value_snapshot(first, last).await?,
        _ => Vec::new(),
    };

    session.set_brands(brands);
    session.metrics.clear();
    for (brand_id, metrics) in metrics_by_brand {
        session.set_brand_metrics(&brand_id, metrics);
    }
    session.store.lock().load_rows(&rows);
    Ok(())
}

/// Load one metric with its full value history, beyond the session's
/// bounded snapshot window.
pub async fn load_metric_detail(
    session: &Arc<Session>,
    metric_id: &str,
) -> Result<MetricDetail, SessionError> {
    let metric = session.registry.metric_by_id(metric_id).await?;
    let rows = session.values_gw.values_for_metric(metric_id).await?;
    Ok(scoreboard::metric_detail(metric, &rows))
}

pub async fn create_brand(session: &Arc<Session>, name: &str) -> Result<Brand, SessionError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SessionError::InvalidRequest(
            "brand name must not be empty".to_string(),
        ));
    }

    let created = session.directory.create_brand(name).await?;
    session.brands.lock().insert(0, created.clone());
    Ok(created)
}
