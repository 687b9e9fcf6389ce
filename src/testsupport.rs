//! Shared in-memory gateway fakes for unit tests.
//!
//! `StubBackend` answers everything with empty success. The scripted
//! fakes queue per-call behavior so orchestration tests can hold a write
//! open behind a gate or fail it on demand, without a network anywhere.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::state::Session;
use crate::supabase::{BrandDirectory, MetricRegistry, SupabaseError, ValueGateway};
use crate::types::{Brand, Config, Importance, Metric, MetricValueRow, SessionAlert};

pub fn metric(id: &str, brand_id: &str, name: &str, sort_order: Option<i64>) -> Metric {
    Metric {
        id: id.to_string(),
        brand_id: brand_id.to_string(),
        name: name.to_string(),
        data_source: None,
        importance: Importance::Green,
        sort_order,
        created_at: None,
    }
}

pub fn brand(id: &str, name: &str) -> Brand {
    Brand {
        id: id.to_string(),
        name: name.to_string(),
        created_at: None,
    }
}

pub fn value_row(metric_id: &str, year: i32, month: u32, value: f64) -> MetricValueRow {
    MetricValueRow {
        id: None,
        metric_id: metric_id.to_string(),
        year,
        month,
        value,
    }
}

pub fn scripted_session(
    values: Arc<dyn ValueGateway>,
    registry: Arc<dyn MetricRegistry>,
    directory: Arc<dyn BrandDirectory>,
) -> (Arc<Session>, mpsc::UnboundedReceiver<SessionAlert>) {
    Session::with_gateways(Config::default(), values, registry, directory)
}

// ============================================================================
// StubBackend — every call succeeds with nothing
// ============================================================================

pub struct StubBackend;

#[async_trait]
impl ValueGateway for StubBackend {
    async fn upsert_value(
        &self,
        metric_id: &str,
        year: i32,
        month: u32,
        value: f64,
    ) -> Result<MetricValueRow, SupabaseError> {
        Ok(value_row(metric_id, year, month, value))
    }

    async fn delete_value(&self, _: &str, _: i32, _: u32) -> Result<(), SupabaseError> {
        Ok(())
    }

    async fn value_snapshot(&self, _: i32, _: i32) -> Result<Vec<MetricValueRow>, SupabaseError> {
        Ok(Vec::new())
    }

    async fn values_for_metric(&self, _: &str) -> Result<Vec<MetricValueRow>, SupabaseError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl MetricRegistry for StubBackend {
    async fn list_metrics(&self, _: &str) -> Result<Vec<Metric>, SupabaseError> {
        Ok(Vec::new())
    }

    async fn metric_by_id(&self, id: &str) -> Result<Metric, SupabaseError> {
        Err(SupabaseError::NotFound(id.to_string()))
    }

    async fn create_metric(
        &self,
        brand_id: &str,
        name: &str,
        _: Option<&str>,
    ) -> Result<Metric, SupabaseError> {
        Ok(metric("stub", brand_id, name, Some(1)))
    }

    async fn update_metric(
        &self,
        id: &str,
        _: &str,
        _: Option<&str>,
    ) -> Result<Metric, SupabaseError> {
        Err(SupabaseError::NotFound(id.to_string()))
    }

    async fn delete_metric(&self, _: &str) -> Result<(), SupabaseError> {
        Ok(())
    }

    async fn set_importance(&self, id: &str, _: Importance) -> Result<Metric, SupabaseError> {
        Err(SupabaseError::NotFound(id.to_string()))
    }

    async fn reorder_metrics(&self, _: &str, _: &[String]) -> Result<(), SupabaseError> {
        Ok(())
    }
}

#[async_trait]
impl BrandDirectory for StubBackend {
    async fn list_brands(&self) -> Result<Vec<Brand>, SupabaseError> {
        Ok(Vec::new())
    }

    async fn create_brand(&self, name: &str) -> Result<Brand, SupabaseError> {
        Ok(brand("stub", name))
    }
}

// ============================================================================
// ScriptedValues — per-call behavior queue for the value gateway
// ============================================================================

pub enum ValueStep {
    Ok,
    Fail(&'static str),
    /// Succeed only once the gate is notified.
    GatedOk(Arc<Notify>),
    /// Fail only once the gate is notified.
    GatedFail(Arc<Notify>, &'static str),
}

#[derive(Default)]
pub struct ScriptedValues {
    calls: AtomicUsize,
    plan: Mutex<VecDeque<ValueStep>>,
    pub snapshot_rows: Mutex<Vec<MetricValueRow>>,
    pub fail_snapshot: AtomicBool,
}

impl ScriptedValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue behavior for the next write call. An empty queue means Ok.
    pub fn push(&self, step: ValueStep) {
        self.plan.lock().push_back(step);
    }

    pub fn write_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn run_step(&self) -> Result<(), SupabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.plan.lock().pop_front().unwrap_or(ValueStep::Ok);
        match step {
            ValueStep::Ok => Ok(()),
            ValueStep::Fail(msg) => Err(SupabaseError::Api {
                status: 500,
                message: msg.to_string(),
            }),
            ValueStep::GatedOk(gate) => {
                gate.notified().await;
                Ok(())
            }
            ValueStep::GatedFail(gate, msg) => {
                gate.notified().await;
                Err(SupabaseError::Api {
                    status: 500,
                    message: msg.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl ValueGateway for ScriptedValues {
    async fn upsert_value(
        &self,
        metric_id: &str,
        year: i32,
        month: u32,
        value: f64,
    ) -> Result<MetricValueRow, SupabaseError> {
        self.run_step().await?;
        Ok(value_row(metric_id, year, month, value))
    }

    async fn delete_value(&self, _: &str, _: i32, _: u32) -> Result<(), SupabaseError> {
        self.run_step().await
    }

    async fn value_snapshot(&self, _: i32, _: i32) -> Result<Vec<MetricValueRow>, SupabaseError> {
        if self.fail_snapshot.load(Ordering::SeqCst) {
            return Err(SupabaseError::Api {
                status: 503,
                message: "snapshot unavailable".to_string(),
            });
        }
        Ok(self.snapshot_rows.lock().clone())
    }

    async fn values_for_metric(
        &self,
        metric_id: &str,
    ) -> Result<Vec<MetricValueRow>, SupabaseError> {
        let mut rows: Vec<MetricValueRow> = self
            .snapshot_rows
            .lock()
            .iter()
            .filter(|row| row.metric_id == metric_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.year.cmp(&a.year).then(b.month.cmp(&a.month)));
        Ok(rows)
    }
}

// ============================================================================
// ScriptedRegistry — metrics table double with scriptable reorder
// ============================================================================

#[derive(Default)]
pub struct ScriptedRegistry {
    pub metrics_by_brand: Mutex<HashMap<String, Vec<Metric>>>,
    pub reorder_results: Mutex<VecDeque<Result<(), SupabaseError>>>,
    pub reorder_calls: Mutex<Vec<(String, Vec<String>)>>,
    pub importance_results: Mutex<VecDeque<Result<(), SupabaseError>>>,
    created: AtomicUsize,
}

impl ScriptedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(brand_id: &str, metrics: Vec<Metric>) -> Self {
        let registry = Self::default();
        registry
            .metrics_by_brand
            .lock()
            .insert(brand_id.to_string(), metrics);
        registry
    }

    pub fn server_metrics(&self, brand_id: &str) -> Vec<Metric> {
        self.metrics_by_brand
            .lock()
            .get(brand_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MetricRegistry for ScriptedRegistry {
    async fn list_metrics(&self, brand_id: &str) -> Result<Vec<Metric>, SupabaseError> {
        Ok(self.server_metrics(brand_id))
    }

    async fn metric_by_id(&self, id: &str) -> Result<Metric, SupabaseError> {
        self.metrics_by_brand
            .lock()
            .values()
            .flatten()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| SupabaseError::NotFound(id.to_string()))
    }

    async fn create_metric(
        &self,
        brand_id: &str,
        name: &str,
        data_source: Option<&str>,
    ) -> Result<Metric, SupabaseError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let mut map = self.metrics_by_brand.lock();
        let list = map.entry(brand_id.to_string()).or_default();
        let next_order = list
            .iter()
            .filter_map(|m| m.sort_order)
            .max()
            .unwrap_or(0)
            + 1;

        let mut created = metric(&format!("srv-m{n}"), brand_id, name.trim(), Some(next_order));
        created.data_source = data_source
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        list.insert(0, created.clone());
        Ok(created)
    }

    async fn update_metric(
        &self,
        id: &str,
        name: &str,
        data_source: Option<&str>,
    ) -> Result<Metric, SupabaseError> {
        let mut map = self.metrics_by_brand.lock();
        for list in map.values_mut() {
            if let Some(m) = list.iter_mut().find(|m| m.id == id) {
                m.name = name.trim().to_string();
                m.data_source = data_source
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from);
                return Ok(m.clone());
            }
        }
        Err(SupabaseError::NotFound(id.to_string()))
    }

    async fn delete_metric(&self, id: &str) -> Result<(), SupabaseError> {
        let mut map = self.metrics_by_brand.lock();
        for list in map.values_mut() {
            list.retain(|m| m.id != id);
        }
        Ok(())
    }

    async fn set_importance(
        &self,
        id: &str,
        importance: Importance,
    ) -> Result<Metric, SupabaseError> {
        if let Some(result) = self.importance_results.lock().pop_front() {
            result?;
        }
        let mut map = self.metrics_by_brand.lock();
        for list in map.values_mut() {
            if let Some(m) = list.iter_mut().find(|m| m.id == id) {
                m.importance = importance;
                return Ok(m.clone());
            }
        }
        Err(SupabaseError::NotFound(id.to_string()))
    }

    async fn reorder_metrics(
        &self,
        brand_id: &str,
        ordered_ids: &[String],
    ) -> Result<(), SupabaseError> {
        self.reorder_calls
            .lock()
            .push((brand_id.to_string(), ordered_ids.to_vec()));

        if let Some(result) = self.reorder_results.lock().pop_front() {
            result?;
        }

        // Apply the renumber the way the backend would.
        let mut map = self.metrics_by_brand.lock();
        if let Some(list) = map.get_mut(brand_id) {
            for m in list.iter_mut() {
                if let Some(pos) = ordered_ids.iter().position(|id| id == &m.id) {
                    m.sort_order = Some(pos as i64 + 1);
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// ScriptedDirectory — brand list double
// ============================================================================

#[derive(Default)]
pub struct ScriptedDirectory {
    pub brands: Mutex<Vec<Brand>>,
    pub fail_list: AtomicBool,
}

impl ScriptedDirectory {
    pub fn with_brands(brands: Vec<Brand>) -> Self {
        let directory = Self::default();
        *directory.brands.lock() = brands;
        directory
    }
}

#[async_trait]
impl BrandDirectory for ScriptedDirectory {
    async fn list_brands(&self) -> Result<Vec<Brand>, SupabaseError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(SupabaseError::Api {
                status: 503,
                message: "brands unavailable".to_string(),
            });
        }
        Ok(self.brands.lock().clone())
    }

    async fn create_brand(&self, name: &str) -> Result<Brand, SupabaseError> {
        let created = brand(&format!("srv-b{}", self.brands.lock().len() + 1), name.trim());
        self.brands.lock().insert(0, created.clone());
        Ok(created)
    }
}
