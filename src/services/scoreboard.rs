// Scoreboard service — view derivation.
// Pure projections of (brand list, metric cache, value store) into what
// the grid and detail screens render. No side effects, no network.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::state::Session;
use crate::types::{BrandMetric, BrandWithMetrics, Metric, MetricValueRow};
use crate::values::ValueStore;

// Metrics that predate reordering carry no sort_order and display last.
const SORT_ORDER_LAST: i64 = i64::MAX;

/// One grid row: a metric with its twelve month cells for the selected
/// year and the YTD aggregate. `ytd` is `None` when the year has no
/// entries at all; a year whose entries sum to zero is `Some(0.0)`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRow {
    #[serde(flatten)]
    pub metric: BrandMetric,
    pub first_in_group: bool,
    pub months: [Option<f64>; 12],
    pub ytd: Option<f64>,
}

/// One year of a metric's history, months indexed 0 = January.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSeries {
    pub year: i32,
    pub months: [Option<f64>; 12],
    pub ytd: f64,
}

/// Everything the detail screen shows for one metric. `average` is the
/// raw mean; display layers round it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDetail {
    pub metric: Metric,
    pub years: Vec<YearSeries>,
    pub latest: Option<MetricValueRow>,
    pub max: Option<f64>,
    pub average: Option<f64>,
}

pub fn brands_with_metrics(session: &Session) -> Vec<BrandWithMetrics> {
    session
        .brand_list()
        .into_iter()
        .map(|brand| {
            let metrics = session.metrics_for(&brand.id);
            BrandWithMetrics { brand, metrics }
        })
        .collect()
}

fn display_order(a: &Metric, b: &Metric) -> Ordering {
    let ka = a.sort_order.unwrap_or(SORT_ORDER_LAST);
    let kb = b.sort_order.unwrap_or(SORT_ORDER_LAST);
    ka.cmp(&kb)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// A brand's metrics in the order the grid lists them. Position arguments
/// (drag targets, the `move` command) index into this order.
pub fn display_sorted(metrics: &[Metric]) -> Vec<Metric> {
    let mut sorted = metrics.to_vec();
    sorted.sort_by(display_order);
    sorted
}

/// The metrics the grid shows: a single brand's, or every brand's when no
/// brand is selected, each tagged with its brand name. Within a brand the
/// order is `sort_order` ascending, `None` last, creation order breaking
/// ties.
pub fn visible_metrics(
    brands: &[BrandWithMetrics],
    selected_brand: Option<&str>,
) -> Vec<BrandMetric> {
    brands
        .iter()
        .filter(|b| selected_brand.is_none_or(|id| b.brand.id == id))
        .flat_map(|b| {
            display_sorted(&b.metrics).into_iter().map(|metric| BrandMetric {
                metric,
                brand_name: b.brand.name.clone(),
            })
        })
        .collect()
}

/// Project the visible metrics onto one year of the store. Metrics
/// sharing a display name cluster into one group, ordered within the
/// group by `sort_order`; groups sit where their first member falls in
/// the visible order.
pub fn grid(visible: &[BrandMetric], store: &ValueStore, year: i32) -> Vec<GridRow> {
    let mut groups: Vec<(&str, Vec<&BrandMetric>)> = Vec::new();
    for m in visible {
        match groups.iter_mut().find(|(name, _)| *name == m.metric.name) {
            Some((_, members)) => members.push(m),
            None => groups.push((m.metric.name.as_str(), vec![m])),
        }
    }

    let mut rows = Vec::with_capacity(visible.len());
    for (_, mut members) in groups {
        members.sort_by(|a, b| display_order(&a.metric, &b.metric));
        for (i, m) in members.iter().enumerate() {
            let mut months = [None; 12];
            for (slot, month) in months.iter_mut().zip(1u32..) {
                *slot = store.get(&m.metric.id, year, month);
            }
            rows.push(GridRow {
                metric: (*m).clone(),
                first_in_group: i == 0,
                months,
                ytd: store.ytd(&m.metric.id, year),
            });
        }
    }
    rows
}

/// Group a metric's full history by year (newest first) and derive the
/// headline stats the detail screen shows.
pub fn metric_detail(metric: Metric, rows: &[MetricValueRow]) -> MetricDetail {
    let mut by_year: BTreeMap<i32, [Option<f64>; 12]> = BTreeMap::new();
    for row in rows {
        if !(1..=12).contains(&row.month) {
            continue;
        }
        by_year.entry(row.year).or_insert([None; 12])[(row.month - 1) as usize] = Some(row.value);
    }

    let years = by_year
        .into_iter()
        .rev()
        .map(|(year, months)| YearSeries {
            year,
            months,
            ytd: months.iter().flatten().sum(),
        })
        .collect();

    let latest = rows.iter().max_by_key(|r| (r.year, r.month)).cloned();
    let max = rows.iter().map(|r| r.value).reduce(f64::max);
    let average = if rows.is_empty() {
        None
    } else {
        Some(rows.iter().map(|r| r.value).sum::<f64>() / rows.len() as f64)
    };

    MetricDetail {
        metric,
        years,
        latest,
        max,
        average,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{brand, metric, value_row};

    fn store_with(rows: &[MetricValueRow]) -> ValueStore {
        let mut store = ValueStore::default();
        store.load_rows(rows);
        store
    }

    fn two_brands() -> Vec<BrandWithMetrics> {
        vec![
            BrandWithMetrics {
                brand: brand("b1", "Acme"),
                metrics: vec![
                    metric("m2", "b1", "Signups", Some(2)),
                    metric("m1", "b1", "Sessions", Some(1)),
                    metric("m3", "b1", "Legacy", None),
                ],
            },
            BrandWithMetrics {
                brand: brand("b2", "Globex"),
                metrics: vec![metric("m4", "b2", "Sessions", Some(1))],
            },
        ]
    }

    #[test]
    fn test_visible_metrics_single_brand_sorts_and_tags() {
        let visible = visible_metrics(&two_brands(), Some("b1"));
        let ids: Vec<&str> = visible.iter().map(|m| m.metric.id.as_str()).collect();
        // sort_order ascending, None last.
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert!(visible.iter().all(|m| m.brand_name == "Acme"));
    }

    #[test]
    fn test_visible_metrics_all_brands_unions() {
        let visible = visible_metrics(&two_brands(), None);
        let ids: Vec<&str> = visible.iter().map(|m| m.metric.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3", "m4"]);
        assert_eq!(visible[3].brand_name, "Globex");
    }

    #[test]
    fn test_visible_metrics_unknown_brand_is_empty() {
        assert!(visible_metrics(&two_brands(), Some("nope")).is_empty());
    }

    #[test]
    fn test_grid_clusters_duplicate_names() {
        // Two brands both track "Sessions"; the rows must sit together.
        let visible = visible_metrics(&two_brands(), None);
        let rows = grid(&visible, &ValueStore::default(), 2025);

        let ids: Vec<&str> = rows.iter().map(|r| r.metric.metric.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m4", "m2", "m3"]);
        assert!(rows[0].first_in_group);
        assert!(!rows[1].first_in_group);
        assert!(rows[2].first_in_group);
        assert!(rows[3].first_in_group);
    }

    #[test]
    fn test_grid_cells_and_ytd() {
        let store = store_with(&[
            value_row("m1", 2025, 1, 100.0),
            value_row("m1", 2025, 3, 50.0),
            value_row("m1", 2024, 12, 999.0),
        ]);
        let visible = visible_metrics(&two_brands(), Some("b1"));
        let rows = grid(&visible, &store, 2025);

        let m1 = &rows[0];
        assert_eq!(m1.metric.metric.id, "m1");
        assert_eq!(m1.months[0], Some(100.0));
        assert_eq!(m1.months[1], None);
        assert_eq!(m1.months[2], Some(50.0));
        assert_eq!(m1.ytd, Some(150.0));
    }

    #[test]
    fn test_grid_ytd_distinguishes_empty_from_zero() {
        let store = store_with(&[
            value_row("m1", 2025, 2, 0.0),
            value_row("m1", 2025, 7, 0.0),
        ]);
        let visible = visible_metrics(&two_brands(), Some("b1"));
        let rows = grid(&visible, &store, 2025);

        // Entries summing to zero are a real zero, not "no data".
        assert_eq!(rows[0].ytd, Some(0.0));
        // m2 has nothing in 2025 at all.
        assert_eq!(rows[1].ytd, None);
    }

    #[test]
    fn test_metric_detail_groups_years_descending() {
        let rows = vec![
            value_row("m1", 2024, 11, 80.0),
            value_row("m1", 2025, 1, 100.0),
            value_row("m1", 2025, 2, 20.0),
        ];
        let detail = metric_detail(metric("m1", "b1", "Sessions", Some(1)), &rows);

        assert_eq!(detail.years.len(), 2);
        assert_eq!(detail.years[0].year, 2025);
        assert_eq!(detail.years[0].months[0], Some(100.0));
        assert_eq!(detail.years[0].ytd, 120.0);
        assert_eq!(detail.years[1].year, 2024);
        assert_eq!(detail.years[1].ytd, 80.0);

        let latest = detail.latest.unwrap();
        assert_eq!((latest.year, latest.month), (2025, 2));
        assert_eq!(detail.max, Some(100.0));
        let avg = detail.average.unwrap();
        assert!((avg - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_metric_detail_without_history() {
        let detail = metric_detail(metric("m1", "b1", "Sessions", None), &[]);
        assert!(detail.years.is_empty());
        assert!(detail.latest.is_none());
        assert!(detail.max.is_none());
        assert!(detail.average.is_none());
    }
}
