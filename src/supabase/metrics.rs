//! metrics table — definitions, lifecycle, ordering.
//!
//! Reorder is the one multi-request flow: a membership check over the
//! submitted ids, then one sort_order write per row. The check runs first
//! so a single foreign id rejects the whole reorder before anything is
//! renumbered.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{
    expect_success, send_with_retry, MetricRegistry, RetryPolicy, SupabaseClient, SupabaseError,
};
use crate::types::{Importance, Metric};

#[derive(Debug, Deserialize)]
struct SortOrderRow {
    sort_order: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwnershipRow {
    id: String,
    brand_id: String,
}

/// sort_order for a newly created metric: brand max + 1, or 1 for the
/// brand's first metric.
fn next_sort_order(rows: &[SortOrderRow]) -> i64 {
    rows.first()
        .map(|row| row.sort_order.unwrap_or(0) + 1)
        .unwrap_or(1)
}

fn verify_ownership(
    rows: &[OwnershipRow],
    brand_id: &str,
    expected: usize,
) -> Result<(), SupabaseError> {
    if rows.len() != expected {
        return Err(SupabaseError::NotFound(
            "one or more metrics in the reorder".to_string(),
        ));
    }
    if rows.iter().any(|row| row.brand_id != brand_id) {
        return Err(SupabaseError::BrandMismatch);
    }
    Ok(())
}

impl SupabaseClient {
    /// One renumber write. Filtered by brand as well as id so a metric
    /// re-parented after the membership check matches nothing instead of
    /// taking a cross-brand sort_order.
    fn renumber_request(
        &self,
        brand_id: &str,
        id: &str,
        position: i64,
    ) -> reqwest::RequestBuilder {
        self.patch("metrics")
            .query(&[
                ("id", format!("eq.{id}")),
                ("brand_id", format!("eq.{brand_id}")),
            ])
            .json(&json!({ "sort_order": position }))
    }

    /// Map the "zero or many rows" Accept failure onto NotFound.
    async fn one_metric(
        response: reqwest::Response,
        id: &str,
    ) -> Result<Metric, SupabaseError> {
        match expect_success(response).await {
            Ok(r) => Ok(r.json::<Metric>().await?),
            Err(SupabaseError::Api { status: 406, .. }) => {
                Err(SupabaseError::NotFound(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl MetricRegistry for SupabaseClient {
    async fn list_metrics(&self, brand_id: &str) -> Result<Vec<Metric>, SupabaseError> {
        let request = self.get("metrics").query(&[
            ("select", "*".to_string()),
            ("brand_id", format!("eq.{brand_id}")),
            ("order", "created_at.desc".to_string()),
        ]);

        let response = send_with_retry(request, &RetryPolicy::default()).await?;
        let response = expect_success(response).await?;
        Ok(response.json::<Vec<Metric>>().await?)
    }

    async fn metric_by_id(&self, id: &str) -> Result<Metric, SupabaseError> {
        let request = Self::single(self.get("metrics").query(&[
            ("select", "*".to_string()),
            ("id", format!("eq.{id}")),
        ]));

        let response = send_with_retry(request, &RetryPolicy::default()).await?;
        Self::one_metric(response, id).await
    }

    async fn create_metric(
        &self,
        brand_id: &str,
        name: &str,
        data_source: Option<&str>,
    ) -> Result<Metric, SupabaseError> {
        let order_request = self.get("metrics").query(&[
            ("select", "sort_order".to_string()),
            ("brand_id", format!("eq.{brand_id}")),
            ("order", "sort_order.desc.nullslast".to_string()),
            ("limit", "1".to_string()),
        ]);
        let response = send_with_retry(order_request, &RetryPolicy::default()).await?;
        let response = expect_success(response).await?;
        let rows = response.json::<Vec<SortOrderRow>>().await?;
        let sort_order = next_sort_order(&rows);

        let data_source = data_source.map(str::trim).filter(|s| !s.is_empty());
        let request = Self::single(
            self.post("metrics")
                .header("Prefer", "return=representation")
                .json(&json!({
                    "brand_id": brand_id,
                    "name": name.trim(),
                    "data_source": data_source,
                    "sort_order": sort_order,
                })),
        );

        let response = send_with_retry(request, &RetryPolicy::none()).await?;
        let response = expect_success(response).await?;
        Ok(response.json::<Metric>().await?)
    }

    async fn update_metric(
        &self,
        id: &str,
        name: &str,
        data_source: Option<&str>,
    ) -> Result<Metric, SupabaseError> {
        let data_source = data_source.map(str::trim).filter(|s| !s.is_empty());
        let request = Self::single(
            self.patch("metrics")
                .query(&[("id", format!("eq.{id}"))])
                .header("Prefer", "return=representation")
                .json(&json!({
                    "name": name.trim(),
                    "data_source": data_source,
                })),
        );

        let response = send_with_retry(request, &RetryPolicy::none()).await?;
        Self::one_metric(response, id).await
    }

    async fn delete_metric(&self, id: &str) -> Result<(), SupabaseError> {
        // metric_values rows go with it via the FK cascade.
        let request = self
            .delete("metrics")
            .query(&[("id", format!("eq.{id}"))]);

        let response = send_with_retry(request, &RetryPolicy::none()).await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn set_importance(
        &self,
        id: &str,
        importance: Importance,
    ) -> Result<Metric, SupabaseError> {
        let request = Self::single(
            self.patch("metrics")
                .query(&[("id", format!("eq.{id}"))])
                .header("Prefer", "return=representation")
                .json(&json!({ "importance": importance.as_str() })),
        );

        let response = send_with_retry(request, &RetryPolicy::none()).await?;
        Self::one_metric(response, id).await
    }

    async fn reorder_metrics(
        &self,
        brand_id: &str,
        ordered_ids: &[String],
    ) -> Result<(), SupabaseError> {
        if ordered_ids.is_empty() {
            return Ok(());
        }

        let check_request = self.get("metrics").query(&[
            ("select", "id,brand_id".to_string()),
            ("id", format!("in.({})", ordered_ids.join(","))),
        ]);
        let response = send_with_retry(check_request, &RetryPolicy::default()).await?;
        let response = expect_success(response).await?;
        let rows = response.json::<Vec<OwnershipRow>>().await?;
        verify_ownership(&rows, brand_id, ordered_ids.len())?;

        for (index, id) in ordered_ids.iter().enumerate() {
            let request = self.renumber_request(brand_id, id, index as i64 + 1);
            let response = send_with_retry(request, &RetryPolicy::none()).await?;
            expect_success(response).await?;
        }

        Ok(())
    }
}
