//! metric_values table — one row per (metric, year, month).
//!
//! Writes run single-attempt: the edit path wants failures back fast so
//! the optimistic cell can roll back. The snapshot read retries.

use async_trait::async_trait;
use serde_json::json;

use super::{
    expect_success, send_with_retry, RetryPolicy, SupabaseClient, SupabaseError, ValueGateway,
};
use crate::types::MetricValueRow;

#[async_trait]
impl ValueGateway for SupabaseClient {
    async fn upsert_value(
        &self,
        metric_id: &str,
        year: i32,
        month: u32,
        value: f64,
    ) -> Result<MetricValueRow, SupabaseError> {
        let request = Self::single(
            self.post("metric_values")
                .query(&[("on_conflict", "metric_id,year,month")])
                .header("Prefer", "resolution=merge-duplicates,return=representation")
                .json(&json!({
                    "metric_id": metric_id,
                    "year": year,
                    "month": month,
                    "value": value,
                })),
        );

        let response = send_with_retry(request, &RetryPolicy::none()).await?;
        let response = expect_success(response).await?;
        Ok(response.json::<MetricValueRow>().await?)
    }

    async fn delete_value(
        &self,
        metric_id: &str,
        year: i32,
        month: u32,
    ) -> Result<(), SupabaseError> {
        let request = self.delete("metric_values").query(&[
            ("metric_id", format!("eq.{metric_id}")),
            ("year", format!("eq.{year}")),
            ("month", format!("eq.{month}")),
        ]);

        let response = send_with_retry(request, &RetryPolicy::none()).await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn value_snapshot(
        &self,
        start_year: i32,
        end_year: i32,
    ) -> Result<Vec<MetricValueRow>, SupabaseError> {
        let request = self.get("metric_values").query(&[
            ("select", "id,metric_id,year,month,value".to_string()),
            ("year", format!("gte.{start_year}")),
            ("year", format!("lte.{end_year}")),
            ("order", "metric_id.asc,year.asc,month.asc".to_string()),
        ]);

        let response = send_with_retry(request, &RetryPolicy::default()).await?;
        let response = expect_success(response).await?;
        Ok(response.json::<Vec<MetricValueRow>>().await?)
    }

    async fn values_for_metric(
        &self,
        metric_id: &str,
    ) -> Result<Vec<MetricValueRow>, SupabaseError> {
        let request = self.get("metric_values").query(&[
            ("select", "id,metric_id,year,month,value".to_string()),
            ("metric_id", format!("eq.{metric_id}")),
            ("order", "year.desc,month.desc".to_string()),
        ]);

        let response = send_with_retry(request, &RetryPolicy::default()).await?;
        let response = expect_success(response).await?;
        Ok(response.json::<Vec<MetricValueRow>>().await?)
    }
}
