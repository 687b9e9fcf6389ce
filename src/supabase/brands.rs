//! brands table — the tenant list.

use async_trait::async_trait;
use serde_json::json;

use super::{
    expect_success, send_with_retry, BrandDirectory, RetryPolicy, SupabaseClient, SupabaseError,
};
use crate::types::Brand;

#[async_trait]
impl BrandDirectory for SupabaseClient {
    async fn list_brands(&self) -> Result<Vec<Brand>, SupabaseError> {
        let request = self.get("brands").query(&[
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ]);

        let response = send_with_retry(request, &RetryPolicy::default()).await?;
        let response = expect_success(response).await?;
        Ok(response.json::<Vec<Brand>>().await?)
    }

    async fn create_brand(&self, name: &str) -> Result<Brand, SupabaseError> {
        let request = Self::single(
            self.post("brands")
                .header("Prefer", "return=representation")
                .json(&json!({ "name": name.trim() })),
        );

        let response = send_with_retry(request, &RetryPolicy::none()).await?;
        let response = expect_success(response).await?;
        Ok(response.json::<Brand>().await?)
    }
}
