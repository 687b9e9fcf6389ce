//! Supabase table REST gateway (PostgREST wire format).
//!
//! The hosted backend is plain Postgres behind PostgREST; every call here
//! is an HTTP request against `/rest/v1/<table>` with `eq.`/`gte.`-style
//! filters and `Prefer` headers. Row-level policy stays server-side, the
//! client only carries the project key.
//!
//! Modules:
//! - values: metric_values table (upsert / delete / snapshot)
//! - metrics: metrics table (create / update / delete / reorder / importance)
//! - brands: brands table (list / create)
//!
//! The gateway traits at the bottom are the seams the session layer talks
//! through; tests script them with in-memory fakes.

pub mod brands;
pub mod metrics;
pub mod values;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::types::{Brand, Config, Importance, Metric, MetricValueRow};

/// Accept header that makes PostgREST return exactly one object
/// (406 when the filter matches zero or several rows).
const PGRST_OBJECT: &str = "application/vnd.pgrst.object+json";

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Supabase error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Supabase is not configured (set supabaseUrl and supabase key)")]
    NotConfigured,
    #[error("Invalid Supabase URL: {0}")]
    InvalidUrl(String),
    #[error("Row not found: {0}")]
    NotFound(String),
    #[error("Some metrics do not belong to the specified brand")]
    BrandMismatch,
}

impl SupabaseError {
    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SupabaseError::Http(e) => e.is_timeout() || e.is_connect(),
            SupabaseError::Api { status, .. } => {
                matches!(status, 408 | 429) || *status >= 500
            }
            _ => false,
        }
    }
}

/// Error body PostgREST sends alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    #[allow(dead_code)]
    code: Option<String>,
    hint: Option<String>,
}

// ============================================================================
// Retry policy
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt. Write paths use this so a failed edit surfaces and
    /// rolls back instead of silently retrying.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryDecision {
    Retryable,
    NonRetryable,
}

fn retry_decision_for_status(status: reqwest::StatusCode) -> RetryDecision {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        RetryDecision::Retryable
    } else {
        RetryDecision::NonRetryable
    }
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs.min(30));
        }
    }

    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0))
        % 150;
    Duration::from_millis(base.saturating_add(jitter))
}

pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, SupabaseError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(SupabaseError::Http);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                if retry_decision_for_status(status) == RetryDecision::Retryable
                    && attempt < attempts
                {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "supabase retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                let retryable_transport = err.is_timeout() || err.is_connect();
                if retryable_transport && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    log::warn!(
                        "supabase retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(SupabaseError::Http(err));
            }
        }
    }

    Err(SupabaseError::Api {
        status: 0,
        message: "request exhausted retries".to_string(),
    })
}

// ============================================================================
// Client
// ============================================================================

/// Config-bound REST client. Cheap to clone (shared connection pool).
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    key: String,
}

impl SupabaseClient {
    pub fn from_config(config: &Config) -> Result<Self, SupabaseError> {
        if !config.has_backend() {
            return Err(SupabaseError::NotConfigured);
        }
        Self::new(&config.supabase_url, &config.supabase_key)
    }

    pub fn new(base_url: &str, key: &str) -> Result<Self, SupabaseError> {
        let parsed =
            Url::parse(base_url).map_err(|e| SupabaseError::InvalidUrl(format!("{base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SupabaseError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
        })
    }

    pub(crate) fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Attach the project key headers every REST call needs.
    pub(crate) fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header("apikey", &self.key).bearer_auth(&self.key)
    }

    pub(crate) fn get(&self, table: &str) -> reqwest::RequestBuilder {
        self.authed(self.http.get(self.table_url(table)))
    }

    pub(crate) fn post(&self, table: &str) -> reqwest::RequestBuilder {
        self.authed(self.http.post(self.table_url(table)))
    }

    pub(crate) fn patch(&self, table: &str) -> reqwest::RequestBuilder {
        self.authed(self.http.patch(self.table_url(table)))
    }

    pub(crate) fn delete(&self, table: &str) -> reqwest::RequestBuilder {
        self.authed(self.http.delete(self.table_url(table)))
    }

    /// Ask for exactly one row back (insert/update/select with `.single()`
    /// semantics).
    pub(crate) fn single(request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(reqwest::header::ACCEPT, PGRST_OBJECT)
    }
}

/// Convert a non-2xx response into a typed error, decoding the PostgREST
/// error body when there is one.
pub(crate) async fn expect_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, SupabaseError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<PostgrestErrorBody>(&body) {
        Ok(parsed) => {
            let mut message = parsed.message.unwrap_or_else(|| body.clone());
            if let Some(hint) = parsed.hint {
                message.push_str(" (hint: ");
                message.push_str(&hint);
                message.push(')');
            }
            message
        }
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => body,
    };

    Err(SupabaseError::Api {
        status: status.as_u16(),
        message,
    })
}

// ============================================================================
// Gateway seams
// ============================================================================

/// Persistence for individual cells plus the bulk snapshot read.
#[async_trait]
pub trait ValueGateway: Send + Sync {
    async fn upsert_value(
        &self,
        metric_id: &str,
        year: i32,
        month: u32,
        value: f64,
    ) -> Result<MetricValueRow, SupabaseError>;

    async fn delete_value(&self, metric_id: &str, year: i32, month: u32)
        -> Result<(), SupabaseError>;

    async fn value_snapshot(
        &self,
        start_year: i32,
        end_year: i32,
    ) -> Result<Vec<MetricValueRow>, SupabaseError>;

    async fn values_for_metric(&self, metric_id: &str)
        -> Result<Vec<MetricValueRow>, SupabaseError>;
}

/// Metric definitions: listing, lifecycle, ordering.
#[async_trait]
pub trait MetricRegistry: Send + Sync {
    async fn list_metrics(&self, brand_id: &str) -> Result<Vec<Metric>, SupabaseError>;

    async fn metric_by_id(&self, id: &str) -> Result<Metric, SupabaseError>;

    async fn create_metric(
        &self,
        brand_id: &str,
        name: &str,
        data_source: Option<&str>,
    ) -> Result<Metric, SupabaseError>;

    async fn update_metric(
        &self,
        id: &str,
        name: &str,
        data_source: Option<&str>,
    ) -> Result<Metric, SupabaseError>;

    async fn delete_metric(&self, id: &str) -> Result<(), SupabaseError>;

    async fn set_importance(
        &self,
        id: &str,
        importance: Importance,
    ) -> Result<Metric, SupabaseError>;

    /// Persist a new order as dense sort_order 1..N. Every id must belong
    /// to `brand_id`; one foreign id rejects the whole reorder.
    async fn reorder_metrics(
        &self,
        brand_id: &str,
        ordered_ids: &[String],
    ) -> Result<(), SupabaseError>;
}

#[async_trait]
pub trait BrandDirectory: Send + Sync {
    async fn list_brands(&self) -> Result<Vec<Brand>, SupabaseError>;

    async fn create_brand(&self, name: &str) -> Result<Brand, SupabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_decision_for_status() {
        use reqwest::StatusCode;
        assert_eq!(
            retry_decision_for_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDecision::Retryable
        );
        assert_eq!(
            retry_decision_for_status(StatusCode::REQUEST_TIMEOUT),
            RetryDecision::Retryable
        );
        assert_eq!(
            retry_decision_for_status(StatusCode::BAD_GATEWAY),
            RetryDecision::Retryable
        );
        assert_eq!(
            retry_decision_for_status(StatusCode::CONFLICT),
            RetryDecision::NonRetryable
        );
        assert_eq!(
            retry_decision_for_status(StatusCode::FORBIDDEN),
            RetryDecision::NonRetryable
        );
    }

    #[test]
    fn test_retry_delay_honors_retry_after() {
        let policy = RetryPolicy::default();
        let header = reqwest::header::HeaderValue::from_static("3");
        assert_eq!(
            retry_delay(1, &policy, Some(&header)),
            Duration::from_secs(3)
        );

        // Server-requested waits are capped.
        let long = reqwest::header::HeaderValue::from_static("600");
        assert_eq!(
            retry_delay(1, &policy, Some(&long)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_retry_delay_backoff_is_bounded() {
        let policy = RetryPolicy::default();
        let first = retry_delay(1, &policy, None);
        let third = retry_delay(3, &policy, None);
        assert!(first >= Duration::from_millis(policy.initial_backoff_ms));
        assert!(third <= Duration::from_millis(policy.max_backoff_ms + 150));
    }

    #[test]
    fn test_error_retryability() {
        assert!(SupabaseError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(SupabaseError::Api {
            status: 429,
            message: "rate limited".into()
        }
        .is_retryable());
        assert!(!SupabaseError::Api {
            status: 403,
            message: "forbidden".into()
        }
        .is_retryable());
        assert!(!SupabaseError::BrandMismatch.is_retryable());
        assert!(!SupabaseError::NotConfigured.is_retryable());
    }

    #[test]
    fn test_client_requires_config() {
        let config = Config::default();
        assert!(matches!(
            SupabaseClient::from_config(&config),
            Err(SupabaseError::NotConfigured)
        ));
    }

    #[test]
    fn test_client_rejects_bad_url() {
        assert!(matches!(
            SupabaseClient::new("not a url", "key"),
            Err(SupabaseError::InvalidUrl(_))
        ));
        assert!(matches!(
            SupabaseClient::new("ftp://proj.supabase.co", "key"),
            Err(SupabaseError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_table_url_trims_trailing_slash() {
        let client = SupabaseClient::new("https://proj.supabase.co/", "key").unwrap();
        assert_eq!(
            client.table_url("metric_values"),
            "https://proj.supabase.co/rest/v1/metric_values"
        );
    }
}
