//! AI insight generation with hard fallback guarantees.
//!
//! The provider never errors and never returns an empty list: a missing
//! key, an upstream failure, or an unparsable reply each resolve to a
//! fixed human-readable bullet. Callers can always render the result.

pub mod prompts;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

pub use prompts::{build_insight_prompt, parse_insight_response, InsightMetric, InsightValue};

use crate::types::Config;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub const FALLBACK_NOT_CONFIGURED: &str =
    "• AI insights are temporarily unavailable. Please check configuration.";
pub const FALLBACK_UPSTREAM: &str =
    "• Unable to generate insights at this time. Please try again later.";
pub const FALLBACK_ERROR: &str =
    "• An error occurred while generating insights. Please try again later.";
pub const FALLBACK_EMPTY: &str =
    "• Analysis complete. Review your metrics for trends and patterns.";

/// True when the bullets are one of the failure substitutes (missing key,
/// upstream rejection, transport or decode error). The "analysis
/// complete" placeholder is a normal outcome and does not count.
pub fn is_failure_fallback(bullets: &[String]) -> bool {
    matches!(
        bullets,
        [only] if only == FALLBACK_NOT_CONFIGURED || only == FALLBACK_UPSTREAM || only == FALLBACK_ERROR
    )
}

#[async_trait]
pub trait InsightProvider: Send + Sync {
    /// Produce up to three insight bullets for the given series. Total,
    /// never empty.
    async fn generate(&self, metrics: &[InsightMetric]) -> Vec<String>;
}

// ============================================================================
// OpenAI chat-completions response (raw deserialization)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// The production provider. Low temperature keeps the bullets grounded in
/// the numbers it was handed.
pub struct OpenAiInsightProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl OpenAiInsightProvider {
    pub fn from_config(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.openai_api_key.clone(),
            model: config.insight_model.clone(),
        }
    }
}

#[async_trait]
impl InsightProvider for OpenAiInsightProvider {
    async fn generate(&self, metrics: &[InsightMetric]) -> Vec<String> {
        if metrics.is_empty() {
            return vec![FALLBACK_EMPTY.to_string()];
        }

        let Some(api_key) = self.api_key.as_deref().filter(|k| !k.is_empty()) else {
            log::warn!("insight requested without an OpenAI key configured");
            return vec![FALLBACK_NOT_CONFIGURED.to_string()];
        };

        let prompt = build_insight_prompt(metrics);
        let body = json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = match self
            .http
            .post(OPENAI_CHAT_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                log::error!("insight request failed: {e}");
                return vec![FALLBACK_ERROR.to_string()];
            }
        };

        if !response.status().is_success() {
            log::error!("OpenAI API error: {}", response.status());
            return vec![FALLBACK_UPSTREAM.to_string()];
        }

        let data: ChatCompletionResponse = match response.json().await {
            Ok(d) => d,
            Err(e) => {
                log::error!("insight response decode failed: {e}");
                return vec![FALLBACK_ERROR.to_string()];
            }
        };

        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .unwrap_or_default();

        let insights = parse_insight_response(&content);
        if insights.is_empty() {
            return vec![FALLBACK_EMPTY.to_string()];
        }
        insights
    }
}
