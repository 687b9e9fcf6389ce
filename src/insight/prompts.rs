//! Analyst prompt construction + model output parsing.
//!
//! The model is asked for strict JSON but routinely wraps it in markdown
//! fences or prose, so parsing peels fences and scans for an embedded
//! object before giving up and treating the reply as plain bullet lines.

use serde::{Deserialize, Serialize};

/// One metric's series as the model sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightMetric {
    pub name: String,
    #[serde(default)]
    pub data_source: Option<String>,
    pub values: Vec<InsightValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightValue {
    pub year: i32,
    pub month: u32,
    pub value: f64,
}

impl InsightMetric {
    /// Flatten a cached series (year -> month -> value) in chronological
    /// order.
    pub fn from_series(
        name: impl Into<String>,
        data_source: Option<String>,
        series: &std::collections::BTreeMap<i32, std::collections::BTreeMap<u32, f64>>,
    ) -> Self {
        let values = series
            .iter()
            .flat_map(|(year, months)| {
                months.iter().map(|(month, value)| InsightValue {
                    year: *year,
                    month: *month,
                    value: *value,
                })
            })
            .collect();
        Self {
            name: name.into(),
            data_source,
            values,
        }
    }
}

/// Build the analyst prompt around the serialized metric snapshot.
pub fn build_insight_prompt(metrics: &[InsightMetric]) -> String {
    let serialized = serde_json::to_string(metrics).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"ROLE
You are a senior marketing analyst for small and medium businesses. Be concise, data-driven, and practical.

INPUT
You are given multiple metrics, each with monthly values (and possibly multiple years).
Example:
{serialized}

TASK
1. Identify key trends and patterns across all metrics:
   - Growth or decline patterns month-over-month or year-over-year.
   - Seasonality (e.g., "Sales spike every December").
   - Metrics that move together or diverge (e.g., "Website traffic up, conversions flat").
2. Highlight insights that matter to marketing managers or business owners.
3. Provide short, actionable takeaways.

OUTPUT
Return strict JSON:
{{
  "insights": [
    "• Insight 1 (≤25 words, include months/years and %/numbers)",
    "• Insight 2 (≤25 words, link metrics if relevant)",
    "• Optional: Action (≤20 words, starts with 'Try:' or 'Check:')"
  ]
}}

CONSTRAINTS
- ≤80 words total.
- Use actual months/years and numeric references when possible.
- No hedging language.
- Focus on business value and clarity."#
    )
}

#[derive(Debug, Deserialize)]
struct ParsedInsights {
    insights: Vec<String>,
}

/// Parse a model reply into insight bullets.
///
/// JSON-first: an `{"insights": [...]}` object (fenced or embedded) wins
/// and its list is taken as-is, first three entries. Anything unparsable
/// degrades to the reply's first three non-empty lines. May return empty;
/// the provider substitutes the analysis-complete bullet then.
pub fn parse_insight_response(content: &str) -> Vec<String> {
    if let Some(json_str) = extract_json_block(content) {
        if let Ok(parsed) = serde_json::from_str::<ParsedInsights>(json_str) {
            return parsed.insights.into_iter().take(3).collect();
        }
    }

    content
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(3)
        .map(String::from)
        .collect()
}

/// Pull the first JSON object out of a reply that may wrap it in markdown
/// fences or surrounding prose.
fn extract_json_block(response: &str) -> Option<&str> {
    if let Some(start) = response.find("```json") {
        let body = &response[start + 7..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim());
        }
    }
    if let Some(start) = response.find("```") {
        let after = &response[start + 3..];
        if let Some(nl) = after.find('\n') {
            let body = &after[nl + 1..];
            if let Some(end) = body.find("```") {
                let candidate = body[..end].trim();
                if candidate.starts_with('{') {
                    return Some(candidate);
                }
            }
        }
    }

    let trimmed = response.trim();
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }

    // Object embedded mid-prose: balanced-brace scan, string-aware.
    let start = response.find('{')?;
    let candidate = &response[start..];
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (i, ch) in candidate.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&candidate[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
