use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration stored in ~/.scoreboards/config.json
///
/// Environment variables override file values at load time
/// (`SUPABASE_URL`, `SUPABASE_SERVICE_ROLE_KEY`, `SUPABASE_ANON_KEY`,
/// `OPENAI_API_KEY`), so a config file is optional in CI and scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub supabase_url: String,
    /// Service-role key preferred; anon key works for read-mostly use.
    #[serde(default, alias = "supabase_anon_key")]
    pub supabase_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_insight_model")]
    pub insight_model: String,
    /// First year the grid shows. Earlier rows exist server-side but are
    /// never fetched.
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    /// How many years past the current one the year picker offers.
    #[serde(default = "default_years_ahead")]
    pub years_ahead: i32,
}

fn default_insight_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_start_year() -> i32 {
    2023
}

fn default_years_ahead() -> i32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_key: String::new(),
            openai_api_key: None,
            insight_model: default_insight_model(),
            start_year: default_start_year(),
            years_ahead: default_years_ahead(),
        }
    }
}

impl Config {
    /// True when enough is present to talk to the backend.
    pub fn has_backend(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_key.is_empty()
    }
}

/// Per-user UI preferences persisted alongside the config.
///
/// `selected_brand_id = None` means "all brands".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPrefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_brand_id: Option<String>,
}

// =============================================================================
// Domain rows (snake_case, matching the backend schema)
// =============================================================================

/// A tenant. Every metric belongs to exactly one brand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brand {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Traffic-light weighting shown next to a metric name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Green,
    Amber,
    Red,
}

impl Default for Importance {
    fn default() -> Self {
        Importance::Green
    }
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Green => "green",
            Importance::Amber => "amber",
            Importance::Red => "red",
        }
    }

    /// Parse the wire value. Anything outside the enum is rejected, the
    /// backend column carries the same check.
    pub fn parse(value: &str) -> Option<Importance> {
        match value {
            "green" => Some(Importance::Green),
            "amber" => Some(Importance::Amber),
            "red" => Some(Importance::Red),
            _ => None,
        }
    }

    /// Next state in the click-to-cycle order green -> amber -> red.
    pub fn cycled(&self) -> Importance {
        match self {
            Importance::Green => Importance::Amber,
            Importance::Amber => Importance::Red,
            Importance::Red => Importance::Green,
        }
    }
}

/// A named, brand-scoped series definition.
///
/// `sort_order` is dense 1..N per brand once a reorder has been persisted;
/// `None` on rows that predate reordering, which sort last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    pub brand_id: String,
    pub name: String,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One persisted cell: a metric's value for a calendar month.
///
/// The backend enforces at most one row per (metric_id, year, month);
/// upserts target that unique constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricValueRow {
    #[serde(default)]
    pub id: Option<String>,
    pub metric_id: String,
    pub year: i32,
    pub month: u32,
    pub value: f64,
}

/// A metric joined with its owning brand's name, the unit the grid renders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandMetric {
    #[serde(flatten)]
    pub metric: Metric,
    pub brand_name: String,
}

/// A brand together with its metrics, ordered as fetched
/// (created_at descending, the listing order the grid regroups).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandWithMetrics {
    pub brand: Brand,
    pub metrics: Vec<Metric>,
}

// =============================================================================
// Session alerts (serializable for UI surfacing)
// =============================================================================

/// Out-of-band failure notifications from background persistence tasks.
///
/// The UI drains these from the session's alert channel and renders them
/// as toasts; the state they describe has already been rolled back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SessionAlert {
    ValueSaveFailed {
        id: String,
        metric_id: String,
        year: i32,
        month: u32,
        message: String,
    },
    ReorderFailed {
        id: String,
        brand_id: String,
        message: String,
    },
    LoadFailed {
        id: String,
        message: String,
    },
}

impl SessionAlert {
    pub fn message(&self) -> &str {
        match self {
            SessionAlert::ValueSaveFailed { message, .. } => message,
            SessionAlert::ReorderFailed { message, .. } => message,
            SessionAlert::LoadFailed { message, .. } => message,
        }
    }
}
