//! Session state and config/prefs persistence.
//!
//! One `Session` per running client: the value store, the per-brand
//! metric cache, the brand list, handles to the gateway seams, and the
//! alert channel background tasks report failures on. Nothing here is
//! global; tests build sessions around scripted gateways.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::supabase::{BrandDirectory, MetricRegistry, SupabaseClient, ValueGateway};
use crate::types::{Brand, Config, Metric, SessionAlert, UiPrefs};
use crate::values::ValueStore;

pub struct Session {
    pub config: Config,
    pub store: Mutex<ValueStore>,
    /// brand_id -> metrics in fetch order (created_at descending).
    pub metrics: DashMap<String, Vec<Metric>>,
    pub brands: Mutex<Vec<Brand>>,
    pub prefs: Mutex<UiPrefs>,
    pub values_gw: Arc<dyn ValueGateway>,
    pub registry: Arc<dyn MetricRegistry>,
    pub directory: Arc<dyn BrandDirectory>,
    alerts_tx: mpsc::UnboundedSender<SessionAlert>,
}

impl Session {
    /// Production wiring: one Supabase client behind all three seams,
    /// persisted prefs loaded.
    pub fn connect(
        config: Config,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SessionAlert>), String> {
        let client = SupabaseClient::from_config(&config).map_err(|e| e.to_string())?;
        let client = Arc::new(client);
        let (session, alerts_rx) =
            Self::with_gateways(config, client.clone(), client.clone(), client);
        *session.prefs.lock() = load_prefs().unwrap_or_default();
        Ok((session, alerts_rx))
    }

    pub fn with_gateways(
        config: Config,
        values_gw: Arc<dyn ValueGateway>,
        registry: Arc<dyn MetricRegistry>,
        directory: Arc<dyn BrandDirectory>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionAlert>) {
        let (alerts_tx, alerts_rx) = mpsc::unbounded_channel();

        let session = Arc::new(Self {
            config,
            store: Mutex::new(ValueStore::new()),
            metrics: DashMap::new(),
            brands: Mutex::new(Vec::new()),
            prefs: Mutex::new(UiPrefs::default()),
            values_gw,
            registry,
            directory,
            alerts_tx,
        });
        (session, alerts_rx)
    }

    /// Queue a failure notification for the UI. Dropped silently once the
    /// receiver is gone (shutdown).
    pub fn push_alert(&self, alert: SessionAlert) {
        log::warn!("session alert: {}", alert.message());
        let _ = self.alerts_tx.send(alert);
    }

    pub fn set_brands(&self, brands: Vec<Brand>) {
        *self.brands.lock() = brands;
    }

    pub fn brand_list(&self) -> Vec<Brand> {
        self.brands.lock().clone()
    }

    pub fn set_brand_metrics(&self, brand_id: &str, metrics: Vec<Metric>) {
        self.metrics.insert(brand_id.to_string(), metrics);
    }

    pub fn metrics_for(&self, brand_id: &str) -> Vec<Metric> {
        self.metrics
            .get(brand_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn all_metrics(&self) -> Vec<Metric> {
        self.metrics
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    /// Resolve a brand by id or case-insensitive name.
    pub fn find_brand(&self, query: &str) -> Option<Brand> {
        let brands = self.brands.lock();
        brands
            .iter()
            .find(|b| b.id == query)
            .or_else(|| brands.iter().find(|b| b.name.eq_ignore_ascii_case(query)))
            .cloned()
    }

    /// Resolve metrics by id or case-insensitive name. Names are not
    /// unique, so this returns every match and lets the caller decide.
    pub fn find_metrics(&self, query: &str) -> Vec<Metric> {
        let by_id: Vec<Metric> = self
            .metrics
            .iter()
            .flat_map(|entry| entry.value().clone())
            .filter(|m| m.id == query)
            .collect();
        if !by_id.is_empty() {
            return by_id;
        }
        self.metrics
            .iter()
            .flat_map(|entry| entry.value().clone())
            .filter(|m| m.name.eq_ignore_ascii_case(query))
            .collect()
    }

    /// Remember the brand restriction across runs (`None` = all brands).
    pub fn select_brand(&self, brand_id: Option<String>) {
        let mut prefs = self.prefs.lock();
        prefs.selected_brand_id = brand_id;
        if let Err(e) = save_prefs(&prefs) {
            log::warn!("Failed to persist brand selection: {e}");
        }
    }

    pub fn selected_brand(&self) -> Option<String> {
        self.prefs.lock().selected_brand_id.clone()
    }
}

// ============================================================================
// Config + prefs files
// ============================================================================

pub fn config_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".scoreboards"))
}

pub fn config_path() -> Result<PathBuf, String> {
    Ok(config_dir()?.join("config.json"))
}

pub fn prefs_path() -> Result<PathBuf, String> {
    Ok(config_dir()?.join("prefs.json"))
}

/// Load config from disk and apply environment overrides.
///
/// A missing file is not an error: env-only setups (CI, scripts) start
/// from defaults.
pub fn load_config() -> Result<Config, String> {
    let path = config_path()?;
    let mut config = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

pub fn save_config(config: &Config) -> Result<(), String> {
    let path = config_path()?;
    write_config_file(&path, config)
}

fn read_config_file(path: &Path) -> Result<Config, String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

fn write_config_file(path: &Path, config: &Config) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, json).map_err(|e| format!("Failed to write config: {}", e))
}

fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("SUPABASE_URL") {
        config.supabase_url = url;
    }
    if let Some(key) = lookup("SUPABASE_SERVICE_ROLE_KEY").or_else(|| lookup("SUPABASE_ANON_KEY"))
    {
        config.supabase_key = key;
    }
    if let Some(key) = lookup("OPENAI_API_KEY") {
        config.openai_api_key = Some(key);
    }
}

pub fn load_prefs() -> Result<UiPrefs, String> {
    let path = prefs_path()?;
    if !path.exists() {
        return Ok(UiPrefs::default());
    }
    let content = fs::read_to_string(&path).map_err(|e| format!("Failed to read prefs: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse prefs: {}", e))
}

pub fn save_prefs(prefs: &UiPrefs) -> Result<(), String> {
    let path = prefs_path()?;
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }
    let json = serde_json::to_string_pretty(prefs)
        .map_err(|e| format!("Failed to serialize prefs: {}", e))?;
    fs::write(path, json).map_err(|e| format!("Failed to write prefs: {}", e))
}
