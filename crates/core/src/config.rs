use serde::Deserialize;

/// Root application configuration. Loaded from environment variables with
/// the prefix `STREAMCAST__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub billing: BillingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Heartbeat liveness settings. The threshold is how stale a heartbeat may
/// be before the reaper demotes the session; the sweep interval is how often
/// the reaper runs. The two are independent constants.
#[derive(Debug, Clone, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_liveness_threshold_secs")]
    pub threshold_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Default ad timing policy applied to newly created sessions.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_free_viewing_secs")]
    pub free_viewing_secs: u64,
    #[serde(default = "default_ad_interval_secs")]
    pub ad_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_cost_per_click")]
    pub cost_per_click: f64,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_liveness_threshold_secs() -> u64 {
    30
}
fn default_sweep_interval_secs() -> u64 {
    15
}
fn default_free_viewing_secs() -> u64 {
    300
}
fn default_ad_interval_secs() -> u64 {
    180
}
fn default_cost_per_click() -> f64 {
    0.25
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            threshold_secs: default_liveness_threshold_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            free_viewing_secs: default_free_viewing_secs(),
            ad_interval_secs: default_ad_interval_secs(),
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            cost_per_click: default_cost_per_click(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            liveness: LivenessConfig::default(),
            scheduler: SchedulerConfig::default(),
            billing: BillingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("STREAMCAST")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
