use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            sweep: SweepConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_enabled")]
    pub enabled: bool,
    /// Seconds between sweep cycles.
    #[serde(default = "default_sweep_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_sweep_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
    /// Attempts at the optimistic save before an event is dropped.
    #[serde(default = "default_save_attempts")]
    pub save_attempts: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweep_enabled(),
            tick_secs: default_sweep_tick_secs(),
            max_concurrent_probes: default_sweep_max_concurrent_probes(),
            save_attempts: default_save_attempts(),
        }
    }
}

fn default_sweep_enabled() -> bool {
    true
}

fn default_sweep_tick_secs() -> u64 {
    10
}

fn default_sweep_max_concurrent_probes() -> usize {
    10
}

fn default_save_attempts() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Optional webhook that receives every alert intent as JSON.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data".to_string()
}
