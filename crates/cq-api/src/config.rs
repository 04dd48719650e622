//! API server configuration.

use cq_engine::EngineConfig;
use serde::Deserialize;

/// Top-level API server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Listen address (e.g., "0.0.0.0").
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// PostgreSQL URL for the persistent audit log.
    pub database_url: Option<String>,
    /// Path to the engine's TOML config.
    pub engine_config: Option<String>,
    /// JSON snapshot to load as the dataset.
    pub data_path: Option<String>,
    /// Load the clinical sample dataset when no snapshot is given.
    #[serde(default = "default_sample_data")]
    pub sample_data: bool,
    /// How often held plans are checked for expiry.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_sample_data() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    30
}

fn flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

impl ApiConfig {
    /// Load config from environment variables (`CQ_HOST`, `CQ_PORT`,
    /// `CQ_CONFIG`, `CQ_DATA`, `CQ_SAMPLE_DATA`, `CQ_SWEEP_SECS`,
    /// `DATABASE_URL`).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: get("CQ_HOST").unwrap_or(defaults.host),
            port: get("CQ_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            database_url: get("DATABASE_URL").filter(|u| !u.is_empty()),
            engine_config: get("CQ_CONFIG").filter(|p| !p.is_empty()),
            data_path: get("CQ_DATA").filter(|p| !p.is_empty()),
            sample_data: get("CQ_SAMPLE_DATA")
                .map(|v| flag(&v))
                .unwrap_or(defaults.sample_data),
            sweep_interval_secs: get("CQ_SWEEP_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sweep_interval_secs),
        }
    }

    /// Engine tunables from `engine_config`, or the defaults.
    pub fn load_engine_config(&self) -> anyhow::Result<EngineConfig> {
        match &self.engine_config {
            Some(path) => EngineConfig::from_file(path),
            None => Ok(EngineConfig::default()),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: None,
            engine_config: None,
            data_path: None,
            sample_data: default_sample_data(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert!(config.sample_data);
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CQ_PORT", "8080"),
            ("CQ_SAMPLE_DATA", "false"),
            ("DATABASE_URL", "postgres://localhost/cq"),
            ("CQ_CONFIG", ""),
        ]
        .into_iter()
        .collect();
        let config = ApiConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.port, 8080);
        assert!(!config.sample_data);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/cq"));
        assert!(config.engine_config.is_none());
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn bad_port_falls_back() {
        let config = ApiConfig::from_lookup(|k| (k == "CQ_PORT").then(|| "http".to_string()));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn engine_config_defaults_without_path() {
        let engine = ApiConfig::default().load_engine_config().unwrap();
        assert_eq!(engine.result_row_limit, 100);
    }
}
