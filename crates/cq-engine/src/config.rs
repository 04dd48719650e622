//! Engine configuration, loadable from TOML. Every field has a default.

use serde::Deserialize;

/// Tunables for classification, extraction, the safety policy and results.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Minimum classifier confidence; anything at or below is `Unknown`.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Upper bound on edit distance for fuzzy column/table matches.
    #[serde(default = "default_max_fuzzy_distance")]
    pub max_fuzzy_distance: usize,
    /// Largest share of a table a single row-deleting plan may remove.
    #[serde(default = "default_max_mutation_fraction")]
    pub max_mutation_fraction: f64,
    /// Absolute cap on rows a destructive plan may touch.
    #[serde(default = "default_max_mutation_rows")]
    pub max_mutation_rows: usize,
    /// Cap on columns rewritten in place by one plan.
    #[serde(default = "default_max_columns_affected")]
    pub max_columns_affected: usize,
    /// How long a plan waits at the confirmation gate.
    #[serde(default = "default_confirmation_ttl")]
    pub confirmation_ttl_secs: u64,
    /// Rows returned by read-only plans.
    #[serde(default = "default_result_row_limit")]
    pub result_row_limit: usize,
    /// Table used when an instruction names none.
    #[serde(default)]
    pub default_table: Option<String>,
}

fn default_confidence_threshold() -> f64 {
    0.35
}

fn default_max_fuzzy_distance() -> usize {
    2
}

fn default_max_mutation_fraction() -> f64 {
    0.5
}

fn default_max_mutation_rows() -> usize {
    10_000
}

fn default_max_columns_affected() -> usize {
    1
}

fn default_confirmation_ttl() -> u64 {
    300
}

fn default_result_row_limit() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_fuzzy_distance: default_max_fuzzy_distance(),
            max_mutation_fraction: default_max_mutation_fraction(),
            max_mutation_rows: default_max_mutation_rows(),
            max_columns_affected: default_max_columns_affected(),
            confirmation_ttl_secs: default_confirmation_ttl(),
            result_row_limit: default_result_row_limit(),
            default_table: None,
        }
    }
}

impl EngineConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.confidence_threshold, 0.35);
        assert_eq!(config.max_fuzzy_distance, 2);
        assert_eq!(config.max_mutation_rows, 10_000);
        assert_eq!(config.max_columns_affected, 1);
        assert_eq!(config.confirmation_ttl_secs, 300);
        assert_eq!(config.result_row_limit, 100);
        assert!(config.default_table.is_none());
    }

    #[test]
    fn partial_override() {
        let config: EngineConfig = toml::from_str(
            r#"
confidence_threshold = 0.5
default_table = "patients"
max_mutation_fraction = 0.25
"#,
        )
        .unwrap();
        assert_eq!(config.confidence_threshold, 0.5);
        assert_eq!(config.default_table.as_deref(), Some("patients"));
        assert_eq!(config.max_mutation_fraction, 0.25);
        assert_eq!(config.result_row_limit, 100);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(EngineConfig::from_file("/nonexistent/engine.toml").is_err());
    }
}
