//! Pipeline configuration.
//!
//! Combiner weights and risk thresholds are explicit, testable
//! parameters loaded from the data/ directory, never constants buried
//! in the scoring code. In tests, use `PipelineConfig::default_test()`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinerWeights {
    pub ml_weight: f64,
    pub rule_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Final scores below this are safe; at or above, suspicious.
    pub t_low: f64,
    /// Final scores at or above this are fraudulent.
    pub t_high: f64,
}

impl RiskThresholds {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.t_low) || !(0.0..=1.0).contains(&self.t_high) {
            anyhow::bail!(
                "risk thresholds must lie in [0, 1], got t_low={} t_high={}",
                self.t_low,
                self.t_high
            );
        }
        if self.t_low >= self.t_high {
            anyhow::bail!(
                "t_low must be strictly below t_high, got t_low={} t_high={}",
                self.t_low,
                self.t_high
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    pub high_amount_threshold: f64,
    pub high_amount_weight: f64,
    /// Night window, wrapping midnight when start > end (e.g. 22..6).
    pub night_start_hour: u32,
    pub night_end_hour: u32,
    pub night_weight: f64,
    pub new_device_weight: f64,
    pub location_mismatch_weight: f64,
    /// Lookback window for the history aggregates feeding the velocity
    /// rule and the feature extractor.
    pub velocity_window_minutes: i64,
    pub velocity_max_txns: i64,
    pub velocity_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub worker_count: usize,
    /// Delivery attempts per job before the transaction is finalized as
    /// evaluation_failed.
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub poll_timeout_ms: u64,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub combiner: CombinerWeights,
    pub thresholds: RiskThresholds,
    pub rules: RulesConfig,
    pub runtime: RuntimeConfig,
    /// Path of the model artifact; defaults to
    /// `{data_dir}/model/fraud_model.json` when absent from the file.
    #[serde(default)]
    pub model_path: String,
}

impl PipelineConfig {
    /// Load from the data/ directory.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/pipeline/pipeline_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let mut config: PipelineConfig = serde_json::from_str(&content)?;
        config.thresholds.validate()?;
        if config.combiner.ml_weight < 0.0 || config.combiner.rule_weight < 0.0 {
            anyhow::bail!("combiner weights must be non-negative");
        }
        if config.model_path.is_empty() {
            config.model_path = format!("{data_dir}/model/fraud_model.json");
        }
        Ok(config)
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        Self {
            combiner: CombinerWeights {
                ml_weight: 0.7,
                rule_weight: 0.3,
            },
            thresholds: RiskThresholds {
                t_low: 0.3,
                t_high: 0.7,
            },
            rules: RulesConfig {
                high_amount_threshold: 50_000.0,
                high_amount_weight: 0.375,
                night_start_hour: 22,
                night_end_hour: 6,
                night_weight: 0.125,
                new_device_weight: 0.25,
                location_mismatch_weight: 0.25,
                velocity_window_minutes: 60,
                velocity_max_txns: 10,
                velocity_weight: 0.25,
            },
            runtime: RuntimeConfig {
                worker_count: 2,
                max_attempts: 3,
                retry_base_delay_ms: 10,
                retry_max_delay_ms: 80,
                poll_timeout_ms: 25,
                cache_ttl_secs: 600,
            },
            model_path: String::new(),
        }
    }
}
