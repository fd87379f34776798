//! Pipeline configuration (TOML), with a content hash for run reports.
//!
//! Every section is optional; missing fields take their defaults:
//!
//! ```toml
//! [features]
//! rsi_period = 14
//!
//! [scoring]
//! blend_short = 0.6
//! blend_medium = 0.4
//!
//! [policy]
//! type = "HYBRID"
//! bb_compression_ratio = 0.8
//!
//! [horizons]
//! short = 5
//! medium = 20
//!
//! [evaluation]
//! success_window_days = 365
//! capital = 100000.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use vesign_core::{BlendWeights, FeatureConfig, Horizons, RulePolicy};

/// Upper bound on `success_window_days` (about a century).
pub const MAX_SUCCESS_WINDOW_DAYS: u32 = 36_500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Evaluation settings for the success-rate report and capital split.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Only signals this many days before the as-of date feed the
    /// success-rate pairing. `None` uses the full history.
    pub success_window_days: Option<u32>,
    /// Capital to split across the latest day's allocation.
    pub capital: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    pub scoring: BlendWeights,
    pub policy: RulePolicy,
    pub horizons: Horizons,
    pub evaluation: EvaluationConfig,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.features
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.policy
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !(self.scoring.blend_short.is_finite() && self.scoring.blend_medium.is_finite()) {
            return Err(ConfigError::Invalid("blend weights must be finite".into()));
        }
        if self.horizons.short == 0 || self.horizons.medium == 0 {
            return Err(ConfigError::Invalid("horizons must be >= 1 bar".into()));
        }
        if let Some(days) = self.evaluation.success_window_days {
            if days > MAX_SUCCESS_WINDOW_DAYS {
                return Err(ConfigError::Invalid(format!(
                    "success_window_days must be <= {MAX_SUCCESS_WINDOW_DAYS}"
                )));
            }
        }
        if let Some(capital) = self.evaluation.capital {
            if !(capital.is_finite() && capital > 0.0) {
                return Err(ConfigError::Invalid("capital must be positive".into()));
            }
        }
        Ok(())
    }

    /// Deterministic BLAKE3 hash of the canonical JSON form.
    ///
    /// Two runs with identical configs share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).expect("PipelineConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesign_core::signals::{HybridParams, ThresholdParams};

    #[test]
    fn empty_toml_is_all_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.features.rsi_period, 14);
        assert_eq!(config.scoring.blend_short, 0.6);
        assert_eq!(config.horizons.medium, 20);
        assert_eq!(config.policy, RulePolicy::Hybrid(HybridParams::default()));
    }

    #[test]
    fn sections_override_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [features]
            trend_lookback = 10

            [policy]
            type = "THRESHOLD_REGRESSION"
            buy_threshold = 0.01
            sell_threshold = 0.02

            [evaluation]
            success_window_days = 365
            capital = 50000.0
            "#,
        )
        .unwrap();
        assert_eq!(config.features.trend_lookback, 10);
        assert_eq!(config.features.rsi_period, 14);
        assert_eq!(
            config.policy,
            RulePolicy::ThresholdRegression(ThresholdParams {
                buy_threshold: 0.01,
                sell_threshold: 0.02,
                ..ThresholdParams::default()
            })
        );
        assert_eq!(config.evaluation.success_window_days, Some(365));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = PipelineConfig::from_toml("[features]\nmacd_fast = 40\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = PipelineConfig::from_toml("[horizons]\nshort = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = PipelineConfig::from_toml("[policy]\ntype = \"MOMENTUM\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn success_window_is_bounded() {
        let err = PipelineConfig::from_toml("[evaluation]\nsuccess_window_days = 200000000\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config =
            PipelineConfig::from_toml("[evaluation]\nsuccess_window_days = 36500\n").unwrap();
        assert_eq!(config.evaluation.success_window_days, Some(MAX_SUCCESS_WINDOW_DAYS));
    }

    #[test]
    fn fingerprint_is_deterministic_and_sensitive() {
        let a = PipelineConfig::default();
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.scoring.blend_short = 0.7;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = PipelineConfig::default();
        config.evaluation.capital = Some(250_000.0);
        let text = config.to_toml().unwrap();
        assert_eq!(PipelineConfig::from_toml(&text).unwrap(), config);
    }
}
