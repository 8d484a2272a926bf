use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{default_relevance_keywords, default_rules, Category, CategoryRule, ScoringWeights};

/// Upper bound accepted for `quality_threshold`.
const MAX_THRESHOLD: f64 = 1000.0;
/// Upper bound accepted for `min_request_delay_ms`.
const MAX_DELAY_MS: u64 = 60_000;
/// Upper bound accepted for `request_timeout_s`.
const MAX_TIMEOUT_S: f64 = 600.0;

/// Read-only configuration injected into one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub quality_threshold: f64,
    pub min_request_delay_ms: u64,
    /// Total GET attempts per URL, including the first.
    pub max_retry_attempts: u32,
    pub request_timeout_s: f64,
    /// Pages with fewer body words fail extraction with `EmptyContent`.
    pub min_word_count: u32,
    pub relevance_keywords: Vec<String>,
    pub scoring_weights: ScoringWeights,
    pub category_rules: Vec<CategoryRule>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 100.0,
            min_request_delay_ms: 2_000,
            max_retry_attempts: 3,
            request_timeout_s: 30.0,
            min_word_count: 50,
            relevance_keywords: default_relevance_keywords(),
            scoring_weights: ScoringWeights::default(),
            category_rules: default_rules(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("quality threshold must be a finite number in 0..=1000, got {0}")]
    InvalidThreshold(f64),
    #[error("request delay must be at most 60000 ms, got {0}")]
    DelayOutOfRange(u64),
    #[error("max retry attempts must be at least 1")]
    NoAttempts,
    #[error("request timeout must be in (0, 600] seconds, got {0}")]
    InvalidTimeout(f64),
    #[error("scoring weight {name} must be finite and non-negative, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },
    #[error("scoring weight words_per_point must be positive")]
    ZeroWordsPerPoint,
    #[error("category rule for {0} has neither url patterns nor keywords")]
    EmptyRule(Category),
}

impl GeneratorConfig {
    /// Contract check run before any network activity; any error aborts the batch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.quality_threshold;
        if !threshold.is_finite() || !(0.0..=MAX_THRESHOLD).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        if self.min_request_delay_ms > MAX_DELAY_MS {
            return Err(ConfigError::DelayOutOfRange(self.min_request_delay_ms));
        }
        if self.max_retry_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        let timeout = self.request_timeout_s;
        if !timeout.is_finite() || timeout <= 0.0 || timeout > MAX_TIMEOUT_S {
            return Err(ConfigError::InvalidTimeout(self.request_timeout_s));
        }
        for (name, value) in self.scoring_weights.entries() {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }
        if self.scoring_weights.words_per_point == 0.0 {
            return Err(ConfigError::ZeroWordsPerPoint);
        }
        if let Some(rule) = self
            .category_rules
            .iter()
            .find(|rule| rule.url_patterns.is_empty() && rule.keywords.is_empty())
        {
            return Err(ConfigError::EmptyRule(rule.category));
        }
        Ok(())
    }

    /// Only meaningful after [`GeneratorConfig::validate`] succeeded; out-of-range
    /// values fall back to the default.
    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout_s)
            .unwrap_or_else(|_| Duration::from_secs(30))
    }

    pub fn min_request_delay(&self) -> Duration {
        Duration::from_millis(self.min_request_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GeneratorConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.min_request_delay(), Duration::from_secs(2));
    }

    #[test]
    fn huge_timeout_is_rejected_and_never_panics() {
        let config = GeneratorConfig {
            request_timeout_s: 1e300,
            ..GeneratorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidTimeout(1e300)));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));

        let longest = GeneratorConfig {
            request_timeout_s: 600.0,
            ..GeneratorConfig::default()
        };
        assert_eq!(longest.validate(), Ok(()));
        assert_eq!(longest.request_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn contract_violations_are_reported() {
        let cases = [
            (
                GeneratorConfig {
                    quality_threshold: f64::NAN,
                    ..GeneratorConfig::default()
                },
                "threshold",
            ),
            (
                GeneratorConfig {
                    quality_threshold: -1.0,
                    ..GeneratorConfig::default()
                },
                "threshold",
            ),
            (
                GeneratorConfig {
                    max_retry_attempts: 0,
                    ..GeneratorConfig::default()
                },
                "attempts",
            ),
            (
                GeneratorConfig {
                    request_timeout_s: 0.0,
                    ..GeneratorConfig::default()
                },
                "timeout",
            ),
            (
                GeneratorConfig {
                    request_timeout_s: 1e300,
                    ..GeneratorConfig::default()
                },
                "timeout",
            ),
            (
                GeneratorConfig {
                    min_request_delay_ms: 120_000,
                    ..GeneratorConfig::default()
                },
                "delay",
            ),
        ];
        for (config, needle) in cases {
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(needle), "{err}");
        }
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut config = GeneratorConfig::default();
        config.scoring_weights.per_table = -5.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidWeight {
                name: "per_table",
                value: -5.0
            })
        );
    }

    #[test]
    fn partial_json_is_merged_with_defaults() {
        let config: GeneratorConfig =
            serde_json::from_str(r#"{"quality_threshold": 150, "min_request_delay_ms": 500}"#)
                .unwrap();
        assert_eq!(config.quality_threshold, 150.0);
        assert_eq!(config.min_request_delay_ms, 500);
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.category_rules, default_rules());
    }
}
