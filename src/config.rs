use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_TREND_MONTHS: usize = 6;

const ENV_DEBOUNCE_MS: &str = "BUDGET_REPORT_DEBOUNCE_MS";
const ENV_MAX_CONCURRENCY: &str = "BUDGET_REPORT_MAX_CONCURRENCY";
const ENV_TREND_MONTHS: &str = "BUDGET_REPORT_TREND_MONTHS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Quiet interval a period must see before its global report is rebuilt.
    #[serde(rename = "debounce_delay_ms", with = "duration_millis")]
    pub debounce_delay: Duration,

    /// Upper bound on per-department aggregations in flight during one run.
    pub max_concurrency: usize,

    /// Months shown in dashboard trends.
    pub trend_months: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_delay: DEFAULT_DEBOUNCE_DELAY,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            trend_months: DEFAULT_TREND_MONTHS,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn with_debounce_delay(mut self, delay: Duration) -> Self {
        self.debounce_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    #[must_use]
    pub fn with_trend_months(mut self, trend_months: usize) -> Self {
        self.trend_months = trend_months;
        self
    }

    /// Defaults overridden by any of `BUDGET_REPORT_DEBOUNCE_MS`,
    /// `BUDGET_REPORT_MAX_CONCURRENCY` and `BUDGET_REPORT_TREND_MONTHS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DEBOUNCE_MS) {
            config.debounce_delay = Duration::from_millis(parse_var(ENV_DEBOUNCE_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_MAX_CONCURRENCY) {
            config.max_concurrency = parse_var(ENV_MAX_CONCURRENCY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TREND_MONTHS) {
            config.trend_months = parse_var(ENV_TREND_MONTHS, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(PipelineError::Validation(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.trend_months == 0 {
            return Err(PipelineError::Validation(
                "trend_months must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| PipelineError::Validation(format!("{} has invalid value '{}'", key, raw)))
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.debounce_delay, Duration::from_secs(5));
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.trend_months, 6);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BUDGET_REPORT_DEBOUNCE_MS", "250"),
            ("BUDGET_REPORT_TREND_MONTHS", "12"),
        ]
        .into_iter()
        .collect();

        let config = PipelineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.debounce_delay, Duration::from_millis(250));
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.trend_months, 12);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = PipelineConfig::from_lookup(|k| {
            (k == "BUDGET_REPORT_MAX_CONCURRENCY").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(err.is_validation());

        let err = PipelineConfig::from_lookup(|k| {
            (k == "BUDGET_REPORT_MAX_CONCURRENCY").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: PipelineConfig = serde_json::from_str(r#"{"debounce_delay_ms": 100}"#).unwrap();
        assert_eq!(config.debounce_delay, Duration::from_millis(100));
        assert_eq!(config.trend_months, DEFAULT_TREND_MONTHS);
    }
}
