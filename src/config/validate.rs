use thiserror::Error;

use crate::treatments::TreatmentAction;

use super::schema::{Config, ThresholdSpec, Thresholds, TreatmentPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Validation(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor_interval == 0 {
            return Err(ConfigError::Validation(
                "monitor_interval must be greater than 0".to_string(),
            ));
        }
        validate_thresholds(&self.thresholds)?;
        validate_treatment_policy(&self.treatment)?;

        if self.metric_cache.staleness_secs == 0 {
            return Err(ConfigError::Validation(
                "metric_cache.staleness_secs must be greater than 0".to_string(),
            ));
        }

        if self.persistence.root.trim().is_empty() {
            return Err(ConfigError::Validation(
                "persistence.root must not be empty".to_string(),
            ));
        }
        if self.persistence.cache_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "persistence.cache_dir must not be empty".to_string(),
            ));
        }
        if let Some(fallback) = &self.persistence.fallback_root
            && fallback.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "persistence.fallback_root must not be empty when set".to_string(),
            ));
        }
        if self.persistence.lock_retry_attempts == 0 {
            return Err(ConfigError::Validation(
                "persistence.lock_retry_attempts must be greater than 0".to_string(),
            ));
        }
        if self.persistence.human_log_max_bytes == 0 {
            return Err(ConfigError::Validation(
                "persistence.human_log_max_bytes must be greater than 0".to_string(),
            ));
        }

        if !self.network_learning.margin.is_finite() || self.network_learning.margin < 0.0 {
            return Err(ConfigError::Validation(
                "network_learning.margin must be a non-negative number".to_string(),
            ));
        }
        if self.network_learning.default_limit_bytes == 0 {
            return Err(ConfigError::Validation(
                "network_learning.default_limit_bytes must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_thresholds(thresholds: &Thresholds) -> Result<(), ConfigError> {
    for (metric, spec) in thresholds {
        validate_threshold(metric, spec)?;
    }
    Ok(())
}

fn validate_threshold(metric: &str, spec: &ThresholdSpec) -> Result<(), ConfigError> {
    if metric.trim().is_empty() {
        return Err(ConfigError::Validation(
            "threshold metric names must not be empty".to_string(),
        ));
    }
    if !spec.warning.is_finite() || !spec.critical.is_finite() {
        return Err(ConfigError::Validation(format!(
            "thresholds.{} must use finite numbers",
            metric
        )));
    }
    if spec.warning >= spec.critical {
        return Err(ConfigError::Validation(format!(
            "thresholds.{}.warning ({}) must be lower than critical ({})",
            metric, spec.warning, spec.critical
        )));
    }
    if is_percentage_metric(metric) {
        validate_percentage(&format!("thresholds.{}.warning", metric), spec.warning)?;
        validate_percentage(&format!("thresholds.{}.critical", metric), spec.critical)?;
    }
    Ok(())
}

fn validate_treatment_policy(policy: &TreatmentPolicy) -> Result<(), ConfigError> {
    if policy.min_critical_alerts == 0 {
        return Err(ConfigError::Validation(
            "treatment.min_critical_alerts must be at least 1".to_string(),
        ));
    }
    if policy.cleanup_temp_age_days == 0 {
        return Err(ConfigError::Validation(
            "treatment.cleanup_temp_age_days must be at least 1".to_string(),
        ));
    }
    validate_percentage(
        "treatment.disk_check_threshold_percent",
        policy.disk_check_threshold_percent,
    )?;
    for name in policy.cooldowns.keys() {
        if TreatmentAction::from_name(name).is_none() {
            return Err(ConfigError::Validation(format!(
                "treatment.cooldowns.{} is not a known treatment action",
                name
            )));
        }
    }
    Ok(())
}

fn is_percentage_metric(metric: &str) -> bool {
    metric.ends_with("_percent")
}

fn validate_percentage(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_nan() || !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{} must be between 0 and 100",
            field
        )));
    }
    Ok(())
}
