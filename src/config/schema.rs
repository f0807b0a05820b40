use std::collections::BTreeMap;

use serde::Deserialize;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval: u64,
    #[serde(default = "default_thresholds")]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub treatment: TreatmentPolicy,
    #[serde(default)]
    pub metric_cache: MetricCacheConfig,
    #[serde(default)]
    pub persistence: Persistence,
    #[serde(default)]
    pub network_learning: NetworkLearning,
    #[serde(default)]
    pub simulation: Simulation,
}

/// Per-metric alert limits, keyed by metric name.
pub type Thresholds = BTreeMap<String, ThresholdSpec>;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ThresholdSpec {
    #[serde(alias = "alert")]
    pub warning: f64,
    #[serde(alias = "critic")]
    pub critical: f64,
}

impl ThresholdSpec {
    pub const fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }
}

/// The part of the configuration that hot reload is allowed to swap.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub monitor_interval: u64,
    pub thresholds: Thresholds,
    pub treatment: TreatmentPolicy,
}

impl RuntimeConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            monitor_interval: config.monitor_interval,
            thresholds: config.thresholds.clone(),
            treatment: config.treatment.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreatmentPolicy {
    #[serde(default = "default_sustained_critic_seconds", alias = "sustained_crit_seconds")]
    pub sustained_critic_seconds: u64,
    #[serde(default = "default_min_critical_alerts")]
    pub min_critical_alerts: usize,
    #[serde(default = "default_cleanup_temp_age_days")]
    pub cleanup_temp_age_days: u32,
    #[serde(default = "default_post_treatment_wait_seconds")]
    pub post_treatment_wait_seconds: u64,
    #[serde(default)]
    pub opportunistic_maintenance: bool,
    #[serde(default = "default_disk_check_threshold_percent")]
    pub disk_check_threshold_percent: f64,
    #[serde(default = "default_cooldowns", deserialize_with = "merge_cooldowns")]
    pub cooldowns: BTreeMap<String, u64>,
    /// Finish scheduled verifications on shutdown instead of dropping them.
    #[serde(default = "default_drain_on_shutdown")]
    pub drain_on_shutdown: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricCacheConfig {
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Persistence {
    #[serde(default = "default_persistence_root")]
    pub root: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default)]
    pub fallback_root: Option<String>,
    #[serde(default = "default_lock_retry_attempts")]
    pub lock_retry_attempts: u32,
    #[serde(default = "default_lock_retry_delay_ms")]
    pub lock_retry_delay_ms: u64,
    #[serde(default = "default_durable_writes")]
    pub durable_writes: bool,
    #[serde(default = "default_human_readable")]
    pub human_readable: bool,
    #[serde(default = "default_human_log_max_bytes")]
    pub human_log_max_bytes: u64,
    #[serde(default = "default_human_log_keep")]
    pub human_log_keep: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkLearning {
    #[serde(default = "default_network_learning_enabled")]
    pub enabled: bool,
    #[serde(default = "default_network_learning_margin")]
    pub margin: f64,
    #[serde(default = "default_network_learning_limit_bytes")]
    pub default_limit_bytes: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Simulation {
    #[serde(default)]
    pub enabled: bool,
}
