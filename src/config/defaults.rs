use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

use super::schema::{
    MetricCacheConfig, NetworkLearning, Persistence, ThresholdSpec, Thresholds, TreatmentPolicy,
};

pub(super) fn default_monitor_interval() -> u64 {
    30
}

pub(super) fn default_thresholds() -> Thresholds {
    [
        ("cpu_percent", ThresholdSpec::new(75.0, 90.0)),
        ("memory_percent", ThresholdSpec::new(75.0, 90.0)),
        ("disk_percent", ThresholdSpec::new(80.0, 95.0)),
        ("network_loss_percent", ThresholdSpec::new(2.0, 5.0)),
        ("network_latency_ms", ThresholdSpec::new(100.0, 250.0)),
        ("ping_ms", ThresholdSpec::new(100.0, 500.0)),
        ("temperature_celsius", ThresholdSpec::new(70.0, 85.0)),
    ]
    .into_iter()
    .map(|(name, spec)| (name.to_string(), spec))
    .collect()
}

pub(super) fn default_sustained_critic_seconds() -> u64 {
    5 * 60
}

pub(super) fn default_min_critical_alerts() -> usize {
    1
}

pub(super) fn default_cleanup_temp_age_days() -> u32 {
    7
}

pub(super) fn default_post_treatment_wait_seconds() -> u64 {
    10
}

pub(super) fn default_drain_on_shutdown() -> bool {
    true
}

pub(super) fn default_disk_check_threshold_percent() -> f64 {
    90.0
}

const DEFAULT_COOLDOWNS: [(&str, u64); 5] = [
    ("cleanup_temp_files", 3 * 24 * 3600),
    ("check_disk_usage", 24 * 3600),
    ("trim_process_working_set", 60 * 60),
    ("reap_zombie_processes", 60 * 60),
    ("reapply_network_config", 30 * 60),
];

pub(super) fn default_cooldowns() -> BTreeMap<String, u64> {
    DEFAULT_COOLDOWNS
        .into_iter()
        .map(|(name, secs)| (name.to_string(), secs))
        .collect()
}

/// Built-in cooldown for one action, 0 for names outside the action table.
pub fn default_cooldown_secs(action: &str) -> u64 {
    DEFAULT_COOLDOWNS
        .iter()
        .find(|(name, _)| *name == action)
        .map(|(_, secs)| *secs)
        .unwrap_or(0)
}

/// A partial `[treatment.cooldowns]` table overrides only the actions it names.
pub(super) fn merge_cooldowns<'de, D>(deserializer: D) -> Result<BTreeMap<String, u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<String, u64>::deserialize(deserializer)?;
    let mut cooldowns = default_cooldowns();
    cooldowns.extend(overrides);
    Ok(cooldowns)
}

pub(super) fn default_staleness_secs() -> u64 {
    10
}

pub(super) fn default_persistence_root() -> String {
    "logs".to_string()
}

pub(super) fn default_cache_dir() -> String {
    ".cache".to_string()
}

pub(super) fn default_lock_retry_attempts() -> u32 {
    5
}

pub(super) fn default_lock_retry_delay_ms() -> u64 {
    20
}

pub(super) fn default_durable_writes() -> bool {
    true
}

pub(super) fn default_human_readable() -> bool {
    true
}

pub(super) fn default_human_log_max_bytes() -> u64 {
    10 * 1024 * 1024
}

pub(super) fn default_human_log_keep() -> u16 {
    7
}

pub(super) fn default_network_learning_enabled() -> bool {
    true
}

pub(super) fn default_network_learning_margin() -> f64 {
    0.2
}

pub(super) fn default_network_learning_limit_bytes() -> u64 {
    20 * 1024 * 1024 * 1024
}

impl Default for TreatmentPolicy {
    fn default() -> Self {
        Self {
            sustained_critic_seconds: default_sustained_critic_seconds(),
            min_critical_alerts: default_min_critical_alerts(),
            cleanup_temp_age_days: default_cleanup_temp_age_days(),
            post_treatment_wait_seconds: default_post_treatment_wait_seconds(),
            opportunistic_maintenance: false,
            disk_check_threshold_percent: default_disk_check_threshold_percent(),
            cooldowns: default_cooldowns(),
            drain_on_shutdown: default_drain_on_shutdown(),
        }
    }
}

impl Default for MetricCacheConfig {
    fn default() -> Self {
        Self {
            staleness_secs: default_staleness_secs(),
        }
    }
}

impl Default for Persistence {
    fn default() -> Self {
        Self {
            root: default_persistence_root(),
            cache_dir: default_cache_dir(),
            fallback_root: None,
            lock_retry_attempts: default_lock_retry_attempts(),
            lock_retry_delay_ms: default_lock_retry_delay_ms(),
            durable_writes: default_durable_writes(),
            human_readable: default_human_readable(),
            human_log_max_bytes: default_human_log_max_bytes(),
            human_log_keep: default_human_log_keep(),
        }
    }
}

impl Default for NetworkLearning {
    fn default() -> Self {
        Self {
            enabled: default_network_learning_enabled(),
            margin: default_network_learning_margin(),
            default_limit_bytes: default_network_learning_limit_bytes(),
        }
    }
}
