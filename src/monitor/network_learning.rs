//! Learned weekly traffic budget for the `bytes_sent` / `bytes_recv` metrics.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{NetworkLearning, Thresholds};

use super::provider::{BYTES_RECV, BYTES_SENT};

pub const NETWORK_LEARNING_FILE: &str = "network_usage_learning.jsonl";
const LEARNING_DAYS: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NetworkUsageLearner {
    path: PathBuf,
    enabled: bool,
    margin: f64,
    default_limit_bytes: u64,
}

impl NetworkUsageLearner {
    pub fn new(cache_dir: &Path, settings: &NetworkLearning) -> Self {
        Self {
            path: cache_dir.join(NETWORK_LEARNING_FILE),
            enabled: settings.enabled,
            margin: settings.margin,
            default_limit_bytes: settings.default_limit_bytes,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stores today's counters, replacing any earlier entry for the same date.
    pub fn record_daily_usage(
        &self,
        bytes_sent: u64,
        bytes_recv: u64,
        today: NaiveDate,
    ) -> Result<(), std::io::Error> {
        let mut entries = self
            .load()
            .into_iter()
            .filter(|entry| entry.date != today)
            .collect::<Vec<_>>();
        entries.push(DailyUsage {
            bytes_sent,
            bytes_recv,
            date: today,
            timestamp: Utc::now(),
        });

        let mut content = String::new();
        for entry in &entries {
            content.push_str(&serde_json::to_string(entry).map_err(std::io::Error::other)?);
            content.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("jsonl.tmp");
        fs::write(&staging, content)?;
        fs::rename(&staging, &self.path)
    }

    /// Sum of the seven newest days plus the margin, or the default with no history.
    pub fn weekly_limit(&self) -> u64 {
        let mut entries = self.load();
        if entries.is_empty() {
            return self.default_limit_bytes;
        }

        entries.sort_by(|left, right| right.date.cmp(&left.date));
        let total = entries
            .iter()
            .take(LEARNING_DAYS)
            .map(|entry| entry.bytes_sent.saturating_add(entry.bytes_recv))
            .fold(0u64, u64::saturating_add);

        (total as f64 * (1.0 + self.margin)).round() as u64
    }

    /// Replaces the traffic `critical` limits with the learned one when it stays above `warning`.
    pub fn apply_to(&self, thresholds: &mut Thresholds) -> Option<u64> {
        if !self.enabled {
            return None;
        }

        let limit = self.weekly_limit();
        let mut applied = false;
        for metric in [BYTES_SENT, BYTES_RECV] {
            if let Some(spec) = thresholds.get_mut(metric)
                && (limit as f64) > spec.warning
            {
                spec.critical = limit as f64;
                applied = true;
            }
        }
        applied.then_some(limit)
    }

    fn load(&self) -> Vec<DailyUsage> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        content
            .lines()
            .filter_map(|line| serde_json::from_str::<DailyUsage>(line).ok())
            .collect()
    }
}
