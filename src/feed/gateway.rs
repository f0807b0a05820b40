use std::fmt::Debug;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::config::Persistence;
use crate::monitor::{HealthState, POST_TREATMENT_HISTORY_CAPACITY, PostTreatmentRecord, Snapshot};

use super::model::{FeedLevel, FeedLine, PersistError, PersistTier};
use super::paths::FeedPaths;
use super::read::tail_records;
use super::write::{
    LockPolicy, append_bounded_json_line, append_human_line, append_json_line, append_raw_text,
};

pub const FALLBACK_ROOT_ENV: &str = "HOSTWATCH_FALLBACK_ROOT";
const RAW_TEXT_FILE: &str = "feed-fallback.log";
const MONITORING_MSG: &str = "monitoring";
const POST_TREATMENT_MSG: &str = "post_treatment";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedKind {
    Monitoring,
    PostTreatment,
}

/// One file a record lands in. A tier only retries the targets earlier tiers missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedTarget {
    History,
    MonitoringFeed,
}

impl FeedKind {
    /// History goes first so a feed line is never written twice for one record.
    fn targets(self) -> Vec<FeedTarget> {
        match self {
            FeedKind::Monitoring => vec![FeedTarget::MonitoringFeed],
            FeedKind::PostTreatment => vec![FeedTarget::History, FeedTarget::MonitoringFeed],
        }
    }
}

/// Durable sink for snapshots and post-treatment records.
///
/// Writes go to the primary root, then to the alternate root, then to a raw
/// text file. Every tier failure is logged and swallowed; callers only learn
/// which tier took the write.
#[derive(Debug, Clone)]
pub struct FeedGateway {
    primary_root: PathBuf,
    primary: FeedPaths,
    fallback_root: Option<PathBuf>,
    lock: LockPolicy,
    human_readable: bool,
    human_log_max_bytes: u64,
    human_log_keep: u16,
    history_capacity: usize,
}

impl FeedGateway {
    pub fn from_config(persistence: &Persistence) -> Self {
        let fallback_root = std::env::var(FALLBACK_ROOT_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| persistence.fallback_root.clone())
            .map(PathBuf::from);
        Self::with_fallback(persistence, fallback_root)
    }

    pub(crate) fn with_fallback(persistence: &Persistence, fallback_root: Option<PathBuf>) -> Self {
        Self {
            primary_root: PathBuf::from(&persistence.root),
            primary: FeedPaths::primary(persistence),
            fallback_root,
            lock: LockPolicy::from_config(persistence),
            human_readable: persistence.human_readable,
            human_log_max_bytes: persistence.human_log_max_bytes,
            human_log_keep: persistence.human_log_keep,
            history_capacity: POST_TREATMENT_HISTORY_CAPACITY,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.primary.cache_dir
    }

    pub fn fallback_root(&self) -> Option<&Path> {
        self.fallback_root.as_deref()
    }

    pub fn persist_snapshot(&self, snapshot: &Snapshot) -> PersistTier {
        let level = match snapshot.state {
            HealthState::Stable => FeedLevel::Info,
            HealthState::Warning => FeedLevel::Warning,
            HealthState::Critical | HealthState::PostTreatment => FeedLevel::Error,
        };
        let human = format!("state={} {}", snapshot.state, snapshot.summary_short);
        self.persist(FeedKind::Monitoring, level, MONITORING_MSG, snapshot, human)
    }

    pub fn persist_post_treatment(&self, record: &PostTreatmentRecord) -> PersistTier {
        let level = if record.alerts.iter().any(|alert| alert.is_critical()) {
            FeedLevel::Warning
        } else {
            FeedLevel::Info
        };
        let human = format!(
            "actions={} remaining_alerts={}",
            record.actions.join(","),
            record.alerts.len()
        );
        self.persist(FeedKind::PostTreatment, level, POST_TREATMENT_MSG, record, human)
    }

    /// Post-treatment records kept in the primary cache file, oldest first.
    pub fn load_post_treatment_history(&self) -> Vec<PostTreatmentRecord> {
        tail_records(&self.primary.history_file(), self.history_capacity)
    }

    /// Newest-first entries of the primary monitoring feed.
    #[cfg(test)]
    pub fn recent_entries<T: serde::de::DeserializeOwned>(&self, limit: usize) -> Vec<T> {
        super::read::recent_entries(&self.primary.json_dir, limit)
    }

    fn persist<T: Serialize + Debug>(
        &self,
        kind: FeedKind,
        level: FeedLevel,
        msg: &str,
        body: &T,
        human: String,
    ) -> PersistTier {
        let now = Utc::now();
        let line = FeedLine {
            ts: now.to_rfc3339(),
            level,
            msg,
            body,
        };
        let date = now.date_naive();
        let mut pending = kind.targets();

        match self.write_pending(&self.primary, &mut pending, &line, date) {
            Ok(()) => {
                self.write_human(&line.ts, level, msg, &human);
                return PersistTier::Primary;
            }
            Err(error) => {
                log::warn!("feed_primary_failed msg={} error={}", msg, error);
            }
        }

        let retried = pending.len();
        let fallback = match &self.fallback_root {
            Some(root) => self.write_pending(&FeedPaths::under(root), &mut pending, &line, date),
            None => Err(PersistError::NoFallback),
        };
        match fallback {
            Ok(()) => {
                log::warn!(
                    "feed_fallback_used msg={} targets={} root={}",
                    msg,
                    retried,
                    self.fallback_root
                        .as_deref()
                        .map(|root| root.display().to_string())
                        .unwrap_or_default()
                );
                return PersistTier::Fallback;
            }
            Err(error) => {
                log::warn!("feed_fallback_failed msg={} error={}", msg, error);
            }
        }

        let raw = format!("{} {} {} {:?}", line.ts, level.as_str(), msg, body);
        for dir in self.raw_text_dirs() {
            let path = dir.join(RAW_TEXT_FILE);
            match append_raw_text(&path, &raw) {
                Ok(()) => {
                    log::warn!("feed_raw_text_used msg={} path={}", msg, path.display());
                    return PersistTier::RawText;
                }
                Err(error) => {
                    log::warn!("feed_raw_text_failed msg={} error={}", msg, error);
                }
            }
        }

        log::error!("feed_write_dropped msg={}", msg);
        PersistTier::Dropped
    }

    /// Writes each pending target in order and drops it from `pending` once it lands.
    fn write_pending<T: Serialize>(
        &self,
        paths: &FeedPaths,
        pending: &mut Vec<FeedTarget>,
        line: &FeedLine<'_, T>,
        date: NaiveDate,
    ) -> Result<(), PersistError> {
        while let Some(&target) = pending.first() {
            match target {
                FeedTarget::History => append_bounded_json_line(
                    &paths.history_file(),
                    line,
                    self.history_capacity,
                    self.lock,
                )?,
                FeedTarget::MonitoringFeed => {
                    append_json_line(&paths.monitoring_file(date), line, self.lock)?
                }
            }
            pending.remove(0);
        }
        Ok(())
    }

    fn write_human(&self, ts: &str, level: FeedLevel, msg: &str, text: &str) {
        if !self.human_readable {
            return;
        }
        let line = format!("{} [{}] {} {}", ts, level.as_str(), msg, text);
        if let Err(error) = append_human_line(
            &self.primary.human_log(),
            &line,
            self.human_log_max_bytes,
            self.human_log_keep,
        ) {
            log::warn!("feed_human_log_failed error={}", error);
        }
    }

    fn raw_text_dirs(&self) -> Vec<&Path> {
        let mut dirs = Vec::with_capacity(2);
        if let Some(root) = &self.fallback_root {
            dirs.push(root.as_path());
        }
        dirs.push(self.primary_root.as_path());
        dirs
    }
}
