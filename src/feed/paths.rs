use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::config::Persistence;

pub(crate) const POST_TREATMENT_HISTORY_FILE: &str = "post_treatment_history.jsonl";
pub(crate) const HUMAN_LOG_FILE: &str = "monitoring.log";

#[derive(Debug, Clone)]
pub(crate) struct FeedPaths {
    pub(crate) json_dir: PathBuf,
    pub(crate) human_dir: PathBuf,
    pub(crate) cache_dir: PathBuf,
}

impl FeedPaths {
    pub(crate) fn primary(persistence: &Persistence) -> Self {
        let root = PathBuf::from(&persistence.root);
        Self {
            json_dir: root.join("json"),
            human_dir: root.join("human"),
            cache_dir: PathBuf::from(&persistence.cache_dir),
        }
    }

    /// Layout used under an alternate root: everything, cache included, lives below it.
    pub(crate) fn under(root: &Path) -> Self {
        Self {
            json_dir: root.join("json"),
            human_dir: root.join("human"),
            cache_dir: root.join("cache"),
        }
    }

    pub(crate) fn monitoring_file(&self, date: NaiveDate) -> PathBuf {
        self.json_dir
            .join(format!("monitoring-{}.jsonl", date.format("%Y-%m-%d")))
    }

    pub(crate) fn history_file(&self) -> PathBuf {
        self.cache_dir.join(POST_TREATMENT_HISTORY_FILE)
    }

    pub(crate) fn human_log(&self) -> PathBuf {
        self.human_dir.join(HUMAN_LOG_FILE)
    }
}

pub(crate) fn ensure_dir(path: &Path) -> Result<(), std::io::Error> {
    fs::create_dir_all(path)
}
