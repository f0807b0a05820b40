use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedLevel {
    Info,
    Warning,
    Error,
}

impl FeedLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedLevel::Info => "INFO",
            FeedLevel::Warning => "WARNING",
            FeedLevel::Error => "ERROR",
        }
    }
}

/// One JSON line of the monitoring feed: envelope fields plus the flattened body.
#[derive(Debug, Serialize)]
pub(crate) struct FeedLine<'a, T: Serialize> {
    pub(crate) ts: String,
    pub(crate) level: FeedLevel,
    pub(crate) msg: &'a str,
    #[serde(flatten)]
    pub(crate) body: &'a T,
}

/// Which tier finally accepted a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistTier {
    Primary,
    Fallback,
    RawText,
    Dropped,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to serialize feed entry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("lock on {path} not acquired after {attempts} attempts")]
    LockTimeout { path: String, attempts: u32 },
    #[error("no fallback root configured")]
    NoFallback,
}

impl PersistError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        PersistError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
