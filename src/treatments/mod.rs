mod actions;
mod orchestrator;
mod routes;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::system::CommandError;

pub use actions::SystemTreatments;
pub use orchestrator::{TreatmentDecision, TreatmentOrchestrator};

#[cfg(test)]
pub(crate) use orchestrator::RecordingExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TreatmentAction {
    CleanupTempFiles,
    CheckDiskUsage,
    TrimProcessWorkingSet,
    ReapZombieProcesses,
    ReapplyNetworkConfig,
}

impl TreatmentAction {
    pub const ALL: [TreatmentAction; 5] = [
        TreatmentAction::CleanupTempFiles,
        TreatmentAction::CheckDiskUsage,
        TreatmentAction::TrimProcessWorkingSet,
        TreatmentAction::ReapZombieProcesses,
        TreatmentAction::ReapplyNetworkConfig,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TreatmentAction::CleanupTempFiles => "cleanup_temp_files",
            TreatmentAction::CheckDiskUsage => "check_disk_usage",
            TreatmentAction::TrimProcessWorkingSet => "trim_process_working_set",
            TreatmentAction::ReapZombieProcesses => "reap_zombie_processes",
            TreatmentAction::ReapplyNetworkConfig => "reapply_network_config",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == name.trim())
    }
}

impl fmt::Display for TreatmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs an action takes from the treatment policy rather than from the alert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionParams {
    pub cleanup_temp_age_days: u32,
    pub disk_check_threshold_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub detail: String,
}

impl ActionOutcome {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TreatmentError {
    #[error("{action} is not supported on this platform: {reason}")]
    Unsupported {
        action: TreatmentAction,
        reason: String,
    },
    #[error("treatment io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("treatment failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait TreatmentExecutor: Send + Sync {
    async fn execute(
        &self,
        action: TreatmentAction,
        params: &ActionParams,
    ) -> Result<ActionOutcome, TreatmentError>;
}
