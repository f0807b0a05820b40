use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use sysinfo::{DiskExt, System, SystemExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::capabilities::Capabilities;
use crate::system::run_cmd;

use super::{ActionOutcome, ActionParams, TreatmentAction, TreatmentError, TreatmentExecutor};

const ONLINE_CHECK_ADDR: ([u8; 4], u16) = ([8, 8, 8, 8], 53);
const ONLINE_TIMEOUT: Duration = Duration::from_secs(2);
const NETWORK_COMMAND_TIMEOUT_SECS: u64 = 10;
const SECS_PER_DAY: u64 = 86_400;

/// Executor backed by the host: temp dir, disks, child processes, network tools.
pub struct SystemTreatments {
    temp_dir: PathBuf,
    capabilities: Capabilities,
}

impl SystemTreatments {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            capabilities,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    async fn reapply_network_config(&self) -> Result<ActionOutcome, TreatmentError> {
        if is_online().await {
            return Ok(ActionOutcome::new("network already online"));
        }

        let candidates = self.capabilities.network_reset_commands();
        if candidates.is_empty() {
            return Err(TreatmentError::Unsupported {
                action: TreatmentAction::ReapplyNetworkConfig,
                reason: "no network reset command installed".to_string(),
            });
        }

        for (command, args) in candidates {
            match run_cmd(command, args, NETWORK_COMMAND_TIMEOUT_SECS).await {
                Ok(output) if output.success() => {
                    log::debug!(
                        "network_reset_command_ran command={} stdout=\"{}\"",
                        command,
                        output.stdout.trim()
                    );
                }
                Ok(output) => {
                    log::warn!(
                        "network_reset_command_nonzero command={} status={} stderr=\"{}\"",
                        command,
                        output.status,
                        output.stderr.trim()
                    );
                }
                Err(error) => {
                    log::debug!("network_reset_command_failed command={} error={}", command, error);
                    continue;
                }
            }

            if is_online().await {
                return Ok(ActionOutcome::new(format!("network restored after {}", command)));
            }
        }

        Err(TreatmentError::Failed(
            "network still offline after every reset command".to_string(),
        ))
    }
}

#[async_trait]
impl TreatmentExecutor for SystemTreatments {
    async fn execute(
        &self,
        action: TreatmentAction,
        params: &ActionParams,
    ) -> Result<ActionOutcome, TreatmentError> {
        match action {
            TreatmentAction::CleanupTempFiles => {
                let temp_dir = self.temp_dir.clone();
                let days = params.cleanup_temp_age_days;
                let removed = tokio::task::spawn_blocking(move || cleanup_temp_dir(&temp_dir, days))
                    .await
                    .map_err(|error| TreatmentError::Failed(error.to_string()))??;
                Ok(ActionOutcome::new(format!(
                    "removed {} entries older than {} days",
                    removed, days
                )))
            }
            TreatmentAction::CheckDiskUsage => {
                let threshold = params.disk_check_threshold_percent;
                let issues = tokio::task::spawn_blocking(move || check_disk_usage(threshold))
                    .await
                    .map_err(|error| TreatmentError::Failed(error.to_string()))?;
                if issues.is_empty() {
                    Ok(ActionOutcome::new(format!("no mount at or above {}%", threshold)))
                } else {
                    Ok(ActionOutcome::new(issues.join("; ")))
                }
            }
            TreatmentAction::TrimProcessWorkingSet => Err(TreatmentError::Unsupported {
                action,
                reason: "working set trimming needs the Windows process API".to_string(),
            }),
            TreatmentAction::ReapZombieProcesses => {
                if !self.capabilities.can_reap_children {
                    return Err(TreatmentError::Unsupported {
                        action,
                        reason: "child reaping requires POSIX waitpid".to_string(),
                    });
                }
                let reaped = reap_zombie_processes()?;
                Ok(ActionOutcome::new(format!("reaped {} child processes", reaped)))
            }
            TreatmentAction::ReapplyNetworkConfig => self.reapply_network_config().await,
        }
    }
}

/// Removes temp entries whose mtime is older than `days`. Per-entry failures are skipped.
fn cleanup_temp_dir(temp_dir: &Path, days: u32) -> Result<usize, TreatmentError> {
    if !temp_dir.exists() {
        return Ok(0);
    }

    let max_age = Duration::from_secs(u64::from(days) * SECS_PER_DAY);
    let now = SystemTime::now();
    let mut removed = 0usize;

    for entry in fs::read_dir(temp_dir)?.flatten() {
        let path = entry.path();
        let Ok(metadata) = fs::symlink_metadata(&path) else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            continue;
        }

        let result = if metadata.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(error) => {
                log::debug!("temp_cleanup_skip path={} error={}", path.display(), error);
            }
        }
    }

    Ok(removed)
}

fn check_disk_usage(threshold_percent: f64) -> Vec<String> {
    let mut system = System::new();
    system.refresh_disks_list();
    system.refresh_disks();

    let mut issues = Vec::new();
    for disk in system.disks() {
        let total = disk.total_space();
        if total == 0 {
            continue;
        }
        let used = total.saturating_sub(disk.available_space());
        let percent = used as f64 / total as f64 * 100.0;
        if percent >= threshold_percent {
            let issue = format!("{}: {:.0}% used", disk.mount_point().display(), percent);
            log::warn!("disk_usage_high mount={} percent={:.1}", disk.mount_point().display(), percent);
            issues.push(issue);
        }
    }
    issues
}

#[cfg(unix)]
fn reap_zombie_processes() -> Result<usize, TreatmentError> {
    let mut reaped = 0usize;
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: WNOHANG makes waitpid return immediately; it only touches our own children.
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
        reaped += 1;
    }
    Ok(reaped)
}

#[cfg(not(unix))]
fn reap_zombie_processes() -> Result<usize, TreatmentError> {
    Err(TreatmentError::Unsupported {
        action: TreatmentAction::ReapZombieProcesses,
        reason: "child reaping requires POSIX waitpid".to_string(),
    })
}

async fn is_online() -> bool {
    let address = SocketAddr::from(ONLINE_CHECK_ADDR);
    matches!(
        timeout(ONLINE_TIMEOUT, TcpStream::connect(address)).await,
        Ok(Ok(_))
    )
}
