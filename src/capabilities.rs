use std::process::Command;

const LINUX_NETWORK_RESETS: &[(&str, &[&str])] = &[
    ("resolvectl", &["flush-caches"]),
    ("nmcli", &["networking", "on"]),
];
const WINDOWS_NETWORK_RESETS: &[(&str, &[&str])] = &[("ipconfig", &["/flushdns"])];
const MACOS_NETWORK_RESETS: &[(&str, &[&str])] = &[("dscacheutil", &["-flushcache"])];

#[derive(Debug, Clone)]
pub struct Capabilities {
    pub has_resolvectl: bool,
    pub has_nmcli: bool,
    pub has_ipconfig: bool,
    pub has_dscacheutil: bool,
    pub can_reap_children: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            has_resolvectl: cfg!(target_os = "linux") && command_exists("resolvectl"),
            has_nmcli: cfg!(target_os = "linux") && command_exists("nmcli"),
            has_ipconfig: cfg!(windows),
            has_dscacheutil: cfg!(target_os = "macos") && command_exists("dscacheutil"),
            can_reap_children: cfg!(unix),
        }
    }

    /// Network reset commands for this platform whose binaries are installed.
    pub fn network_reset_commands(&self) -> Vec<(&'static str, &'static [&'static str])> {
        let candidates = if cfg!(target_os = "linux") {
            LINUX_NETWORK_RESETS
        } else if cfg!(windows) {
            WINDOWS_NETWORK_RESETS
        } else if cfg!(target_os = "macos") {
            MACOS_NETWORK_RESETS
        } else {
            &[]
        };

        candidates
            .iter()
            .copied()
            .filter(|(command, _)| self.has_command(command))
            .collect()
    }

    fn has_command(&self, command: &str) -> bool {
        match command {
            "resolvectl" => self.has_resolvectl,
            "nmcli" => self.has_nmcli,
            "ipconfig" => self.has_ipconfig,
            "dscacheutil" => self.has_dscacheutil,
            _ => false,
        }
    }

    pub fn log_degraded(&self) {
        if !self.can_reap_children {
            log::warn!("capability_degraded feature=reap_zombie_processes reason=no_posix_waitpid");
        }

        if self.network_reset_commands().is_empty() {
            log::warn!(
                "capability_degraded feature=reapply_network_config reason=no_reset_command_installed"
            );
        }

        if !cfg!(windows) {
            log::info!(
                "capability_degraded feature=trim_process_working_set reason=windows_only"
            );
        }
    }
}

fn command_exists(command: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {} >/dev/null 2>&1", command))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
