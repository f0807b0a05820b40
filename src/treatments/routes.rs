use super::TreatmentAction;

/// One row of the metric to action table.
#[derive(Debug)]
pub struct TreatmentRoute {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
    pub action: TreatmentAction,
    /// Best-effort follow-ups, each gated by its own cooldown.
    pub companions: &'static [TreatmentAction],
}

fn is_disk(metric: &str) -> bool {
    metric.contains("disk")
}

fn is_memory(metric: &str) -> bool {
    metric.contains("memory") || metric.starts_with("ram")
}

fn is_network(metric: &str) -> bool {
    ["network", "ping", "loss", "latency"]
        .iter()
        .any(|needle| metric.contains(needle))
}

fn is_cpu(metric: &str) -> bool {
    metric.starts_with("cpu") || metric.contains("load")
}

/// Evaluated top to bottom; the first matching row wins.
pub const ROUTES: &[TreatmentRoute] = &[
    TreatmentRoute {
        name: "disk",
        matches: is_disk,
        action: TreatmentAction::CheckDiskUsage,
        companions: &[
            TreatmentAction::CleanupTempFiles,
            TreatmentAction::ReapZombieProcesses,
        ],
    },
    TreatmentRoute {
        name: "memory",
        matches: is_memory,
        action: TreatmentAction::TrimProcessWorkingSet,
        companions: &[TreatmentAction::ReapZombieProcesses],
    },
    TreatmentRoute {
        name: "network",
        matches: is_network,
        action: TreatmentAction::ReapplyNetworkConfig,
        companions: &[TreatmentAction::ReapZombieProcesses],
    },
    TreatmentRoute {
        name: "cpu",
        matches: is_cpu,
        action: TreatmentAction::ReapZombieProcesses,
        companions: &[],
    },
];

pub fn route_for(metric: &str) -> Option<&'static TreatmentRoute> {
    let metric = metric.to_ascii_lowercase();
    ROUTES.iter().find(|route| (route.matches)(&metric))
}
