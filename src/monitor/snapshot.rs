//! Display-ready views of one evaluation cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    evaluator::{AlertRecord, Evaluation, HealthState},
    provider::{
        BYTES_RECV, BYTES_SENT, CPU_PERCENT, DISK_PERCENT, Enrichment, LATENCY_MS, MEMORY_PERCENT,
        MetricSample, PING_MS, TEMPERATURE_CELSIUS,
    },
};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const UNAVAILABLE: &str = "unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Stable,
    Warning,
    BeforeCritic,
    AfterCritic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub kind: SnapshotKind,
    pub state: HealthState,
    pub timestamp: DateTime<Utc>,
    pub metrics: MetricSample,
    pub alerts: Vec<AlertRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlighted: Option<AlertRecord>,
    #[serde(flatten)]
    pub enrichment: Enrichment,
    pub summary_short: String,
    pub summary_long: Vec<String>,
}

pub fn build_stable(evaluation: &Evaluation, metrics: &MetricSample, enrichment: Enrichment) -> Snapshot {
    build(SnapshotKind::Stable, evaluation, metrics, enrichment, false)
}

pub fn build_warning(evaluation: &Evaluation, metrics: &MetricSample, enrichment: Enrichment) -> Snapshot {
    build(SnapshotKind::Warning, evaluation, metrics, enrichment, true)
}

pub fn build_before_critic(
    evaluation: &Evaluation,
    metrics: &MetricSample,
    enrichment: Enrichment,
) -> Snapshot {
    build(SnapshotKind::BeforeCritic, evaluation, metrics, enrichment, true)
}

pub fn build_after_critic(
    evaluation: &Evaluation,
    metrics: &MetricSample,
    enrichment: Enrichment,
) -> Snapshot {
    build(SnapshotKind::AfterCritic, evaluation, metrics, enrichment, false)
}

fn build(
    kind: SnapshotKind,
    evaluation: &Evaluation,
    metrics: &MetricSample,
    enrichment: Enrichment,
    highlight: bool,
) -> Snapshot {
    let timestamp = Utc::now();
    let highlighted = if highlight {
        worst_alert(&evaluation.alerts).cloned()
    } else {
        None
    };

    let base_summary = summary_short(metrics);
    let summary_short = match &highlighted {
        Some(alert) => format!(
            "[{} {}={:.1}] {}",
            alert.level.as_str(),
            alert.name,
            alert.value,
            base_summary
        ),
        None => base_summary,
    };

    Snapshot {
        kind,
        state: evaluation.state,
        timestamp,
        metrics: metrics.clone(),
        alerts: evaluation.alerts.clone(),
        highlighted,
        enrichment,
        summary_short,
        summary_long: summary_long(metrics, &enrichment, timestamp),
    }
}

/// First critical alert, otherwise the first warning.
fn worst_alert(alerts: &[AlertRecord]) -> Option<&AlertRecord> {
    alerts
        .iter()
        .find(|alert| alert.is_critical())
        .or_else(|| alerts.first())
}

pub fn summary_short(metrics: &MetricSample) -> String {
    let mut parts = Vec::new();
    if let Some(cpu) = metrics.get(CPU_PERCENT) {
        parts.push(format!("CPU {}%", cpu.round()));
    }
    if let Some(memory) = metrics.get(MEMORY_PERCENT) {
        parts.push(format!("RAM {}%", memory.round()));
    }
    if let Some(ping) = metrics.get(PING_MS) {
        parts.push(format!("Ping {} ms", ping.round()));
    }
    if let Some(disk) = metrics.get(DISK_PERCENT) {
        parts.push(format!("Disk {}%", disk.round()));
    }

    if parts.is_empty() {
        "No data".to_string()
    } else {
        parts.join(" | ")
    }
}

pub fn summary_long(
    metrics: &MetricSample,
    enrichment: &Enrichment,
    timestamp: DateTime<Utc>,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(9);

    lines.push(match metrics.get(CPU_PERCENT) {
        Some(cpu) => format!("CPU: {}%", cpu.round()),
        None => format!("CPU: {}", UNAVAILABLE),
    });
    lines.push(format!(
        "RAM: {}",
        format_used_total(enrichment.memory_used_bytes, enrichment.memory_total_bytes)
    ));
    lines.push(format!(
        "Disk: {}",
        format_used_total(enrichment.disk_used_bytes, enrichment.disk_total_bytes)
    ));
    lines.push(match metrics.get(PING_MS) {
        Some(ping) => format!("Ping: {:.1} ms", ping),
        None => format!("Ping: {}", UNAVAILABLE),
    });
    lines.push(match metrics.get(LATENCY_MS) {
        Some(latency) => format!("Latency: {:.1} ms", latency),
        None => format!("Latency: {}", UNAVAILABLE),
    });
    lines.push(match metrics.get(TEMPERATURE_CELSIUS) {
        Some(temperature) => format!("Temperature: {:.1} C", temperature),
        None => format!("Temperature: {}", UNAVAILABLE),
    });
    lines.push(format!("Bytes sent: {}", format_traffic(metrics.get(BYTES_SENT))));
    lines.push(format!("Bytes received: {}", format_traffic(metrics.get(BYTES_RECV))));
    lines.push(format!("Timestamp: {}", timestamp.format("%Y-%m-%d %H:%M:%S")));

    lines
}

fn format_used_total(used: Option<u64>, total: Option<u64>) -> String {
    match (used, total) {
        (Some(used), Some(total)) if total > 0 => {
            let used = used as f64;
            let total = total as f64;
            format!(
                "{:.1} / {:.0} GB - {}%",
                used / GIB,
                total / GIB,
                (used / total * 100.0).round()
            )
        }
        _ => UNAVAILABLE.to_string(),
    }
}

fn format_traffic(bytes: Option<f64>) -> String {
    match bytes {
        Some(bytes) if bytes >= GIB => format!("{:.1} GB", bytes / GIB),
        Some(bytes) => format!("{:.1} MB", bytes / MIB),
        None => UNAVAILABLE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::monitor::{
        evaluator::{AlertLevel, AlertRecord, Evaluation, HealthState},
        provider::{Enrichment, MetricSample},
    };

    use super::{
        SnapshotKind, build_after_critic, build_before_critic, build_stable, build_warning,
        summary_short,
    };

    fn alert(name: &str, value: f64, level: AlertLevel) -> AlertRecord {
        AlertRecord {
            name: name.to_string(),
            value,
            level,
        }
    }

    #[test]
    fn short_summary_lists_available_metrics_in_display_order() {
        let metrics = MetricSample::from_pairs(&[
            ("disk_percent", 70.2),
            ("cpu_percent", 41.6),
            ("ping_ms", 12.4),
        ]);
        assert_eq!(summary_short(&metrics), "CPU 42% | Ping 12 ms | Disk 70%");
        assert_eq!(summary_short(&MetricSample::new()), "No data");
    }

    #[test]
    fn stable_snapshot_has_no_highlight() {
        let metrics = MetricSample::from_pairs(&[("cpu_percent", 20.0)]);
        let snapshot = build_stable(&Evaluation::default(), &metrics, Enrichment::default());

        assert_eq!(snapshot.kind, SnapshotKind::Stable);
        assert_eq!(snapshot.state, HealthState::Stable);
        assert!(snapshot.highlighted.is_none());
        assert_eq!(snapshot.summary_short, "CPU 20%");
    }

    #[test]
    fn warning_and_before_snapshots_highlight_the_worst_metric() {
        let metrics = MetricSample::from_pairs(&[("cpu_percent", 95.0), ("disk_percent", 85.0)]);
        let evaluation = Evaluation {
            state: HealthState::Critical,
            alerts: vec![
                alert("disk_percent", 85.0, AlertLevel::Warning),
                alert("cpu_percent", 95.0, AlertLevel::Critical),
            ],
        };

        let before = build_before_critic(&evaluation, &metrics, Enrichment::default());
        assert_eq!(
            before.highlighted.as_ref().map(|alert| alert.name.as_str()),
            Some("cpu_percent")
        );
        assert!(before.summary_short.starts_with("[CRITICAL cpu_percent=95.0]"));

        let warning_eval = Evaluation {
            state: HealthState::Warning,
            alerts: vec![alert("disk_percent", 85.0, AlertLevel::Warning)],
        };
        let warning = build_warning(&warning_eval, &metrics, Enrichment::default());
        assert!(warning.summary_short.starts_with("[WARNING disk_percent=85.0]"));

        let after = build_after_critic(&evaluation, &metrics, Enrichment::default());
        assert!(after.highlighted.is_none());
        assert_eq!(after.kind, SnapshotKind::AfterCritic);
    }

    #[test]
    fn long_summary_uses_enrichment_totals() {
        let gib = 1024 * 1024 * 1024;
        let enrichment = Enrichment {
            memory_used_bytes: Some(4 * gib),
            memory_total_bytes: Some(16 * gib),
            disk_used_bytes: None,
            disk_total_bytes: None,
        };
        let snapshot = build_stable(&Evaluation::default(), &MetricSample::new(), enrichment);

        assert!(snapshot.summary_long.contains(&"RAM: 4.0 / 16 GB - 25%".to_string()));
        assert!(snapshot.summary_long.contains(&"Disk: unavailable".to_string()));
        assert!(snapshot.summary_long.contains(&"CPU: unavailable".to_string()));
    }

    #[test]
    fn serialized_snapshot_carries_summary_fields() {
        let snapshot = build_stable(
            &Evaluation::default(),
            &MetricSample::from_pairs(&[("cpu_percent", 5.0)]),
            Enrichment::default(),
        );
        let value = serde_json::to_value(&snapshot).expect("serialize snapshot");

        assert_eq!(value["state"], "STABLE");
        assert_eq!(value["kind"], "stable");
        assert!(value.get("summary_short").is_some());
        assert!(value.get("summary_long").is_some());
        assert!(value.get("memory_used_bytes").is_none());
    }
}
