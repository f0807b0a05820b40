use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::Thresholds;

use super::provider::MetricSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HealthState {
    #[default]
    #[serde(rename = "STABLE")]
    Stable,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "CRITICAL")]
    Critical,
    #[serde(rename = "post_treatment")]
    PostTreatment,
}

impl HealthState {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Stable => "STABLE",
            HealthState::Warning => "WARNING",
            HealthState::Critical => "CRITICAL",
            HealthState::PostTreatment => "post_treatment",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Warning => "WARNING",
            AlertLevel::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub name: String,
    pub value: f64,
    pub level: AlertLevel,
}

impl AlertRecord {
    pub fn is_critical(&self) -> bool {
        self.level == AlertLevel::Critical
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evaluation {
    pub state: HealthState,
    pub alerts: Vec<AlertRecord>,
}

impl Evaluation {
    pub fn critical_alerts(&self) -> impl Iterator<Item = &AlertRecord> {
        self.alerts.iter().filter(|alert| alert.is_critical())
    }

    pub fn critical_count(&self) -> usize {
        self.critical_alerts().count()
    }

    pub fn is_critical(&self, metric: &str) -> bool {
        self.critical_alerts().any(|alert| alert.name == metric)
    }
}

/// Classifies every metric that has both a reading and a threshold.
///
/// One critical metric makes the whole cycle CRITICAL; the remaining metrics
/// are still classified so callers can count critical alerts per cycle.
/// Metrics without a reading are skipped and never produce an alert.
pub fn evaluate(sample: &MetricSample, thresholds: &Thresholds) -> Evaluation {
    let mut state = HealthState::Stable;
    let mut alerts = Vec::new();

    for (name, limits) in thresholds {
        let Some(value) = sample.get(name) else {
            continue;
        };

        if value >= limits.critical {
            alerts.push(AlertRecord {
                name: name.clone(),
                value,
                level: AlertLevel::Critical,
            });
            state = HealthState::Critical;
        } else if value >= limits.warning {
            alerts.push(AlertRecord {
                name: name.clone(),
                value,
                level: AlertLevel::Warning,
            });
            if state != HealthState::Critical {
                state = HealthState::Warning;
            }
        }
    }

    Evaluation { state, alerts }
}

#[cfg(test)]
mod tests {
    use crate::config::{ThresholdSpec, Thresholds};
    use crate::monitor::provider::MetricSample;

    use super::{AlertLevel, AlertRecord, HealthState, evaluate};

    fn thresholds(pairs: &[(&str, f64, f64)]) -> Thresholds {
        pairs
            .iter()
            .map(|(name, warning, critical)| {
                (name.to_string(), ThresholdSpec::new(*warning, *critical))
            })
            .collect()
    }

    #[test]
    fn single_critical_metric_is_reported() {
        let limits = thresholds(&[("cpu_percent", 50.0, 90.0)]);
        let result = evaluate(&MetricSample::from_pairs(&[("cpu_percent", 95.0)]), &limits);

        assert_eq!(result.state, HealthState::Critical);
        assert_eq!(
            result.alerts,
            vec![AlertRecord {
                name: "cpu_percent".to_string(),
                value: 95.0,
                level: AlertLevel::Critical,
            }]
        );
    }

    #[test]
    fn value_between_limits_is_warning() {
        let limits = thresholds(&[("cpu_percent", 50.0, 90.0)]);
        let result = evaluate(&MetricSample::from_pairs(&[("cpu_percent", 60.0)]), &limits);

        assert_eq!(result.state, HealthState::Warning);
        assert_eq!(result.alerts.len(), 1);
        assert_eq!(result.alerts[0].level, AlertLevel::Warning);
    }

    #[test]
    fn boundaries_are_inclusive() {
        let limits = thresholds(&[("cpu_percent", 50.0, 90.0), ("disk_percent", 80.0, 95.0)]);
        let result = evaluate(
            &MetricSample::from_pairs(&[("cpu_percent", 90.0), ("disk_percent", 80.0)]),
            &limits,
        );

        assert_eq!(result.state, HealthState::Critical);
        assert!(result.is_critical("cpu_percent"));
        assert!(!result.is_critical("disk_percent"));
        assert_eq!(result.alerts.len(), 2);
    }

    #[test]
    fn critical_dominates_regardless_of_other_metrics() {
        let limits = thresholds(&[
            ("cpu_percent", 50.0, 90.0),
            ("disk_percent", 80.0, 95.0),
            ("memory_percent", 75.0, 90.0),
        ]);
        let samples = [
            [("cpu_percent", 10.0), ("disk_percent", 99.0), ("memory_percent", 80.0)],
            [("cpu_percent", 91.0), ("disk_percent", 10.0), ("memory_percent", 10.0)],
            [("cpu_percent", 60.0), ("disk_percent", 85.0), ("memory_percent", 95.0)],
        ];

        for pairs in samples {
            let result = evaluate(&MetricSample::from_pairs(&pairs), &limits);
            assert_eq!(result.state, HealthState::Critical, "sample {:?}", pairs);
            assert!(result.critical_count() >= 1);
        }
    }

    #[test]
    fn values_below_every_warning_are_stable_without_alerts() {
        let limits = thresholds(&[("cpu_percent", 50.0, 90.0), ("ping_ms", 100.0, 500.0)]);
        let result = evaluate(
            &MetricSample::from_pairs(&[("cpu_percent", 49.9), ("ping_ms", 12.0)]),
            &limits,
        );

        assert_eq!(result.state, HealthState::Stable);
        assert!(result.alerts.is_empty());
    }

    #[test]
    fn absent_metrics_and_unconfigured_metrics_are_skipped() {
        let limits = thresholds(&[("cpu_percent", 50.0, 90.0)]);
        let mut sample = MetricSample::from_pairs(&[("temperature_celsius", 120.0)]);
        sample.insert("cpu_percent", None);

        let result = evaluate(&sample, &limits);
        assert_eq!(result.state, HealthState::Stable);
        assert!(result.alerts.is_empty());
    }

    #[test]
    fn counts_every_critical_metric() {
        let limits = thresholds(&[("cpu_percent", 50.0, 90.0), ("memory_percent", 75.0, 90.0)]);
        let result = evaluate(
            &MetricSample::from_pairs(&[("cpu_percent", 99.0), ("memory_percent", 97.0)]),
            &limits,
        );

        assert_eq!(result.critical_count(), 2);
    }
}
