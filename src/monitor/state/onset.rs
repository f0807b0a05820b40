use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::super::evaluator::Evaluation;
use super::super::provider::MetricSample;

/// First instant of the current unbroken CRITICAL run, per metric.
#[derive(Debug, Default)]
pub(super) struct CriticalOnsets {
    since: HashMap<String, Instant>,
}

impl CriticalOnsets {
    /// Starts timers for newly critical metrics and clears metrics that now
    /// read below critical. A metric without a reading keeps its onset.
    pub(super) fn update(&mut self, evaluation: &Evaluation, sample: &MetricSample, now: Instant) {
        for alert in evaluation.critical_alerts() {
            self.since.entry(alert.name.clone()).or_insert(now);
        }

        self.since.retain(|metric, _| {
            let cleared = sample.has_reading(metric) && !evaluation.is_critical(metric);
            if cleared {
                log::debug!("critical_onset_cleared metric={}", metric);
            }
            !cleared
        });
    }

    /// The onset must predate this cycle, so a first critical reading is never sustained.
    pub(super) fn is_sustained(&self, metric: &str, now: Instant, window: Duration) -> bool {
        self.since
            .get(metric)
            .is_some_and(|onset| *onset < now && now.duration_since(*onset) >= window)
    }

    #[cfg(test)]
    pub(super) fn get(&self, metric: &str) -> Option<Instant> {
        self.since.get(metric).copied()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::CriticalOnsets;
    use crate::config::{ThresholdSpec, Thresholds};
    use crate::monitor::{evaluator::evaluate, provider::MetricSample};

    fn thresholds() -> Thresholds {
        [("cpu_percent".to_string(), ThresholdSpec::new(50.0, 90.0))]
            .into_iter()
            .collect()
    }

    fn step(onsets: &mut CriticalOnsets, sample: MetricSample, now: Instant) {
        let evaluation = evaluate(&sample, &thresholds());
        onsets.update(&evaluation, &sample, now);
    }

    #[test]
    fn repeated_critical_cycles_keep_the_first_onset() {
        let mut onsets = CriticalOnsets::default();
        let start = Instant::now();

        for offset in 0..4 {
            step(
                &mut onsets,
                MetricSample::from_pairs(&[("cpu_percent", 95.0)]),
                start + Duration::from_secs(offset * 30),
            );
        }

        assert_eq!(onsets.get("cpu_percent"), Some(start));
    }

    #[test]
    fn missing_reading_keeps_onset_and_warning_reading_clears_it() {
        let mut onsets = CriticalOnsets::default();
        let start = Instant::now();

        step(&mut onsets, MetricSample::from_pairs(&[("cpu_percent", 95.0)]), start);
        step(&mut onsets, MetricSample::new(), start + Duration::from_secs(30));
        assert_eq!(onsets.get("cpu_percent"), Some(start));

        step(
            &mut onsets,
            MetricSample::from_pairs(&[("cpu_percent", 60.0)]),
            start + Duration::from_secs(60),
        );
        assert_eq!(onsets.get("cpu_percent"), None);
    }

    #[test]
    fn sustained_needs_an_earlier_onset_and_the_full_window() {
        let mut onsets = CriticalOnsets::default();
        let start = Instant::now();
        step(&mut onsets, MetricSample::from_pairs(&[("cpu_percent", 95.0)]), start);

        assert!(!onsets.is_sustained("cpu_percent", start, Duration::ZERO));
        assert!(onsets.is_sustained("cpu_percent", start + Duration::from_secs(1), Duration::ZERO));
        assert!(!onsets.is_sustained(
            "cpu_percent",
            start + Duration::from_secs(299),
            Duration::from_secs(300)
        ));
        assert!(onsets.is_sustained(
            "cpu_percent",
            start + Duration::from_secs(300),
            Duration::from_secs(300)
        ));
        assert!(!onsets.is_sustained("memory_percent", start + Duration::from_secs(600), Duration::ZERO));
    }
}
