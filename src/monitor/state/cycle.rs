use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::config::{RuntimeConfig, Thresholds};
use crate::treatments::TreatmentDecision;

use super::super::evaluator::{Evaluation, HealthState, evaluate};
use super::super::provider::{
    BYTES_RECV, BYTES_SENT, CPU_PERCENT, DISK_PERCENT, Enrichment, MEMORY_PERCENT, MetricSample,
    MonitorError, PING_MS,
};
use super::super::snapshot::{
    Snapshot, build_after_critic, build_before_critic, build_stable, build_warning,
};
use super::AlertTracker;

#[derive(Debug, Clone)]
pub enum CycleReport {
    Stable(Snapshot),
    Warning(Snapshot),
    Critical {
        before: Snapshot,
        after: Snapshot,
        treatments: Vec<TreatmentDecision>,
    },
}

impl CycleReport {
    #[cfg(test)]
    pub fn state(&self) -> HealthState {
        match self {
            CycleReport::Stable(_) => HealthState::Stable,
            CycleReport::Warning(_) => HealthState::Warning,
            CycleReport::Critical { .. } => HealthState::Critical,
        }
    }

    /// The snapshot a dashboard should show: the "after" view for critical cycles.
    pub fn current(&self) -> &Snapshot {
        match self {
            CycleReport::Stable(snapshot) | CycleReport::Warning(snapshot) => snapshot,
            CycleReport::Critical { after, .. } => after,
        }
    }
}

impl AlertTracker {
    pub async fn run_cycle(&mut self, runtime: &RuntimeConfig) -> CycleReport {
        self.run_cycle_at(runtime, Instant::now()).await
    }

    /// One evaluation cycle. Collection, enrichment, treatment and persistence
    /// failures degrade to "no data" for that step; the cycle always completes.
    pub async fn run_cycle_at(&mut self, runtime: &RuntimeConfig, now: Instant) -> CycleReport {
        let thresholds = self.effective_thresholds(runtime);
        let sample = self.collect().await;
        self.learn_network_usage(&sample);

        let evaluation = evaluate(&sample, &thresholds);
        log_cycle_metrics(&sample, &evaluation);

        self.active_alerts = evaluation
            .alerts
            .iter()
            .map(|alert| (alert.name.clone(), alert.clone()))
            .collect();
        self.critic_since.update(&evaluation, &sample, now);
        if self.last_state != evaluation.state {
            log::info!(
                "health_state_changed from={} to={}",
                self.last_state,
                evaluation.state
            );
        }
        self.last_state = evaluation.state;

        let report = match evaluation.state {
            HealthState::Critical => {
                self.handle_critical(runtime, &thresholds, &sample, &evaluation, now)
                    .await
            }
            HealthState::Warning => {
                let snapshot = build_warning(&evaluation, &sample, self.enrichment().await);
                self.maintain(runtime, now).await;
                self.persist(&snapshot).await;
                CycleReport::Warning(snapshot)
            }
            HealthState::Stable | HealthState::PostTreatment => {
                let snapshot = build_stable(&evaluation, &sample, self.enrichment().await);
                self.maintain(runtime, now).await;
                self.persist(&snapshot).await;
                CycleReport::Stable(snapshot)
            }
        };

        self.last_snapshot = Some(report.current().clone());
        report
    }

    async fn handle_critical(
        &mut self,
        runtime: &RuntimeConfig,
        thresholds: &Thresholds,
        sample: &MetricSample,
        evaluation: &Evaluation,
        now: Instant,
    ) -> CycleReport {
        let before = build_before_critic(evaluation, sample, self.enrichment().await);
        self.persist(&before).await;

        let policy = &runtime.treatment;
        let window = Duration::from_secs(policy.sustained_critic_seconds);
        let critical_count = evaluation.critical_count();
        let mut treatments = Vec::new();

        if critical_count >= policy.min_critical_alerts {
            for alert in evaluation.critical_alerts() {
                if !self.critic_since.is_sustained(&alert.name, now, window) {
                    log::debug!(
                        "treatment_not_sustained metric={} required_secs={}",
                        alert.name,
                        window.as_secs()
                    );
                    continue;
                }
                let decision = self
                    .orchestrator
                    .attempt_treatment_at(&alert.name, alert, policy, now)
                    .await;
                treatments.push(decision);
            }
        } else {
            log::debug!(
                "treatment_below_min_critical count={} required={}",
                critical_count,
                policy.min_critical_alerts
            );
        }

        let dispatched = treatments
            .iter()
            .filter_map(|decision| match decision {
                TreatmentDecision::Dispatched(result) => Some(result.action_names()),
                _ => None,
            })
            .flatten()
            .collect::<Vec<_>>();
        if !dispatched.is_empty() {
            self.verifier.schedule(
                dispatched,
                thresholds.clone(),
                Duration::from_secs(policy.post_treatment_wait_seconds),
            );
        }

        // Onsets are left alone here; only the cycle's first reading moves them.
        let after_sample = self.collect().await;
        let after_evaluation = evaluate(&after_sample, thresholds);
        let after = build_after_critic(&after_evaluation, &after_sample, self.enrichment().await);
        self.persist(&after).await;

        CycleReport::Critical {
            before,
            after,
            treatments,
        }
    }

    async fn maintain(&mut self, runtime: &RuntimeConfig, now: Instant) {
        if !runtime.treatment.opportunistic_maintenance {
            return;
        }
        let ran = self
            .orchestrator
            .run_opportunistic_at(&runtime.treatment, now)
            .await;
        for (action, succeeded) in ran {
            log::info!("maintenance_ran action={} ok={}", action, succeeded);
        }
    }

    fn effective_thresholds(&self, runtime: &RuntimeConfig) -> Thresholds {
        let mut thresholds = runtime.thresholds.clone();
        if let Some(learner) = &self.learner
            && let Some(limit) = learner.apply_to(&mut thresholds)
        {
            log::debug!("network_learned_limit_applied limit_bytes={}", limit);
        }
        thresholds
    }

    fn learn_network_usage(&self, sample: &MetricSample) {
        let Some(learner) = self.learner.as_ref().filter(|learner| learner.is_enabled()) else {
            return;
        };
        let (Some(sent), Some(recv)) = (sample.get(BYTES_SENT), sample.get(BYTES_RECV)) else {
            return;
        };

        if let Err(error) =
            learner.record_daily_usage(sent.max(0.0) as u64, recv.max(0.0) as u64, Utc::now().date_naive())
        {
            log::warn!("network_learning_write_failed error={}", error);
        }
    }

    async fn collect(&self) -> MetricSample {
        let provider = Arc::clone(&self.provider);
        match tokio::task::spawn_blocking(move || provider.collect_metrics()).await {
            Ok(Ok(sample)) => sample,
            Ok(Err(error)) => {
                log::warn!("metrics_collect_failed error={}", error);
                MetricSample::new()
            }
            Err(error) => {
                log::warn!("metrics_collect_failed error={}", error);
                MetricSample::new()
            }
        }
    }

    async fn enrichment(&self) -> Enrichment {
        let provider = Arc::clone(&self.provider);
        match tokio::task::spawn_blocking(move || provider.collect_enrichment()).await {
            Ok(Ok(enrichment)) => enrichment,
            Ok(Err(MonitorError::EnrichmentUnsupported)) => Enrichment::default(),
            Ok(Err(error)) => {
                log::debug!("enrichment_failed error={}", error);
                Enrichment::default()
            }
            Err(error) => {
                log::debug!("enrichment_failed error={}", error);
                Enrichment::default()
            }
        }
    }

    async fn persist(&self, snapshot: &Snapshot) {
        let gateway = Arc::clone(&self.gateway);
        let snapshot = snapshot.clone();
        if let Err(error) =
            tokio::task::spawn_blocking(move || gateway.persist_snapshot(&snapshot)).await
        {
            log::warn!("snapshot_persist_failed error={}", error);
        }
    }
}

fn log_cycle_metrics(sample: &MetricSample, evaluation: &Evaluation) {
    tracing::info!(
        target: "monitor",
        module = "monitor",
        state = evaluation.state.as_str(),
        alerts = evaluation.alerts.len(),
        critical = evaluation.critical_count(),
        cpu = sample.get(CPU_PERCENT),
        memory = sample.get(MEMORY_PERCENT),
        disk = sample.get(DISK_PERCENT),
        ping_ms = sample.get(PING_MS),
        "monitor_metrics"
    );
}
