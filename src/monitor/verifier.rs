//! Delayed re-check after a treatment dispatch.
//!
//! Each check runs as its own task: sleep for the wait window, collect,
//! evaluate against the thresholds that were active when the treatment ran,
//! push into the bounded history and persist. The evaluation loop never
//! waits on these tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::Thresholds;
use crate::feed::FeedGateway;

use super::evaluator::{AlertRecord, HealthState, evaluate};
use super::history::PostTreatmentHistory;
use super::provider::{MetricSample, MetricsProvider};

/// Audit record of one post-treatment check. Carries no display summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostTreatmentRecord {
    pub state: HealthState,
    pub post_treatment: bool,
    pub timestamp: DateTime<Utc>,
    pub metrics: MetricSample,
    pub alerts: Vec<AlertRecord>,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl PostTreatmentRecord {
    pub fn new(
        metrics: MetricSample,
        alerts: Vec<AlertRecord>,
        actions: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            state: HealthState::PostTreatment,
            post_treatment: true,
            timestamp,
            metrics,
            alerts,
            actions,
        }
    }

    pub fn critical_count(&self) -> usize {
        self.alerts.iter().filter(|alert| alert.is_critical()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Skip the remaining wait and finish every scheduled check.
    Drain,
    /// Drop scheduled checks without collecting or persisting.
    Abandon,
}

impl ShutdownMode {
    pub fn from_drain_flag(drain: bool) -> Self {
        if drain { Self::Drain } else { Self::Abandon }
    }
}

pub struct PostTreatmentVerifier {
    provider: Arc<dyn MetricsProvider>,
    gateway: Arc<FeedGateway>,
    history: Arc<Mutex<PostTreatmentHistory>>,
    tasks: JoinSet<()>,
    skip_wait: CancellationToken,
    abandon: CancellationToken,
}

impl PostTreatmentVerifier {
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        gateway: Arc<FeedGateway>,
        history: Arc<Mutex<PostTreatmentHistory>>,
    ) -> Self {
        Self {
            provider,
            gateway,
            history,
            tasks: JoinSet::new(),
            skip_wait: CancellationToken::new(),
            abandon: CancellationToken::new(),
        }
    }

    pub fn history(&self) -> Arc<Mutex<PostTreatmentHistory>> {
        Arc::clone(&self.history)
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Must be called from within a tokio runtime.
    pub fn schedule(&mut self, actions: Vec<String>, thresholds: Thresholds, wait: Duration) {
        self.reap_finished();

        let provider = Arc::clone(&self.provider);
        let gateway = Arc::clone(&self.gateway);
        let history = Arc::clone(&self.history);
        let skip_wait = self.skip_wait.clone();
        let abandon = self.abandon.clone();

        log::info!(
            "post_treatment_check_scheduled actions={} wait_secs={}",
            actions.join(","),
            wait.as_secs()
        );

        self.tasks.spawn(async move {
            tokio::select! {
                _ = abandon.cancelled() => {
                    log::info!("post_treatment_check_abandoned actions={}", actions.join(","));
                    return;
                }
                _ = skip_wait.cancelled() => {}
                _ = sleep(wait) => {}
            }

            run_check(provider, gateway, history, actions, thresholds).await;
        });
    }

    pub async fn shutdown(&mut self, mode: ShutdownMode) {
        let pending = self.tasks.len();
        match mode {
            ShutdownMode::Drain => self.skip_wait.cancel(),
            ShutdownMode::Abandon => {
                self.abandon.cancel();
                self.tasks.abort_all();
            }
        }

        while let Some(result) = self.tasks.join_next().await {
            if let Err(error) = result
                && !error.is_cancelled()
            {
                log::warn!("post_treatment_check_failed error={}", error);
            }
        }

        log::info!(
            "post_treatment_verifier_stopped mode={:?} pending={}",
            mode,
            pending
        );
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(error) = result {
                log::warn!("post_treatment_check_failed error={}", error);
            }
        }
    }
}

async fn run_check(
    provider: Arc<dyn MetricsProvider>,
    gateway: Arc<FeedGateway>,
    history: Arc<Mutex<PostTreatmentHistory>>,
    actions: Vec<String>,
    thresholds: Thresholds,
) {
    let sample = match tokio::task::spawn_blocking(move || provider.collect_metrics()).await {
        Ok(Ok(sample)) => sample,
        Ok(Err(error)) => {
            log::warn!("post_treatment_collect_failed error={}", error);
            MetricSample::new()
        }
        Err(error) => {
            log::warn!("post_treatment_collect_failed error={}", error);
            MetricSample::new()
        }
    };

    let evaluation = evaluate(&sample, &thresholds);
    let record = PostTreatmentRecord::new(sample, evaluation.alerts, actions, Utc::now());
    let remaining_critical = record.critical_count();

    history.lock().await.push(record.clone());

    let actions = record.actions.join(",");
    match tokio::task::spawn_blocking(move || gateway.persist_post_treatment(&record)).await {
        Ok(tier) => {
            log::info!(
                "post_treatment_check_completed actions={} remaining_critical={} tier={:?}",
                actions,
                remaining_critical,
                tier
            );
        }
        Err(error) => {
            log::warn!("post_treatment_persist_failed actions={} error={}", actions, error);
        }
    }
}
