//! Alert state tracker: one instance owns the alert map, the critical onsets,
//! the cooldowns (through its orchestrator) and the in-flight verifications.

use std::collections::BTreeMap;
use std::sync::Arc;
#[cfg(test)]
use std::time::Instant;

use tokio::sync::Mutex;

use crate::feed::FeedGateway;
use crate::treatments::{TreatmentExecutor, TreatmentOrchestrator};

use super::evaluator::{AlertRecord, HealthState};
use super::history::PostTreatmentHistory;
use super::network_learning::NetworkUsageLearner;
use super::provider::MetricsProvider;
use super::snapshot::Snapshot;
use super::verifier::{PostTreatmentRecord, PostTreatmentVerifier, ShutdownMode};

mod cycle;
mod onset;

pub use cycle::CycleReport;
use onset::CriticalOnsets;

#[derive(Debug, Clone)]
pub struct DisplayView {
    pub current: Option<Snapshot>,
    /// Newest verification record, only while the tracker is still CRITICAL.
    pub post_treatment: Option<PostTreatmentRecord>,
    pub last_state: HealthState,
}

pub struct AlertTracker {
    provider: Arc<dyn MetricsProvider>,
    gateway: Arc<FeedGateway>,
    orchestrator: TreatmentOrchestrator,
    verifier: PostTreatmentVerifier,
    learner: Option<NetworkUsageLearner>,
    active_alerts: BTreeMap<String, AlertRecord>,
    critic_since: CriticalOnsets,
    last_state: HealthState,
    last_snapshot: Option<Snapshot>,
}

impl AlertTracker {
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        executor: Arc<dyn TreatmentExecutor>,
        gateway: Arc<FeedGateway>,
    ) -> Self {
        let history = Arc::new(Mutex::new(PostTreatmentHistory::default()));
        let verifier =
            PostTreatmentVerifier::new(Arc::clone(&provider), Arc::clone(&gateway), history);

        Self {
            provider,
            gateway,
            orchestrator: TreatmentOrchestrator::new(executor),
            verifier,
            learner: None,
            active_alerts: BTreeMap::new(),
            critic_since: CriticalOnsets::default(),
            last_state: HealthState::Stable,
            last_snapshot: None,
        }
    }

    pub fn with_network_learning(mut self, learner: NetworkUsageLearner) -> Self {
        self.learner = Some(learner);
        self
    }

    /// Preloads the bounded history from the gateway's cache file.
    pub async fn restore_history(&self) -> usize {
        let records = self.gateway.load_post_treatment_history();
        let restored = records.len();
        self.verifier.history().lock().await.extend(records);
        if restored > 0 {
            log::info!("post_treatment_history_restored records={}", restored);
        }
        restored
    }

    #[cfg(test)]
    pub fn last_state(&self) -> HealthState {
        self.last_state
    }

    #[cfg(test)]
    pub fn active_alerts(&self) -> &BTreeMap<String, AlertRecord> {
        &self.active_alerts
    }

    #[cfg(test)]
    pub fn critic_since(&self, metric: &str) -> Option<Instant> {
        self.critic_since.get(metric)
    }

    #[cfg(test)]
    pub fn orchestrator(&self) -> &TreatmentOrchestrator {
        &self.orchestrator
    }

    #[cfg(test)]
    pub fn history(&self) -> Arc<Mutex<PostTreatmentHistory>> {
        self.verifier.history()
    }

    pub async fn display_view(&self) -> DisplayView {
        let post_treatment = if self.last_state == HealthState::Critical {
            self.verifier.history().lock().await.latest().cloned()
        } else {
            None
        };

        DisplayView {
            current: self.last_snapshot.clone(),
            post_treatment,
            last_state: self.last_state,
        }
    }

    pub async fn shutdown(&mut self, mode: ShutdownMode) {
        self.verifier.shutdown(mode).await;
    }
}

#[cfg(test)]
mod tests;
