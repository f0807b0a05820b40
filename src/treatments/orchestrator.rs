use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{TreatmentPolicy, default_cooldown_secs};
use crate::monitor::AlertRecord;

use super::routes::route_for;
use super::{ActionOutcome, ActionParams, TreatmentAction, TreatmentError, TreatmentExecutor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreatmentResult {
    pub metric: String,
    pub action: TreatmentAction,
    pub succeeded: bool,
    pub detail: String,
    /// Companion actions that were dispatched, with their success flag.
    pub companions: Vec<(TreatmentAction, bool)>,
}

impl TreatmentResult {
    /// Names of every action that ran, primary first.
    pub fn action_names(&self) -> Vec<String> {
        std::iter::once(self.action)
            .chain(self.companions.iter().map(|(action, _)| *action))
            .map(|action| action.as_str().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreatmentDecision {
    Dispatched(TreatmentResult),
    NoAction,
    OnCooldown {
        action: TreatmentAction,
        remaining: Duration,
    },
}

/// Maps critical metrics to actions and enforces per-action cooldowns.
///
/// Cooldown state belongs to this instance only; two orchestrators never
/// share `last_run`.
pub struct TreatmentOrchestrator {
    executor: Arc<dyn TreatmentExecutor>,
    last_run: HashMap<TreatmentAction, Instant>,
}

impl TreatmentOrchestrator {
    pub fn new(executor: Arc<dyn TreatmentExecutor>) -> Self {
        Self {
            executor,
            last_run: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn last_run(&self, action: TreatmentAction) -> Option<Instant> {
        self.last_run.get(&action).copied()
    }

    #[cfg(test)]
    pub fn cooldown_entries(&self) -> usize {
        self.last_run.len()
    }

    /// Time left before `action` may run again, `None` when it is eligible.
    pub fn cooldown_remaining(
        &self,
        action: TreatmentAction,
        policy: &TreatmentPolicy,
        now: Instant,
    ) -> Option<Duration> {
        let last = self.last_run.get(&action)?;
        let cooldown = Duration::from_secs(
            policy
                .cooldowns
                .get(action.as_str())
                .copied()
                .unwrap_or_else(|| default_cooldown_secs(action.as_str())),
        );
        let elapsed = now.saturating_duration_since(*last);
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    /// Dispatches the action routed from `metric` unless it is on cooldown.
    ///
    /// The caller has already checked that the metric is sustained-critical.
    pub async fn attempt_treatment_at(
        &mut self,
        metric: &str,
        alert: &AlertRecord,
        policy: &TreatmentPolicy,
        now: Instant,
    ) -> TreatmentDecision {
        let Some(route) = route_for(metric) else {
            log::debug!("treatment_no_route metric={}", metric);
            return TreatmentDecision::NoAction;
        };

        if let Some(remaining) = self.cooldown_remaining(route.action, policy, now) {
            log::debug!(
                "treatment_on_cooldown action={} metric={} remaining_secs={}",
                route.action,
                metric,
                remaining.as_secs()
            );
            return TreatmentDecision::OnCooldown {
                action: route.action,
                remaining,
            };
        }

        log::info!(
            "treatment_dispatch action={} metric={} value={} route={}",
            route.action,
            metric,
            alert.value,
            route.name
        );
        let params = action_params(policy);
        let primary = self.dispatch(route.action, &params, now).await;

        let mut companions = Vec::with_capacity(route.companions.len());
        for companion in route.companions {
            if self.cooldown_remaining(*companion, policy, now).is_some() {
                log::debug!(
                    "treatment_companion_on_cooldown action={} primary={}",
                    companion,
                    route.action
                );
                continue;
            }
            let outcome = self.dispatch(*companion, &params, now).await;
            companions.push((*companion, outcome.is_ok()));
        }

        let (succeeded, detail) = match primary {
            Ok(outcome) => (true, outcome.detail),
            Err(error) => (false, error.to_string()),
        };

        TreatmentDecision::Dispatched(TreatmentResult {
            metric: metric.to_string(),
            action: route.action,
            succeeded,
            detail,
            companions,
        })
    }

    /// Best-effort cleanup and reap pass that runs without a critical metric.
    pub async fn run_opportunistic_at(
        &mut self,
        policy: &TreatmentPolicy,
        now: Instant,
    ) -> Vec<(TreatmentAction, bool)> {
        let params = action_params(policy);
        let mut ran = Vec::new();
        for action in [
            TreatmentAction::CleanupTempFiles,
            TreatmentAction::ReapZombieProcesses,
        ] {
            if self.cooldown_remaining(action, policy, now).is_some() {
                continue;
            }
            let outcome = self.dispatch(action, &params, now).await;
            ran.push((action, outcome.is_ok()));
        }
        ran
    }

    /// Runs one action and stamps its cooldown whether or not it succeeded.
    async fn dispatch(
        &mut self,
        action: TreatmentAction,
        params: &ActionParams,
        now: Instant,
    ) -> Result<ActionOutcome, TreatmentError> {
        let outcome = self.executor.execute(action, params).await;
        self.last_run.insert(action, now);

        match &outcome {
            Ok(result) => {
                log::info!("treatment_completed action={} detail={}", action, result.detail);
            }
            Err(error) => {
                log::warn!("treatment_failed action={} error={}", action, error);
            }
        }
        outcome
    }
}

fn action_params(policy: &TreatmentPolicy) -> ActionParams {
    ActionParams {
        cleanup_temp_age_days: policy.cleanup_temp_age_days,
        disk_check_threshold_percent: policy.disk_check_threshold_percent,
    }
}

/// Executor double that records every call and fails the configured actions.
#[cfg(test)]
pub(crate) struct RecordingExecutor {
    calls: std::sync::Mutex<Vec<(TreatmentAction, ActionParams)>>,
    failing: Vec<TreatmentAction>,
}

#[cfg(test)]
impl RecordingExecutor {
    pub(crate) fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            failing: Vec::new(),
        }
    }

    pub(crate) fn failing(actions: &[TreatmentAction]) -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            failing: actions.to_vec(),
        }
    }

    pub(crate) fn calls(&self) -> Vec<(TreatmentAction, ActionParams)> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn count(&self, action: TreatmentAction) -> usize {
        self.calls()
            .iter()
            .filter(|(called, _)| *called == action)
            .count()
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl TreatmentExecutor for RecordingExecutor {
    async fn execute(
        &self,
        action: TreatmentAction,
        params: &ActionParams,
    ) -> Result<ActionOutcome, TreatmentError> {
        self.calls.lock().expect("calls lock").push((action, *params));
        if self.failing.contains(&action) {
            return Err(TreatmentError::Failed(format!("{} refused", action)));
        }
        Ok(ActionOutcome::new(format!("{} ok", action)))
    }
}
