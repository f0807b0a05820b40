use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::{AlertTracker, CycleReport};
use crate::config::{Persistence, RuntimeConfig, ThresholdSpec, TreatmentPolicy};
use crate::feed::FeedGateway;
use crate::monitor::evaluator::HealthState;
use crate::monitor::provider::{MetricSample, MockMetricsProvider};
use crate::monitor::snapshot::SnapshotKind;
use crate::monitor::verifier::{PostTreatmentRecord, ShutdownMode};
use crate::treatments::{RecordingExecutor, TreatmentAction, TreatmentDecision};

const CYCLE: Duration = Duration::from_secs(30);

fn gateway(root: &Path) -> Arc<FeedGateway> {
    let persistence = Persistence {
        root: root.join("logs").to_string_lossy().to_string(),
        cache_dir: root.join("cache").to_string_lossy().to_string(),
        durable_writes: false,
        human_readable: false,
        ..Persistence::default()
    };
    Arc::new(FeedGateway::with_fallback(&persistence, None))
}

fn runtime(sustained_secs: u64, min_critical: usize) -> RuntimeConfig {
    RuntimeConfig {
        monitor_interval: 30,
        thresholds: [
            ("cpu_percent".to_string(), ThresholdSpec::new(50.0, 90.0)),
            ("memory_percent".to_string(), ThresholdSpec::new(60.0, 90.0)),
        ]
        .into_iter()
        .collect(),
        treatment: TreatmentPolicy {
            sustained_critic_seconds: sustained_secs,
            min_critical_alerts: min_critical,
            post_treatment_wait_seconds: 3600,
            opportunistic_maintenance: false,
            ..TreatmentPolicy::default()
        },
    }
}

fn cpu(value: f64) -> MetricSample {
    MetricSample::from_pairs(&[("cpu_percent", value), ("memory_percent", 40.0)])
}

fn tracker(
    root: &Path,
    samples: Vec<MetricSample>,
    executor: Arc<RecordingExecutor>,
) -> AlertTracker {
    AlertTracker::new(
        Arc::new(MockMetricsProvider::new(samples)),
        executor,
        gateway(root),
    )
}

fn dispatched(report: &CycleReport) -> usize {
    match report {
        CycleReport::Critical { treatments, .. } => treatments
            .iter()
            .filter(|decision| matches!(decision, TreatmentDecision::Dispatched(_)))
            .count(),
        _ => 0,
    }
}

#[tokio::test]
async fn first_critical_cycle_waits_then_second_dispatches() {
    let temp = tempfile::tempdir().expect("tempdir");
    let executor = Arc::new(RecordingExecutor::new());
    let mut tracker = tracker(temp.path(), vec![cpu(95.0)], Arc::clone(&executor));
    let runtime = runtime(0, 1);
    let start = Instant::now();

    let first = tracker.run_cycle_at(&runtime, start).await;
    assert_eq!(first.state(), HealthState::Critical);
    assert_eq!(dispatched(&first), 0);
    assert_eq!(executor.count(TreatmentAction::ReapZombieProcesses), 0);

    let second = tracker.run_cycle_at(&runtime, start + CYCLE).await;
    assert_eq!(dispatched(&second), 1);
    assert_eq!(executor.count(TreatmentAction::ReapZombieProcesses), 1);
    assert!(
        tracker
            .orchestrator()
            .last_run(TreatmentAction::ReapZombieProcesses)
            .is_some()
    );

    tracker.shutdown(ShutdownMode::Abandon).await;
}

#[tokio::test]
async fn critical_cycle_persists_before_and_after_snapshots() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gateway = gateway(temp.path());
    let mut tracker = AlertTracker::new(
        Arc::new(MockMetricsProvider::new(vec![cpu(95.0), cpu(70.0)])),
        Arc::new(RecordingExecutor::new()),
        Arc::clone(&gateway),
    );

    let report = tracker.run_cycle_at(&runtime(300, 1), Instant::now()).await;
    let CycleReport::Critical { before, after, .. } = &report else {
        panic!("expected a critical report, got {:?}", report.state());
    };
    assert_eq!(before.kind, SnapshotKind::BeforeCritic);
    assert_eq!(after.kind, SnapshotKind::AfterCritic);
    assert_eq!(after.state, HealthState::Warning);
    assert_eq!(report.current().kind, SnapshotKind::AfterCritic);

    let entries = gateway.recent_entries::<serde_json::Value>(10);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "after_critic");
    assert_eq!(entries[1]["kind"], "before_critic");
}

#[tokio::test]
async fn onset_survives_critical_cycles_and_clears_on_recovery() {
    let temp = tempfile::tempdir().expect("tempdir");
    let executor = Arc::new(RecordingExecutor::new());
    let samples = vec![cpu(95.0), cpu(95.0), cpu(96.0), cpu(96.0), cpu(20.0)];
    let mut tracker = tracker(temp.path(), samples, executor);
    let runtime = runtime(300, 1);
    let start = Instant::now();

    tracker.run_cycle_at(&runtime, start).await;
    assert_eq!(tracker.critic_since("cpu_percent"), Some(start));

    tracker.run_cycle_at(&runtime, start + CYCLE).await;
    assert_eq!(tracker.critic_since("cpu_percent"), Some(start));
    assert!(tracker.active_alerts().contains_key("cpu_percent"));

    let report = tracker.run_cycle_at(&runtime, start + CYCLE * 2).await;
    assert_eq!(report.state(), HealthState::Stable);
    assert_eq!(tracker.critic_since("cpu_percent"), None);
    assert!(tracker.active_alerts().is_empty());
    assert_eq!(tracker.last_state(), HealthState::Stable);
}

#[tokio::test]
async fn missing_reading_keeps_the_onset() {
    let temp = tempfile::tempdir().expect("tempdir");
    let executor = Arc::new(RecordingExecutor::new());
    let samples = vec![cpu(95.0), cpu(95.0), MetricSample::new()];
    let mut tracker = tracker(temp.path(), samples, executor);
    let runtime = runtime(300, 1);
    let start = Instant::now();

    tracker.run_cycle_at(&runtime, start).await;
    let report = tracker.run_cycle_at(&runtime, start + CYCLE).await;

    assert_eq!(report.state(), HealthState::Stable);
    assert_eq!(tracker.critic_since("cpu_percent"), Some(start));
}

#[tokio::test]
async fn cooldown_holds_across_many_cycles() {
    let temp = tempfile::tempdir().expect("tempdir");
    let executor = Arc::new(RecordingExecutor::new());
    let mut tracker = tracker(temp.path(), vec![cpu(95.0)], Arc::clone(&executor));
    let runtime = runtime(0, 1);
    let start = Instant::now();

    let mut on_cooldown = 0;
    for cycle in 0..20u32 {
        let report = tracker.run_cycle_at(&runtime, start + CYCLE * cycle).await;
        if let CycleReport::Critical { treatments, .. } = &report {
            on_cooldown += treatments
                .iter()
                .filter(|decision| matches!(decision, TreatmentDecision::OnCooldown { .. }))
                .count();
        }
    }

    assert_eq!(executor.count(TreatmentAction::ReapZombieProcesses), 1);
    assert_eq!(on_cooldown, 18);
    assert_eq!(tracker.orchestrator().cooldown_entries(), 1);

    tracker.shutdown(ShutdownMode::Abandon).await;
}

#[tokio::test]
async fn failing_executor_does_not_break_the_cycle() {
    let temp = tempfile::tempdir().expect("tempdir");
    let executor = Arc::new(RecordingExecutor::failing(&[
        TreatmentAction::ReapZombieProcesses,
    ]));
    let mut tracker = tracker(temp.path(), vec![cpu(95.0)], Arc::clone(&executor));
    let runtime = runtime(0, 1);
    let start = Instant::now();

    tracker.run_cycle_at(&runtime, start).await;
    let report = tracker.run_cycle_at(&runtime, start + CYCLE).await;

    let CycleReport::Critical { treatments, .. } = &report else {
        panic!("expected a critical report");
    };
    assert!(matches!(
        treatments.as_slice(),
        [TreatmentDecision::Dispatched(result)] if !result.succeeded
    ));
    assert!(
        tracker
            .orchestrator()
            .last_run(TreatmentAction::ReapZombieProcesses)
            .is_some()
    );

    tracker.shutdown(ShutdownMode::Abandon).await;
}

#[tokio::test]
async fn collector_failure_degrades_to_no_data() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut tracker = tracker(temp.path(), Vec::new(), Arc::new(RecordingExecutor::new()));

    let report = tracker.run_cycle_at(&runtime(0, 1), Instant::now()).await;

    assert_eq!(report.state(), HealthState::Stable);
    assert_eq!(report.current().summary_short, "No data");
    assert!(report.current().alerts.is_empty());
}

#[tokio::test]
async fn min_critical_alerts_gates_treatment() {
    let temp = tempfile::tempdir().expect("tempdir");
    let executor = Arc::new(RecordingExecutor::new());
    let mut tracker = tracker(temp.path(), vec![cpu(95.0)], Arc::clone(&executor));
    let runtime = runtime(0, 2);
    let start = Instant::now();

    for cycle in 0..3u32 {
        let report = tracker.run_cycle_at(&runtime, start + CYCLE * cycle).await;
        assert_eq!(report.state(), HealthState::Critical);
    }

    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn stable_cycle_runs_opportunistic_maintenance_once_per_cooldown() {
    let temp = tempfile::tempdir().expect("tempdir");
    let executor = Arc::new(RecordingExecutor::new());
    let mut tracker = tracker(temp.path(), vec![cpu(10.0)], Arc::clone(&executor));
    let mut runtime = runtime(0, 1);
    runtime.treatment.opportunistic_maintenance = true;
    let start = Instant::now();

    tracker.run_cycle_at(&runtime, start).await;
    tracker.run_cycle_at(&runtime, start + CYCLE).await;

    assert_eq!(executor.count(TreatmentAction::CleanupTempFiles), 1);
    assert_eq!(executor.count(TreatmentAction::ReapZombieProcesses), 1);
}

#[tokio::test]
async fn drained_verification_shows_while_critical() {
    let temp = tempfile::tempdir().expect("tempdir");
    let executor = Arc::new(RecordingExecutor::new());
    let mut tracker = tracker(temp.path(), vec![cpu(95.0)], executor);
    let runtime = runtime(0, 1);
    let start = Instant::now();

    tracker.run_cycle_at(&runtime, start).await;
    tracker.run_cycle_at(&runtime, start + CYCLE).await;

    let view = tracker.display_view().await;
    assert_eq!(view.last_state, HealthState::Critical);
    assert!(view.post_treatment.is_none());
    assert_eq!(
        view.current.as_ref().map(|snapshot| snapshot.kind),
        Some(SnapshotKind::AfterCritic)
    );

    tracker.shutdown(ShutdownMode::Drain).await;

    let view = tracker.display_view().await;
    let record = view.post_treatment.expect("verification recorded");
    assert!(record.post_treatment);
    assert_eq!(record.actions, vec!["reap_zombie_processes".to_string()]);
    assert_eq!(record.critical_count(), 1);
    assert!(
        temp.path()
            .join("cache/post_treatment_history.jsonl")
            .exists()
    );
}

#[tokio::test]
async fn restore_history_preloads_persisted_records() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gateway = gateway(temp.path());
    for index in 0..3 {
        let record = PostTreatmentRecord::new(
            cpu(40.0 + f64::from(index)),
            Vec::new(),
            vec!["check_disk_usage".to_string()],
            Utc::now(),
        );
        gateway.persist_post_treatment(&record);
    }

    let tracker = AlertTracker::new(
        Arc::new(MockMetricsProvider::new(vec![cpu(10.0)])),
        Arc::new(RecordingExecutor::new()),
        gateway,
    );

    assert_eq!(tracker.restore_history().await, 3);
    let history = tracker.history();
    let history = history.lock().await;
    assert_eq!(history.len(), 3);
    assert_eq!(
        history.latest().and_then(|record| record.metrics.get("cpu_percent")),
        Some(42.0)
    );
    assert!(tracker.display_view().await.post_treatment.is_none());
}
