use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};

use crate::app_context::AppContext;
use crate::monitor::{CycleReport, DisplayView};

pub(super) fn start_monitor_job(app_context: AppContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        if app_context.config.simulation.enabled {
            log::warn!("simulation_mode_enabled source=monitor_provider");
        }
        let mut previous_tick = None;

        loop {
            let runtime_config = app_context.runtime_config.read().await.clone();
            let now = Utc::now();

            if let Some(previous) = previous_tick {
                let elapsed_secs = now.signed_duration_since(previous).num_seconds().max(0);
                let threshold_secs = (runtime_config.monitor_interval * 2) as i64;
                if elapsed_secs > threshold_secs {
                    log::warn!(
                        "monitor_loop_delayed elapsed_secs={} threshold_secs={}",
                        elapsed_secs,
                        threshold_secs
                    );
                }
            }

            previous_tick = Some(now);

            {
                let mut tracker = app_context.tracker.lock().await;
                let report = tracker.run_cycle(&runtime_config).await;
                log_cycle_report(&report);
                log_display_view(&tracker.display_view().await);
            }

            let sleep_duration = Duration::from_secs(runtime_config.monitor_interval);
            tokio::select! {
                _ = app_context.shutdown.cancelled() => {
                    log::info!("monitor_loop_stopped reason=shutdown");
                    break;
                }
                _ = sleep(sleep_duration) => {}
                _ = app_context.runtime_update_notify.notified() => {
                    log::info!(
                        "monitor_interval_change_interrupt_applied previous_sleep_secs={}",
                        runtime_config.monitor_interval
                    );
                }
            }
        }
    })
}

fn log_cycle_report(report: &CycleReport) {
    match report {
        CycleReport::Stable(_) => {}
        CycleReport::Warning(snapshot) => {
            log::info!("monitor_warning summary=\"{}\"", snapshot.summary_short);
        }
        CycleReport::Critical {
            before,
            after,
            treatments,
        } => {
            log::warn!(
                "monitor_critical before=\"{}\" after=\"{}\" treatment_decisions={}",
                before.summary_short,
                after.summary_short,
                treatments.len()
            );
        }
    }
}

fn log_display_view(view: &DisplayView) {
    if let Some(record) = &view.post_treatment {
        log::info!(
            "post_treatment_latest state={} actions={} remaining_critical={} checked_at={}",
            view.last_state,
            record.actions.join(","),
            record.critical_count(),
            record.timestamp.to_rfc3339()
        );
    }
}
