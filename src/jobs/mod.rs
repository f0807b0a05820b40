use tokio::task::JoinHandle;

use crate::app_context::AppContext;

mod config_reload;
mod monitor;

/// Returns the monitor loop handle so shutdown can wait for the cycle in progress.
pub fn start_background_jobs(app_context: AppContext) -> JoinHandle<()> {
    config_reload::start_config_hot_reload_job(app_context.clone());
    monitor::start_monitor_job(app_context)
}
