use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, RuntimeConfig};
use crate::monitor::AlertTracker;

#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub config_path: String,
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub runtime_update_notify: Arc<Notify>,
    pub tracker: Arc<Mutex<AlertTracker>>,
    pub shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(config: Config, config_path: impl Into<String>, tracker: AlertTracker) -> Self {
        let runtime_config = RuntimeConfig::from_config(&config);
        Self {
            config,
            config_path: config_path.into(),
            runtime_config: Arc::new(RwLock::new(runtime_config)),
            runtime_update_notify: Arc::new(Notify::new()),
            tracker: Arc::new(Mutex::new(tracker)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Swaps the hot-reloadable settings and wakes the monitor loop so a new
    /// interval takes effect without waiting out the old one.
    pub async fn update_runtime_config(&self, runtime_config: RuntimeConfig) {
        *self.runtime_config.write().await = runtime_config;
        self.runtime_update_notify.notify_one();
    }
}
