mod app_context;
mod capabilities;
mod config;
mod feed;
mod jobs;
mod monitor;
mod system;
mod treatments;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::app_context::AppContext;
use crate::capabilities::Capabilities;
use crate::config::{Config, load_config, resolve_config_path};
use crate::feed::FeedGateway;
use crate::jobs::start_background_jobs;
use crate::monitor::{
    ActiveMetricsProvider, AlertTracker, CACHED_METRICS, MetricCache, NetworkUsageLearner,
    ShutdownMode,
};
use crate::treatments::SystemTreatments;

fn init_json_logging() {
    if let Err(error) = tracing_log::LogTracer::init() {
        eprintln!(
            "logging bridge initialization failed (continuing with existing logger): {}",
            error
        );
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .finish();

    if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("global logger initialization failed: {}", error);
    }
}

fn build_tracker(config: &Config, capabilities: Capabilities) -> AlertTracker {
    let cache = Arc::new(MetricCache::new(
        Duration::from_secs(config.metric_cache.staleness_secs),
        CACHED_METRICS,
    ));
    let provider = Arc::new(ActiveMetricsProvider::new(config.simulation.enabled, cache));
    let executor = Arc::new(SystemTreatments::new(capabilities));
    let gateway = Arc::new(FeedGateway::from_config(&config.persistence));

    if let Some(fallback) = gateway.fallback_root() {
        log::info!("feed_fallback_configured root={}", fallback.display());
    } else {
        log::warn!("capability_degraded feature=feed_fallback reason=no_fallback_root");
    }

    let learner = NetworkUsageLearner::new(gateway.cache_dir(), &config.network_learning);
    AlertTracker::new(provider, executor, gateway).with_network_learning(learner)
}

#[tokio::main]
async fn main() {
    init_json_logging();

    let config_path = resolve_config_path();
    let config: Config = match load_config(&config_path) {
        Ok(config) => config,
        Err(error) => {
            log::error!("Configuration error: {}", error);
            return;
        }
    };

    log::info!("hostwatch is starting... config={}", config_path);
    let capabilities = Capabilities::detect();
    capabilities.log_degraded();

    let tracker = build_tracker(&config, capabilities);
    tracker.restore_history().await;

    let app_context = AppContext::new(config, config_path, tracker);
    let monitor_job = start_background_jobs(app_context.clone());

    if let Err(error) = tokio::signal::ctrl_c().await {
        log::error!("shutdown signal listener failed: {}", error);
    }
    log::info!("hostwatch is stopping...");

    app_context.shutdown.cancel();
    if let Err(error) = monitor_job.await {
        log::warn!("monitor_job_join_failed error={}", error);
    }
    let drain = app_context.runtime_config.read().await.treatment.drain_on_shutdown;
    let mode = ShutdownMode::from_drain_flag(drain);
    log::info!("post_treatment_shutdown mode={:?}", mode);
    app_context.tracker.lock().await.shutdown(mode).await;

    log::info!("hostwatch stopped");
}
