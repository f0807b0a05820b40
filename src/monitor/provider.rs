use std::{
    collections::BTreeMap,
    net::{SocketAddr, TcpStream},
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use sysinfo::{ComponentExt, CpuExt, DiskExt, NetworkExt, NetworksExt, System, SystemExt};
use thiserror::Error;

use super::cache::MetricCache;

pub const CPU_PERCENT: &str = "cpu_percent";
pub const MEMORY_PERCENT: &str = "memory_percent";
pub const DISK_PERCENT: &str = "disk_percent";
pub const BYTES_SENT: &str = "bytes_sent";
pub const BYTES_RECV: &str = "bytes_recv";
pub const PING_MS: &str = "ping_ms";
pub const LATENCY_MS: &str = "latency_ms";
pub const TEMPERATURE_CELSIUS: &str = "temperature_celsius";

/// Metrics read through the [`MetricCache`]; everything else is collected directly.
pub const CACHED_METRICS: [&str; 8] = [
    CPU_PERCENT,
    MEMORY_PERCENT,
    DISK_PERCENT,
    BYTES_SENT,
    BYTES_RECV,
    PING_MS,
    LATENCY_MS,
    TEMPERATURE_CELSIUS,
];

const LATENCY_TARGET_HOST: [u8; 4] = [8, 8, 8, 8];

/// One collection pass: metric name to value, `None` when the source had no data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSample(BTreeMap<String, Option<f64>>);

impl MetricSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(&str, f64)]) -> Self {
        let mut sample = Self::new();
        for (name, value) in pairs {
            sample.insert(*name, Some(*value));
        }
        sample
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<f64>) {
        self.0.insert(name.into(), value);
    }

    /// Present, finite reading for `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0
            .get(name)
            .copied()
            .flatten()
            .filter(|value| value.is_finite())
    }

    pub fn has_reading(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|value| value.is_none())
    }
}

/// Byte totals attached to snapshots when the source can provide them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_total_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_used_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_total_bytes: Option<u64>,
}

#[derive(Debug, Error, Clone)]
pub enum MonitorError {
    #[error("metric source unavailable: {0}")]
    Unavailable(String),
    #[error("metric sampling failed: {0}")]
    Sampling(String),
    #[error("enrichment not supported by this provider")]
    EnrichmentUnsupported,
    #[cfg(test)]
    #[error("mock metrics exhausted")]
    MockExhausted,
}

pub trait MetricsProvider: Send + Sync {
    fn collect_metrics(&self) -> Result<MetricSample, MonitorError>;

    fn collect_enrichment(&self) -> Result<Enrichment, MonitorError> {
        Err(MonitorError::EnrichmentUnsupported)
    }
}

pub enum ActiveMetricsProvider {
    Real(Box<RealMetricsProvider>),
    Simulated(SimulatedMetricsProvider),
}

impl ActiveMetricsProvider {
    pub fn new(simulation_enabled: bool, cache: Arc<MetricCache>) -> Self {
        if simulation_enabled {
            Self::Simulated(SimulatedMetricsProvider::new())
        } else {
            Self::Real(Box::new(RealMetricsProvider::new(cache)))
        }
    }
}

impl MetricsProvider for ActiveMetricsProvider {
    fn collect_metrics(&self) -> Result<MetricSample, MonitorError> {
        match self {
            ActiveMetricsProvider::Real(provider) => provider.collect_metrics(),
            ActiveMetricsProvider::Simulated(provider) => provider.collect_metrics(),
        }
    }

    fn collect_enrichment(&self) -> Result<Enrichment, MonitorError> {
        match self {
            ActiveMetricsProvider::Real(provider) => provider.collect_enrichment(),
            ActiveMetricsProvider::Simulated(provider) => provider.collect_enrichment(),
        }
    }
}

pub struct RealMetricsProvider {
    system: Mutex<System>,
    cache: Arc<MetricCache>,
}

impl RealMetricsProvider {
    pub fn new(cache: Arc<MetricCache>) -> Self {
        Self {
            system: Mutex::new(System::new_all()),
            cache,
        }
    }

    fn with_system<T>(&self, read: impl FnOnce(&mut System) -> T) -> Result<T, MonitorError> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| MonitorError::Unavailable("system handle poisoned".to_string()))?;
        Ok(read(&mut system))
    }

    fn read_cpu_percent(&self) -> Result<f64, MonitorError> {
        self.with_system(|system| {
            system.refresh_cpu();
            clamp_percent(f64::from(system.global_cpu_info().cpu_usage()))
        })
    }

    fn read_memory_percent(&self) -> Result<f64, MonitorError> {
        let (used, total) = self.with_system(|system| {
            system.refresh_memory();
            (system.used_memory(), system.total_memory())
        })?;
        percent_of(used, total)
            .ok_or_else(|| MonitorError::Unavailable("total memory reported as zero".to_string()))
    }

    fn read_disk_percent(&self) -> Result<f64, MonitorError> {
        let (used, total) = self.root_disk_usage()?;
        percent_of(used, total)
            .ok_or_else(|| MonitorError::Unavailable("root disk reported zero size".to_string()))
    }

    fn root_disk_usage(&self) -> Result<(u64, u64), MonitorError> {
        self.with_system(|system| {
            system.refresh_disks_list();
            system.refresh_disks();
            system
                .disks()
                .iter()
                .find(|disk| disk.mount_point() == Path::new("/"))
                .or_else(|| system.disks().first())
                .map(|disk| {
                    let total = disk.total_space();
                    (total.saturating_sub(disk.available_space()), total)
                })
        })?
        .ok_or_else(|| MonitorError::Unavailable("no disks reported".to_string()))
    }

    fn read_network_totals(&self) -> Result<(u64, u64), MonitorError> {
        self.with_system(|system| {
            system.refresh_networks_list();
            system.refresh_networks();
            system
                .networks()
                .iter()
                .fold((0u64, 0u64), |(sent, recv), (_, data)| {
                    (
                        sent.saturating_add(data.total_transmitted()),
                        recv.saturating_add(data.total_received()),
                    )
                })
        })
    }

    fn read_temperature(&self) -> Result<f64, MonitorError> {
        self.with_system(|system| {
            system.refresh_components_list();
            system
                .components()
                .iter()
                .map(|component| f64::from(component.temperature()))
                .filter(|value| value.is_finite())
                .fold(None, |max: Option<f64>, value| {
                    Some(max.map_or(value, |current| current.max(value)))
                })
        })?
        .ok_or_else(|| MonitorError::Unavailable("no temperature sensors".to_string()))
    }
}

impl MetricsProvider for RealMetricsProvider {
    fn collect_metrics(&self) -> Result<MetricSample, MonitorError> {
        let mut sample = MetricSample::new();
        let cache = &self.cache;

        sample.insert(
            CPU_PERCENT,
            cache.get_or_refresh(CPU_PERCENT, || self.read_cpu_percent()),
        );
        sample.insert(
            MEMORY_PERCENT,
            cache.get_or_refresh(MEMORY_PERCENT, || self.read_memory_percent()),
        );
        sample.insert(
            DISK_PERCENT,
            cache.get_or_refresh(DISK_PERCENT, || self.read_disk_percent()),
        );
        sample.insert(
            BYTES_SENT,
            cache.get_or_refresh(BYTES_SENT, || {
                self.read_network_totals().map(|(sent, _)| sent as f64)
            }),
        );
        sample.insert(
            BYTES_RECV,
            cache.get_or_refresh(BYTES_RECV, || {
                self.read_network_totals().map(|(_, recv)| recv as f64)
            }),
        );
        sample.insert(
            PING_MS,
            cache.get_or_refresh(PING_MS, || tcp_connect_ms(53, Duration::from_secs(1))),
        );
        sample.insert(
            LATENCY_MS,
            cache.get_or_refresh(LATENCY_MS, || tcp_connect_ms(80, Duration::from_secs(2))),
        );
        sample.insert(
            TEMPERATURE_CELSIUS,
            cache.get_or_refresh(TEMPERATURE_CELSIUS, || self.read_temperature()),
        );

        Ok(sample)
    }

    fn collect_enrichment(&self) -> Result<Enrichment, MonitorError> {
        let (memory_used, memory_total) = self.with_system(|system| {
            system.refresh_memory();
            (system.used_memory(), system.total_memory())
        })?;
        let disk = self.root_disk_usage().ok();

        Ok(Enrichment {
            memory_used_bytes: Some(memory_used),
            memory_total_bytes: Some(memory_total),
            disk_used_bytes: disk.map(|(used, _)| used),
            disk_total_bytes: disk.map(|(_, total)| total),
        })
    }
}

pub struct SimulatedMetricsProvider {
    tick: AtomicU64,
}

impl Default for SimulatedMetricsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMetricsProvider {
    pub fn new() -> Self {
        Self {
            tick: AtomicU64::new(0),
        }
    }
}

impl MetricsProvider for SimulatedMetricsProvider {
    fn collect_metrics(&self) -> Result<MetricSample, MonitorError> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        let phase = tick as f64 / 8.0;

        let mut cpu = 45.0 + (phase.sin() * 20.0);
        let mut memory = 55.0 + ((phase * 0.7).sin() * 12.0);
        let mut disk = 60.0 + ((phase * 0.2).sin() * 5.0);
        let ping = 20.0 + ((phase * 1.3).sin() * 8.0).abs();

        if tick.is_multiple_of(30) {
            cpu = 95.0;
        }

        if tick.is_multiple_of(47) {
            memory = 93.0;
        }

        if tick.is_multiple_of(83) {
            disk = 97.0;
        }

        Ok(MetricSample::from_pairs(&[
            (CPU_PERCENT, clamp_percent(cpu)),
            (MEMORY_PERCENT, clamp_percent(memory)),
            (DISK_PERCENT, clamp_percent(disk)),
            (PING_MS, ping),
        ]))
    }

    fn collect_enrichment(&self) -> Result<Enrichment, MonitorError> {
        const GIB: u64 = 1024 * 1024 * 1024;
        Ok(Enrichment {
            memory_used_bytes: Some(9 * GIB),
            memory_total_bytes: Some(16 * GIB),
            disk_used_bytes: Some(300 * GIB),
            disk_total_bytes: Some(500 * GIB),
        })
    }
}

fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn percent_of(used: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(clamp_percent(used as f64 / total as f64 * 100.0))
}

fn tcp_connect_ms(port: u16, timeout: Duration) -> Result<f64, MonitorError> {
    let address = SocketAddr::from((LATENCY_TARGET_HOST, port));
    let started = Instant::now();
    TcpStream::connect_timeout(&address, timeout)
        .map(|_| started.elapsed().as_secs_f64() * 1000.0)
        .map_err(|error| MonitorError::Sampling(format!("{}: {}", address, error)))
}

/// Replays a fixed sequence of samples; the last one repeats once the sequence runs out.
#[cfg(test)]
pub(crate) struct MockMetricsProvider {
    sequence: Mutex<std::collections::VecDeque<MetricSample>>,
    last: Mutex<Option<MetricSample>>,
    enrichment: Option<Enrichment>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockMetricsProvider {
    pub(crate) fn new(sequence: Vec<MetricSample>) -> Self {
        Self {
            sequence: Mutex::new(sequence.into()),
            last: Mutex::new(None),
            enrichment: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl MetricsProvider for MockMetricsProvider {
    fn collect_metrics(&self) -> Result<MetricSample, MonitorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.sequence.lock().expect("sequence lock").pop_front();
        let mut last = self.last.lock().expect("last lock");
        match next {
            Some(sample) => {
                *last = Some(sample.clone());
                Ok(sample)
            }
            None => last.clone().ok_or(MonitorError::MockExhausted),
        }
    }

    fn collect_enrichment(&self) -> Result<Enrichment, MonitorError> {
        self.enrichment.ok_or(MonitorError::EnrichmentUnsupported)
    }
}
