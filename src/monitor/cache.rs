//! Per-metric memoization with a staleness window.
//!
//! Each registered key owns a refresh lock that is only ever taken with
//! `try_lock`: a caller that finds the key stale while another caller is
//! refreshing it gets the previous value back instead of waiting. Keys that
//! were never registered are passed straight through to their collector.

use std::{
    collections::HashMap,
    sync::{Mutex, TryLockError},
    time::{Duration, Instant},
};

use super::provider::MonitorError;

#[derive(Debug, Default, Clone, Copy)]
struct CachedValue {
    value: Option<f64>,
    refreshed_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct CacheSlot {
    entry: Mutex<CachedValue>,
    refresh: Mutex<()>,
}

#[derive(Debug)]
pub struct MetricCache {
    staleness: Duration,
    slots: HashMap<String, CacheSlot>,
}

impl MetricCache {
    pub fn new<I, S>(staleness: Duration, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots = keys
            .into_iter()
            .map(|key| (key.into(), CacheSlot::default()))
            .collect();
        Self { staleness, slots }
    }

    pub fn get_or_refresh<F>(&self, key: &str, collector: F) -> Option<f64>
    where
        F: FnOnce() -> Result<f64, MonitorError>,
    {
        self.get_or_refresh_at(key, Instant::now(), collector)
    }

    pub(crate) fn get_or_refresh_at<F>(&self, key: &str, now: Instant, collector: F) -> Option<f64>
    where
        F: FnOnce() -> Result<f64, MonitorError>,
    {
        let Some(slot) = self.slots.get(key) else {
            return run_collector(key, collector);
        };

        let cached = read_entry(slot);
        if !self.is_stale(cached, now) {
            return cached.value;
        }

        let _guard = match slot.refresh.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                log::debug!("metric_cache_refresh_in_flight key={}", key);
                return cached.value;
            }
        };

        // Another caller may have finished a refresh between the read and the lock.
        let current = read_entry(slot);
        if !self.is_stale(current, now) {
            return current.value;
        }

        let value = run_collector(key, collector)?;
        let mut entry = slot
            .entry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *entry = CachedValue {
            value: Some(value),
            refreshed_at: Some(Instant::now()),
        };
        Some(value)
    }

    /// Last stored value for `key` without triggering a refresh.
    #[cfg(test)]
    pub fn peek(&self, key: &str) -> Option<f64> {
        self.slots.get(key).and_then(|slot| read_entry(slot).value)
    }

    /// Resets the refresh timestamp so the next read goes to the collector.
    #[cfg(test)]
    pub fn invalidate(&self, key: &str) {
        if let Some(slot) = self.slots.get(key) {
            let mut entry = slot
                .entry
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            entry.refreshed_at = None;
        }
    }

    fn is_stale(&self, cached: CachedValue, now: Instant) -> bool {
        match cached.refreshed_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.staleness,
        }
    }

    #[cfg(test)]
    pub(crate) fn seed(&self, key: &str, value: f64, refreshed_at: Option<Instant>) {
        if let Some(slot) = self.slots.get(key) {
            let mut entry = slot.entry.lock().expect("cache entry lock");
            *entry = CachedValue {
                value: Some(value),
                refreshed_at,
            };
        }
    }

    #[cfg(test)]
    pub(crate) fn hold_refresh_lock(&self, key: &str) -> std::sync::MutexGuard<'_, ()> {
        self.slots[key].refresh.lock().expect("refresh lock")
    }
}

fn read_entry(slot: &CacheSlot) -> CachedValue {
    *slot
        .entry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_collector<F>(key: &str, collector: F) -> Option<f64>
where
    F: FnOnce() -> Result<f64, MonitorError>,
{
    match collector() {
        Ok(value) if value.is_finite() => Some(value),
        Ok(value) => {
            log::debug!("metric_cache_non_finite key={} value={}", key, value);
            None
        }
        Err(error) => {
            log::warn!("metric_collect_failed key={} error={}", key, error);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc, Barrier,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
        time::{Duration, Instant},
    };

    use super::MetricCache;
    use crate::monitor::provider::MonitorError;

    fn cache() -> MetricCache {
        MetricCache::new(Duration::from_secs(10), ["cpu_percent", "ping_ms"])
    }

    #[test]
    fn unknown_keys_pass_through_without_caching() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        for expected in [1.0, 2.0] {
            let value = cache.get_or_refresh("bytes_sent", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(expected)
            });
            assert_eq!(value, Some(expected));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.peek("bytes_sent"), None);
    }

    #[test]
    fn fresh_entries_skip_the_collector() {
        let cache = cache();
        let now = Instant::now();
        cache.seed("cpu_percent", 42.0, Some(now));

        let value = cache.get_or_refresh_at("cpu_percent", now + Duration::from_secs(3), || {
            panic!("collector must not run for a fresh entry")
        });
        assert_eq!(value, Some(42.0));
    }

    #[test]
    fn stale_entries_refresh_and_store() {
        let cache = cache();
        let start = Instant::now();
        cache.seed("cpu_percent", 10.0, Some(start));

        let value =
            cache.get_or_refresh_at("cpu_percent", start + Duration::from_secs(10), || Ok(55.0));
        assert_eq!(value, Some(55.0));
        assert_eq!(cache.peek("cpu_percent"), Some(55.0));
    }

    #[test]
    fn held_lock_returns_previous_value_without_collecting() {
        let cache = cache();
        cache.seed("cpu_percent", 7.0, None);
        let _guard = cache.hold_refresh_lock("cpu_percent");

        let value = cache.get_or_refresh("cpu_percent", || -> Result<f64, MonitorError> {
            panic!("collector must not run while another refresh holds the lock")
        });
        assert_eq!(value, Some(7.0));
    }

    #[test]
    fn collector_failure_leaves_cache_untouched() {
        let cache = cache();
        cache.seed("ping_ms", 12.5, None);

        let value = cache.get_or_refresh("ping_ms", || {
            Err(MonitorError::Sampling("connect refused".to_string()))
        });
        assert_eq!(value, None);
        assert_eq!(cache.peek("ping_ms"), Some(12.5));
    }

    #[test]
    fn invalidate_forces_a_refresh() {
        let cache = cache();
        cache.seed("cpu_percent", 1.0, Some(Instant::now()));
        cache.invalidate("cpu_percent");

        assert_eq!(cache.get_or_refresh("cpu_percent", || Ok(2.0)), Some(2.0));
    }

    #[test]
    fn concurrent_callers_never_double_refresh() {
        let cache = Arc::new(cache());
        cache.seed("cpu_percent", 5.0, None);
        let calls = Arc::new(AtomicUsize::new(0));
        let in_collector = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let refresher = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let in_collector = Arc::clone(&in_collector);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                cache.get_or_refresh("cpu_percent", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    in_collector.wait();
                    release.wait();
                    Ok(80.0)
                })
            })
        };

        in_collector.wait();
        let concurrent = cache.get_or_refresh("cpu_percent", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(99.0)
        });
        release.wait();

        let refreshed = refresher.join().expect("refresher thread");
        assert_eq!(concurrent, Some(5.0));
        assert_eq!(refreshed, Some(80.0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.peek("cpu_percent"), Some(80.0));
    }
}
