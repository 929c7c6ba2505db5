//! Metrics sink abstraction.

use std::collections::HashMap;
use std::sync::RwLock;

/// Destination for published values.
///
/// Every name is an independent cell. No ordering or atomicity is promised
/// across cells.
pub trait MetricsSink: Send + Sync {
    fn set_gauge(&self, name: &'static str, value: f64);

    fn inc_counter(&self, name: &'static str);

    /// Replace the label set of an info record (last write wins).
    fn set_info(&self, name: &'static str, labels: &[(&'static str, String)]);
}

/// In-memory sink holding the latest value of every cell.
///
/// Useful for tests and for inspecting what a cycle published.
#[derive(Debug, Default)]
pub struct MemorySink {
    gauges: RwLock<HashMap<&'static str, f64>>,
    counters: RwLock<HashMap<&'static str, u64>>,
    infos: RwLock<HashMap<&'static str, Vec<(&'static str, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        read(&self.gauges).get(name).copied()
    }

    /// Counter value; never-incremented counters read 0.
    pub fn counter(&self, name: &str) -> u64 {
        read(&self.counters).get(name).copied().unwrap_or(0)
    }

    pub fn info(&self, name: &str) -> Option<Vec<(&'static str, String)>> {
        read(&self.infos).get(name).cloned()
    }
}

impl MetricsSink for MemorySink {
    fn set_gauge(&self, name: &'static str, value: f64) {
        write(&self.gauges).insert(name, value);
    }

    fn inc_counter(&self, name: &'static str) {
        *write(&self.counters).entry(name).or_insert(0) += 1;
    }

    fn set_info(&self, name: &'static str, labels: &[(&'static str, String)]) {
        write(&self.infos).insert(name, labels.to_vec());
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
