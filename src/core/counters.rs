use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Named tallies shared by every shard and reducer of one job.
///
/// Purely observational: a poisoned lock drops the increment instead of failing the caller.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    inner: Arc<Mutex<BTreeMap<String, u64>>>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, name: impl Into<String>) {
        self.increment_by(name, 1);
    }

    pub fn increment_by(&self, name: impl Into<String>, delta: u64) {
        if let Ok(mut counters) = self.inner.lock() {
            *counters.entry(name.into()).or_insert(0) += delta;
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.inner
            .lock()
            .ok()
            .and_then(|counters| counters.get(name).copied())
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.inner
            .lock()
            .map(|counters| counters.clone())
            .unwrap_or_default()
    }
}
