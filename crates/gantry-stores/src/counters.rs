//! Named counter sequences recorded into the pipeline environment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named integer sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counter {
    pub prefix: String,
    pub value: i64,
}

/// Port for counter allocation during a build.
pub trait CounterStore: Send + Sync {
    /// Increments the counter for `prefix`, seeding it when absent, and
    /// returns the new value.
    fn increment(&mut self, prefix: &str, seed: i64) -> i64;

    /// Snapshot of every counter touched during this build.
    fn counters(&self) -> Vec<Counter>;
}

/// Counter store backed by process memory; suitable for tests and for
/// hosts without durable counters.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    values: BTreeMap<String, i64>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&mut self, prefix: &str, seed: i64) -> i64 {
        let value = self
            .values
            .entry(prefix.to_string())
            .and_modify(|v| *v += 1)
            .or_insert(seed);
        *value
    }

    fn counters(&self) -> Vec<Counter> {
        self.values
            .iter()
            .map(|(prefix, value)| Counter {
                prefix: prefix.clone(),
                value: *value,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_seeds_then_advances() {
        let mut store = InMemoryCounterStore::new();
        assert_eq!(store.increment("build", 100), 100);
        assert_eq!(store.increment("build", 100), 101);
        assert_eq!(store.increment("release", 1), 1);
        assert_eq!(store.counters().len(), 2);
    }
}
