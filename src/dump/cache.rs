//! Per-namespace record of instance fetch outcomes
//!
//! Several classes of one namespace often enumerate the same instance
//! (a subclass instance shows up under every ancestor). The cache makes
//! sure each canonical path is fetched at most once per namespace.

use crate::error::WbemError;
use std::collections::HashMap;

/// Fetch outcome per canonical instance path
///
/// A key that is absent has not been attempted yet. `None` means the
/// instance was fetched and written, `Some(err)` means the fetch failed.
/// Either way the path is never attempted again.
#[derive(Debug, Default)]
pub struct InstanceCache {
    outcomes: HashMap<String, Option<WbemError>>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            outcomes: HashMap::with_capacity(capacity),
        }
    }

    /// True if the path was already attempted, successfully or not
    pub fn contains(&self, key: &str) -> bool {
        self.outcomes.contains_key(key)
    }

    pub fn record_success(&mut self, key: String) {
        self.outcomes.insert(key, None);
    }

    pub fn record_failure(&mut self, key: String, error: WbemError) {
        self.outcomes.insert(key, Some(error));
    }

    /// Recorded outcome for a key
    pub fn outcome(&self, key: &str) -> Option<Option<&WbemError>> {
        self.outcomes.get(key).map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Failed fetches, ordered by path
    pub fn failures(&self) -> Vec<(&str, &WbemError)> {
        let mut failures: Vec<(&str, &WbemError)> = self
            .outcomes
            .iter()
            .filter_map(|(key, outcome)| outcome.as_ref().map(|e| (key.as_str(), e)))
            .collect();
        failures.sort_by(|a, b| a.0.cmp(b.0));
        failures
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_some()).count()
    }
}
