//! Per-run table of step responses.

use serde_json::Value;
use std::collections::BTreeMap;

/// Raw JSON responses of the steps executed so far, keyed by 0-based step index.
///
/// Owned by a single run and dropped with it.
#[derive(Debug, Default, Clone)]
pub struct StepResponses {
    responses: BTreeMap<usize, Value>,
}

impl StepResponses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the response of a step, replacing any earlier attempt.
    pub fn insert(&mut self, index: usize, value: Value) {
        self.responses.insert(index, value);
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.responses.get(&index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.responses.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Response of the highest step index recorded.
    pub fn last(&self) -> Option<&Value> {
        self.responses.values().next_back()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Value)> {
        self.responses.iter().map(|(k, v)| (*k, v))
    }

    /// All responses as a JSON object keyed by step index.
    pub fn as_json(&self) -> Value {
        let map = self
            .responses
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Value::Object(map)
    }
}
