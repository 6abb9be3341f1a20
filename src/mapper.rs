//! Response mapping between workflow steps.

use crate::context::StepResponses;
use crate::step::ResponseMapping;
use serde_json::{Map, Value};

/// Read a single top-level field of a JSON response.
///
/// Only objects have fields; every other JSON kind yields `None`.
pub fn field<'a>(response: &'a Value, name: &str) -> Option<&'a Value> {
    match response {
        Value::Object(map) => map.get(name),
        _ => None,
    }
}

/// Extract mapped values from earlier step responses.
///
/// Mappings whose source step has no recorded response, whose field is
/// missing, or whose source is malformed are left out of the result.
pub fn extract(prior: &StepResponses, mappings: &[ResponseMapping]) -> Map<String, Value> {
    let mut values = Map::new();

    for mapping in mappings {
        let (index, name) = match mapping.source_parts() {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(source = %mapping.source, "Skipping mapping: {}", e);
                continue;
            }
        };

        let Some(response) = prior.get(index) else {
            tracing::debug!(step = index, param = %mapping.target, "No response yet for mapped step");
            continue;
        };

        match field(response, name) {
            Some(value) => {
                values.insert(mapping.target.clone(), value.clone());
            }
            None => {
                tracing::debug!(step = index, field = name, "Mapped field not present in response");
            }
        }
    }

    values
}

/// Merge step inputs with explicit precedence: defaults, then mapped values,
/// then user-entered values.
pub fn merge_inputs(
    defaults: Map<String, Value>,
    mapped: Map<String, Value>,
    user: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = defaults;
    merged.extend(mapped);
    merged.extend(user.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
