//! Workflow step definitions.

use crate::error::DefinitionError;
use serde::{Deserialize, Serialize};

/// Copies one field of an earlier step's response into a request parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMapping {
    /// Source path, encoded as `stepIndex.fieldName` (0-based step index)
    pub source: String,

    /// Parameter name in this step's request
    pub target: String,
}

impl ResponseMapping {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    /// Build a mapping from its parts.
    pub fn from_step(step_index: usize, field: &str, target: &str) -> Self {
        Self {
            source: format!("{}.{}", step_index, field),
            target: target.to_string(),
        }
    }

    /// Split the source on its first separator into `(stepIndex, fieldName)`.
    pub fn source_parts(&self) -> Result<(usize, &str), DefinitionError> {
        let (index, field) = self
            .source
            .split_once('.')
            .ok_or_else(|| DefinitionError::MalformedMapping(self.source.clone()))?;

        let index = index
            .trim()
            .parse::<usize>()
            .map_err(|_| DefinitionError::MalformedMapping(self.source.clone()))?;

        if field.is_empty() {
            return Err(DefinitionError::MalformedMapping(self.source.clone()));
        }

        Ok((index, field))
    }
}

/// A single step in a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Identifier of the API definition to call
    pub api_id: String,

    /// 1-based position in the workflow
    pub order: u32,

    /// Delay before issuing this step's request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time_ms: Option<u64>,

    #[serde(default)]
    pub mappings: Vec<ResponseMapping>,
}

impl WorkflowStep {
    /// Create a step calling the given API definition.
    pub fn call(api_id: &str) -> StepBuilder {
        StepBuilder::new(api_id)
    }

    /// Parameter names filled from earlier responses.
    pub fn mapped_targets(&self) -> impl Iterator<Item = &str> {
        self.mappings.iter().map(|m| m.target.as_str())
    }
}

/// Builder for creating workflow steps.
///
/// The order is assigned when the step is added to a workflow.
#[derive(Debug, Clone)]
pub struct StepBuilder {
    step: WorkflowStep,
}

impl StepBuilder {
    pub fn new(api_id: &str) -> Self {
        Self {
            step: WorkflowStep {
                api_id: api_id.to_string(),
                order: 0,
                wait_time_ms: None,
                mappings: Vec::new(),
            },
        }
    }

    /// Map `field` of step `step_index`'s response onto parameter `target`.
    pub fn map(mut self, step_index: usize, field: &str, target: &str) -> Self {
        self.step
            .mappings
            .push(ResponseMapping::from_step(step_index, field, target));
        self
    }

    /// Add a mapping from an encoded `stepIndex.fieldName` source.
    pub fn with_mapping(mut self, source: &str, target: &str) -> Self {
        self.step.mappings.push(ResponseMapping::new(source, target));
        self
    }

    pub fn wait_ms(mut self, ms: u64) -> Self {
        self.step.wait_time_ms = Some(ms);
        self
    }

    pub fn build(self) -> WorkflowStep {
        self.step
    }
}

impl From<StepBuilder> for WorkflowStep {
    fn from(builder: StepBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_builder() {
        let step = WorkflowStep::call("aml")
            .map(0, "holder_name", "name")
            .wait_ms(250)
            .build();

        assert_eq!(step.api_id, "aml");
        assert_eq!(step.wait_time_ms, Some(250));
        assert_eq!(step.mappings[0].source, "0.holder_name");
        assert_eq!(step.mapped_targets().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn test_source_parts_splits_on_first_separator() {
        let mapping = ResponseMapping::new("1.data.name", "name");
        assert_eq!(mapping.source_parts().unwrap(), (1, "data.name"));
    }

    #[test]
    fn test_malformed_sources() {
        for source in ["holder_name", "x.name", "0.", "-1.name"] {
            let mapping = ResponseMapping::new(source, "name");
            assert!(
                matches!(mapping.source_parts(), Err(DefinitionError::MalformedMapping(_))),
                "{source} should be rejected"
            );
        }
    }
}
