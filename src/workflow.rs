//! Workflow definition and builder.

use crate::error::DefinitionError;
use crate::step::{StepBuilder, WorkflowStep};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ordered chain of API calls with data flowing between steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Steps to execute, in order
    pub steps: Vec<WorkflowStep>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create a new workflow with a name.
    pub fn new(name: &str) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    /// Whether any step calls the given API definition.
    pub fn references(&self, api_id: &str) -> bool {
        self.steps.iter().any(|s| s.api_id == api_id)
    }

    /// Check structural invariants.
    ///
    /// Step orders must run 1..=n and every mapping must read from a step
    /// that executes earlier. Dangling API references are not checked here.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::EmptyName);
        }

        if self.steps.is_empty() {
            return Err(DefinitionError::NoSteps);
        }

        for (index, step) in self.steps.iter().enumerate() {
            let expected = index as u32 + 1;
            if step.order != expected {
                return Err(DefinitionError::StepOrder {
                    expected,
                    found: step.order,
                });
            }

            if step.api_id.trim().is_empty() {
                return Err(DefinitionError::EmptyApiReference { step: index });
            }

            for mapping in &step.mappings {
                let (source_step, _) = mapping.source_parts()?;
                if source_step >= index {
                    return Err(DefinitionError::ForwardMapping {
                        step: index,
                        source_step,
                    });
                }
            }
        }

        Ok(())
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Builder for creating workflows.
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            workflow: Workflow {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                description: None,
                steps: Vec::new(),
                created_at: now,
                updated_at: now,
            },
        }
    }

    /// Override the generated id.
    pub fn id(mut self, id: &str) -> Self {
        self.workflow.id = id.to_string();
        self
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.workflow.description = Some(desc.to_string());
        self
    }

    /// Append a step, numbering it after the existing ones.
    pub fn add<S: Into<WorkflowStep>>(mut self, step: S) -> Self {
        let mut step = step.into();
        step.order = self.workflow.steps.len() as u32 + 1;
        self.workflow.steps.push(step);
        self
    }

    pub fn step(self, step: StepBuilder) -> Self {
        self.add(step.build())
    }

    pub fn build(self) -> Workflow {
        self.workflow
    }
}

impl From<WorkflowBuilder> for Workflow {
    fn from(builder: WorkflowBuilder) -> Self {
        builder.build()
    }
}
