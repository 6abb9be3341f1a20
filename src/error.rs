//! Error types shared across the crate.

use thiserror::Error;

/// Errors raised while executing a workflow step.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Input is incomplete; no request was sent.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response body: {0}")]
    Decode(String),

    /// Target API answered with a non-2xx status.
    #[error("Upstream returned status {status}: {}", .message.as_deref().unwrap_or("no message"))]
    UpstreamStatus { status: u16, message: Option<String> },

    #[error("Step {step} references unknown API definition '{api_id}'")]
    MissingDefinition { step: usize, api_id: String },

    #[error("Workflow run already finished")]
    AlreadyFinished,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ExecutionError {
    /// Whether the error was raised before any network call was made.
    pub fn is_validation(&self) -> bool {
        matches!(self, ExecutionError::Validation(_))
    }
}

/// Errors raised by persistence collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    Invalid(#[from] DefinitionError),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Structural problems in API definitions or workflows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("API definition '{0}' has an empty endpoint")]
    EmptyEndpoint(String),

    #[error("API definition '{api}' declares parameter '{name}' more than once")]
    DuplicateParameter { api: String, name: String },

    #[error("Workflow name cannot be empty")]
    EmptyName,

    #[error("Workflow must have at least one step")]
    NoSteps,

    #[error("Step orders must be contiguous from 1: expected {expected}, found {found}")]
    StepOrder { expected: u32, found: u32 },

    #[error("Step {step} has an empty API reference")]
    EmptyApiReference { step: usize },

    #[error("Invalid response mapping source '{0}': expected 'stepIndex.fieldName'")]
    MalformedMapping(String),

    #[error("Step {step} maps from step {source_step}, which does not run before it")]
    ForwardMapping { step: usize, source_step: usize },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
