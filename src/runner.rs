//! Workflow execution engine.
//!
//! A [`WorkflowRunner`] drives one run of a workflow, one step per call to
//! [`WorkflowRunner::run_step`]. Steps never run concurrently and never
//! re-run on their own: a failed step parks the run until the caller
//! tries it again.

use crate::context::StepResponses;
use crate::definition::{ApiDefinition, Parameter};
use crate::error::{DefinitionError, ExecutionError, StoreError};
use crate::executor::{self, StepExecutor};
use crate::mapper;
use crate::proxy::Proxy;
use crate::step::WorkflowStep;
use crate::store::Catalog;
use crate::workflow::Workflow;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Position of a run in its lifecycle. Indices are 0-based step positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    StepPending(usize),
    StepExecuting(usize),
    /// Transient: held only between recording a response and advancing
    /// inside `run_step`, so callers observe `StepPending` or `Finished`.
    StepComplete(usize),
    Finished,
    Failed(usize),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::StepPending(i) => write!(f, "step {} pending", i),
            RunState::StepExecuting(i) => write!(f, "step {} executing", i),
            RunState::StepComplete(i) => write!(f, "step {} complete", i),
            RunState::Finished => write!(f, "finished"),
            RunState::Failed(i) => write!(f, "step {} failed", i),
        }
    }
}

/// Result of driving a run to completion.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Final result (last step's output)
    pub result: Value,

    /// Steps executed by this call
    pub step_results: Vec<StepResult>,

    /// Every recorded response of the run
    pub responses: StepResponses,

    /// Total execution time in milliseconds
    pub total_ms: f64,
}

/// Result of a single step execution.
#[derive(Debug)]
pub struct StepResult {
    /// Step index (0-based)
    pub index: usize,

    /// Step that was executed
    pub step: WorkflowStep,

    /// Result of the step
    pub result: Value,

    /// Execution time in milliseconds
    pub duration_ms: f64,
}

/// Executes a workflow step by step.
pub struct WorkflowRunner {
    workflow: Workflow,
    catalog: Catalog,
    executor: StepExecutor,
    honor_wait_time: bool,
    state: RunState,
    current: usize,
    form: Map<String, Value>,
    responses: StepResponses,
}

impl WorkflowRunner {
    /// Prepare a run. The workflow must be structurally valid.
    pub fn new(workflow: Workflow, catalog: Catalog, proxy: Arc<dyn Proxy>) -> Result<Self, DefinitionError> {
        workflow.validate()?;

        Ok(Self {
            workflow,
            catalog,
            executor: StepExecutor::new(proxy),
            honor_wait_time: true,
            state: RunState::Idle,
            current: 0,
            form: Map::new(),
            responses: StepResponses::new(),
        })
    }

    /// Prepare a run of a stored workflow.
    pub fn from_catalog(catalog: Catalog, workflow_id: &str, proxy: Arc<dyn Proxy>) -> Result<Self, StoreError> {
        let workflow = catalog.require_workflow(workflow_id)?;
        Ok(Self::new(workflow, catalog, proxy)?)
    }

    /// Whether step wait times are slept before the request is sent.
    pub fn honor_wait_time(mut self, honor: bool) -> Self {
        self.honor_wait_time = honor;
        self
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Index of the step the next `run_step` call will execute.
    pub fn current_step(&self) -> usize {
        self.current
    }

    pub fn responses(&self) -> &StepResponses {
        &self.responses
    }

    /// User-entered values for the current step.
    pub fn form(&self) -> &Map<String, Value> {
        &self.form
    }

    pub fn set_input<V: Into<Value>>(&mut self, name: &str, value: V) {
        self.form.insert(name.to_string(), value.into());
    }

    /// Replace the whole form of the current step.
    pub fn set_form(&mut self, form: Map<String, Value>) {
        self.form = form;
    }

    /// Definition called by the current step.
    pub fn current_definition(&self) -> Result<ApiDefinition, ExecutionError> {
        let step = &self.workflow.steps[self.current];
        self.catalog
            .get_api(&step.api_id)?
            .ok_or_else(|| ExecutionError::MissingDefinition {
                step: self.current,
                api_id: step.api_id.clone(),
            })
    }

    /// Parameters of the current step the caller must fill in by hand.
    pub fn required_inputs(&self) -> Result<Vec<Parameter>, ExecutionError> {
        let step = &self.workflow.steps[self.current];
        let definition = self.current_definition()?;

        Ok(definition
            .parameters
            .into_iter()
            .filter(|p| p.required && p.default.is_none())
            .filter(|p| !step.mapped_targets().any(|t| t == p.name))
            .collect())
    }

    /// Execute the current step.
    ///
    /// On success the response is recorded and the run advances. On a
    /// validation error nothing is sent and the state is left unchanged.
    /// Any other failure parks the run at `Failed(i)`; calling again
    /// re-attempts the same step.
    pub async fn run_step(&mut self) -> Result<Value, ExecutionError> {
        if self.state == RunState::Finished {
            return Err(ExecutionError::AlreadyFinished);
        }

        let index = self.current;
        let previous = self.state;
        let step = self.workflow.steps[index].clone();
        self.state = RunState::StepExecuting(index);

        tracing::debug!(
            workflow = %self.workflow.name,
            step = index,
            api = %step.api_id,
            "Executing step"
        );

        let definition = match self.current_definition() {
            Ok(definition) => definition,
            Err(e) => return Err(self.fail(index, e)),
        };

        let inputs = self.step_inputs(&step, &definition);
        let request = match executor::build_request(&definition, &inputs) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(step = index, "Step input rejected: {}", e);
                self.state = previous;
                return Err(e);
            }
        };

        if let Some(ms) = step.wait_time_ms.filter(|ms| *ms > 0) {
            if self.honor_wait_time {
                tracing::debug!(step = index, wait_ms = ms, "Waiting before request");
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
        }

        let result = match self.executor.dispatch(&definition.id, &request).await {
            Ok(result) => result,
            Err(e) => return Err(self.fail(index, e)),
        };

        self.responses.insert(index, result.clone());
        self.state = RunState::StepComplete(index);
        tracing::debug!(step = index, "Step completed");

        if index + 1 == self.workflow.steps.len() {
            self.state = RunState::Finished;
            tracing::info!(workflow = %self.workflow.name, "Workflow completed");
        } else {
            self.current = index + 1;
            self.state = RunState::StepPending(self.current);
            self.form.clear();
        }

        Ok(result)
    }

    /// Run every remaining step, asking `form_for` for each step's form values.
    ///
    /// Stops at the first failure (fail-fast), leaving the run parked
    /// where it failed.
    pub async fn run_all<F>(&mut self, mut form_for: F) -> Result<ExecutionResult, ExecutionError>
    where
        F: FnMut(usize, &WorkflowStep) -> Map<String, Value>,
    {
        tracing::info!(
            workflow = %self.workflow.name,
            steps = self.workflow.steps.len(),
            "Starting workflow"
        );

        let start = Instant::now();
        let mut step_results = Vec::new();

        while self.state != RunState::Finished {
            let index = self.current;
            let step = self.workflow.steps[index].clone();
            let step_start = Instant::now();

            let mut form = form_for(index, &step);
            for (k, v) in std::mem::take(&mut self.form) {
                form.entry(k).or_insert(v);
            }
            self.form = form;

            let result = self.run_step().await?;
            let duration_ms = step_start.elapsed().as_secs_f64() * 1000.0;

            tracing::debug!(step = index, duration_ms = duration_ms, "Step timing");

            step_results.push(StepResult {
                index,
                step,
                result,
                duration_ms,
            });
        }

        let total_ms = start.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            workflow = %self.workflow.name,
            total_ms = total_ms,
            "Workflow run finished"
        );

        Ok(ExecutionResult {
            result: self.responses.last().cloned().unwrap_or(Value::Null),
            step_results,
            responses: self.responses.clone(),
            total_ms,
        })
    }

    /// Inputs for a step: defaults, overlaid by mapped values, overlaid by the form.
    fn step_inputs(&self, step: &WorkflowStep, definition: &ApiDefinition) -> Map<String, Value> {
        let defaults = definition
            .parameters
            .iter()
            .filter_map(|p| p.default.clone().map(|v| (p.name.clone(), v)))
            .collect();

        let mapped = mapper::extract(&self.responses, &step.mappings);

        mapper::merge_inputs(defaults, mapped, &self.form)
    }

    fn fail(&mut self, index: usize, error: ExecutionError) -> ExecutionError {
        tracing::warn!(workflow = %self.workflow.name, step = index, "Step failed: {}", error);
        self.state = RunState::Failed(index);
        error
    }
}
