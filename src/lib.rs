//! # api-chain
//!
//! Chain reusable third-party API definitions into linear workflows.
//!
//! Each step calls one API through a proxy collaborator; fields of earlier
//! responses can be mapped onto parameters of later requests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use api_chain::{ApiDefinition, Catalog, Config, HttpMethod, ParamLocation, Parameter};
//! use api_chain::{Workflow, WorkflowRunner, WorkflowStep};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let catalog = Catalog::in_memory();
//! catalog.put_api(
//!     &ApiDefinition::new("PAN", HttpMethod::Post, "https://sim.local/verify/pan")
//!         .id("pan")
//!         .param(Parameter::new("pan", ParamLocation::Body).required())
//!         .build(),
//! )?;
//! catalog.put_api(
//!     &ApiDefinition::new("AML", HttpMethod::Post, "https://sim.local/aml-check")
//!         .id("aml")
//!         .param(Parameter::new("name", ParamLocation::Body).required())
//!         .build(),
//! )?;
//!
//! let workflow = Workflow::new("kyc")
//!     .step(WorkflowStep::call("pan"))
//!     .step(WorkflowStep::call("aml").map(0, "holder_name", "name"))
//!     .build();
//!
//! let proxy = Config::from_env().build_proxy()?;
//! let mut runner = WorkflowRunner::new(workflow, catalog, proxy)?;
//! runner.set_input("pan", "ABCDE1234F");
//! runner.run_step().await?;
//! runner.run_step().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## YAML Bundle
//!
//! ```yaml
//! apis:
//!   - id: aml
//!     name: AML check
//!     method: POST
//!     endpoint: https://sim.local/aml-check
//!     parameters:
//!       - name: name
//!         required: true
//! workflow:
//!   id: screen
//!   name: screen
//!   steps:
//!     - api_id: aml
//!       order: 1
//! ```

pub mod config;
mod context;
mod definition;
pub mod error;
pub mod executor;
pub mod mapper;
pub mod proxy;
mod runner;
mod step;
pub mod store;
mod workflow;
pub mod yaml;

pub use config::Config;
pub use context::StepResponses;
pub use definition::{
    ApiDefinition, ApiDefinitionBuilder, Header, HttpMethod, ParamLocation, ParamType, Parameter,
};
pub use error::{DefinitionError, ExecutionError, StoreError};
pub use executor::StepExecutor;
pub use proxy::{DirectProxy, Proxy, ProxyRequest, ProxyResponse, RelayProxy};
pub use runner::{ExecutionResult, RunState, StepResult, WorkflowRunner};
pub use step::{ResponseMapping, StepBuilder, WorkflowStep};
pub use store::{Catalog, JsonFileStore, MemoryStore, Store};
pub use workflow::{Workflow, WorkflowBuilder};
pub use yaml::{parse_yaml, Bundle};

/// Re-export common types
pub use serde_json::Value;
