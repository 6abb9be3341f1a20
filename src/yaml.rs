//! YAML bundle parser.
//!
//! A bundle carries the API definitions a workflow needs together with the
//! workflow itself, so a demo can be installed from one file.

use crate::definition::ApiDefinition;
use crate::store::Catalog;
use crate::workflow::Workflow;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub apis: Vec<ApiDefinition>,

    pub workflow: Workflow,
}

impl Bundle {
    /// Store every definition and the workflow in the catalog.
    pub fn install(&self, catalog: &Catalog) -> Result<Workflow> {
        for api in &self.apis {
            catalog
                .put_api(api)
                .with_context(|| format!("Failed to store API definition '{}'", api.id))?;
        }

        let stored = catalog
            .put_workflow(&self.workflow)
            .with_context(|| format!("Failed to store workflow '{}'", self.workflow.id))?;

        tracing::info!(
            workflow = %stored.id,
            apis = self.apis.len(),
            "Installed workflow bundle"
        );

        Ok(stored)
    }
}

/// Parse a bundle from a YAML string.
///
/// # Example
///
/// ```rust
/// use api_chain::parse_yaml;
///
/// let yaml = r#"
/// apis:
///   - id: pan
///     name: PAN verification
///     method: POST
///     endpoint: https://sim.local/verify/pan
///     parameters:
///       - name: pan
///         required: true
/// workflow:
///   id: kyc
///   name: kyc
///   steps:
///     - api_id: pan
///       order: 1
/// "#;
///
/// let bundle = parse_yaml(yaml).unwrap();
/// assert_eq!(bundle.workflow.name, "kyc");
/// assert_eq!(bundle.apis.len(), 1);
/// ```
pub fn parse_yaml(yaml: &str) -> Result<Bundle> {
    let bundle: Bundle = serde_yaml::from_str(yaml).context("Failed to parse workflow YAML")?;

    validate(&bundle)?;

    Ok(bundle)
}

/// Load and parse a bundle from a YAML file.
///
/// ```rust,no_run
/// use api_chain::yaml::load_file;
///
/// let bundle = load_file("kyc.yaml")?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_file(path: impl AsRef<Path>) -> Result<Bundle> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;

    parse_yaml(&content)
        .with_context(|| format!("Failed to parse workflow file: {}", path.display()))
}

fn validate(bundle: &Bundle) -> Result<()> {
    for api in &bundle.apis {
        api.validate()?;
    }

    bundle.workflow.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{HttpMethod, ParamLocation};

    const KYC: &str = r#"
apis:
  - id: pan
    name: PAN verification
    method: POST
    endpoint: https://sim.local/verify/pan
    headers:
      - key: x-client-id
        value: demo
        required: true
    parameters:
      - name: pan
        type: string
        location: body
        required: true
  - id: aml
    name: AML check
    method: POST
    endpoint: https://sim.local/aml-check
    parameters:
      - name: name
        required: true
workflow:
  id: kyc
  name: kyc-demo
  description: PAN then AML
  steps:
    - api_id: pan
      order: 1
    - api_id: aml
      order: 2
      wait_time_ms: 500
      mappings:
        - source: "0.holder_name"
          target: name
"#;

    #[test]
    fn test_parse_bundle() {
        let bundle = parse_yaml(KYC).unwrap();

        assert_eq!(bundle.apis.len(), 2);
        assert_eq!(bundle.apis[0].method, HttpMethod::Post);
        assert_eq!(bundle.apis[0].parameters[0].location, ParamLocation::Body);
        assert!(bundle.apis[0].headers[0].required);
        assert_eq!(bundle.workflow.description, Some("PAN then AML".to_string()));
        assert_eq!(bundle.workflow.steps[1].wait_time_ms, Some(500));
        assert_eq!(bundle.workflow.steps[1].mappings[0].source, "0.holder_name");
    }

    #[test]
    fn test_install() {
        let catalog = Catalog::in_memory();
        parse_yaml(KYC).unwrap().install(&catalog).unwrap();

        assert!(catalog.get_api("aml").unwrap().is_some());
        assert!(catalog.is_in_use("pan").unwrap());
    }

    #[test]
    fn test_forward_mapping_rejected() {
        let yaml = r#"
workflow:
  id: bad
  name: bad
  steps:
    - api_id: pan
      order: 1
      mappings:
        - source: "1.id"
          target: id
    - api_id: aml
      order: 2
"#;

        let result = parse_yaml(yaml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("does not run before it"));
    }

    #[test]
    fn test_validate_no_steps() {
        let yaml = r#"
workflow:
  id: empty
  name: empty-workflow
  steps: []
"#;

        let result = parse_yaml(yaml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("at least one step"));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kyc.yaml");
        std::fs::write(&path, KYC).unwrap();

        let bundle = load_file(&path).unwrap();
        assert_eq!(bundle.workflow.id, "kyc");

        assert!(load_file(dir.path().join("missing.yaml")).is_err());
    }
}
