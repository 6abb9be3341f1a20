//! Reusable third-party API definitions.

use crate::error::DefinitionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// HTTP method of an API definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }

    /// GET requests never carry a body.
    pub fn allows_body(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Number,
    Boolean,
    Object,
}

/// Where a parameter travels in the outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    #[default]
    Body,
}

/// A static header attached to every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub required: bool,
}

/// A parameter accepted by an API definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    #[serde(rename = "type", default)]
    pub param_type: ParamType,

    #[serde(default)]
    pub location: ParamLocation,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Parameter {
    pub fn new(name: &str, location: ParamLocation) -> Self {
        Self {
            name: name.to_string(),
            param_type: ParamType::String,
            location,
            required: false,
            default: None,
            description: None,
        }
    }

    pub fn of_type(mut self, param_type: ParamType) -> Self {
        self.param_type = param_type;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default<V: Into<Value>>(mut self, value: V) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }
}

/// Description of one third-party HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDefinition {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub method: HttpMethod,

    /// Endpoint URL; path placeholders use `{{name}}`
    pub endpoint: String,

    #[serde(default)]
    pub headers: Vec<Header>,

    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl ApiDefinition {
    /// Start building a definition with a freshly generated id.
    pub fn new(name: &str, method: HttpMethod, endpoint: &str) -> ApiDefinitionBuilder {
        ApiDefinitionBuilder::new(name, method, endpoint)
    }

    /// Look up a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.endpoint.trim().is_empty() {
            return Err(DefinitionError::EmptyEndpoint(self.id.clone()));
        }

        let mut seen = HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(DefinitionError::DuplicateParameter {
                    api: self.id.clone(),
                    name: param.name.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Builder for API definitions.
#[derive(Debug, Clone)]
pub struct ApiDefinitionBuilder {
    definition: ApiDefinition,
}

impl ApiDefinitionBuilder {
    pub fn new(name: &str, method: HttpMethod, endpoint: &str) -> Self {
        Self {
            definition: ApiDefinition {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                description: None,
                method,
                endpoint: endpoint.to_string(),
                headers: Vec::new(),
                parameters: Vec::new(),
            },
        }
    }

    /// Override the generated id.
    pub fn id(mut self, id: &str) -> Self {
        self.definition.id = id.to_string();
        self
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.definition.description = Some(desc.to_string());
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.definition.headers.push(Header {
            key: key.to_string(),
            value: value.to_string(),
            required: false,
        });
        self
    }

    pub fn required_header(mut self, key: &str, value: &str) -> Self {
        self.definition.headers.push(Header {
            key: key.to_string(),
            value: value.to_string(),
            required: true,
        });
        self
    }

    pub fn param(mut self, param: Parameter) -> Self {
        self.definition.parameters.push(param);
        self
    }

    pub fn build(self) -> ApiDefinition {
        self.definition
    }
}

impl From<ApiDefinitionBuilder> for ApiDefinition {
    fn from(builder: ApiDefinitionBuilder) -> Self {
        builder.build()
    }
}
