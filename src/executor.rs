//! Single-step execution: request construction, proxy call, response parsing.

use crate::definition::{ApiDefinition, ParamLocation};
use crate::error::ExecutionError;
use crate::mapper;
use crate::proxy::{Proxy, ProxyRequest, ProxyResponse};
use handlebars::Handlebars;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::{Map, Value};
use std::sync::Arc;
use url::{form_urlencoded, ParseError, Url};

/// Characters escaped in a path value so it stays a single segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Issues one HTTP call per workflow step through a [`Proxy`].
///
/// Holds no state between invocations.
#[derive(Clone)]
pub struct StepExecutor {
    proxy: Arc<dyn Proxy>,
}

impl StepExecutor {
    pub fn new(proxy: Arc<dyn Proxy>) -> Self {
        Self { proxy }
    }

    /// Execute one API call with fully merged input values.
    ///
    /// # Returns
    /// * `Ok(Value)` - decoded JSON body of a 2xx response (`null` if empty)
    /// * `Err(Validation)` - input incomplete, nothing was sent
    /// * `Err(Transport | Decode | UpstreamStatus)` - the call itself failed
    pub async fn execute(
        &self,
        definition: &ApiDefinition,
        inputs: &Map<String, Value>,
    ) -> Result<Value, ExecutionError> {
        let request = build_request(definition, inputs)?;
        self.dispatch(&definition.id, &request).await
    }

    /// Send an already built request and parse the reply.
    pub async fn dispatch(&self, api_id: &str, request: &ProxyRequest) -> Result<Value, ExecutionError> {
        tracing::debug!(
            api = api_id,
            method = %request.method,
            endpoint = %request.endpoint,
            "Executing API call"
        );

        let response = self.proxy.send(request).await?;

        tracing::debug!(api = api_id, status = response.status, "API call returned");

        parse_response(&response)
    }
}

/// Build the outbound request for a definition.
///
/// Path values are rendered into the endpoint template, query values are
/// appended to the URL, and body values become a JSON object payload.
/// GET requests never carry a body.
pub fn build_request(
    definition: &ApiDefinition,
    inputs: &Map<String, Value>,
) -> Result<ProxyRequest, ExecutionError> {
    check_required(definition, inputs)?;

    let mut path_values = Map::new();
    let mut query = Vec::new();
    let mut body = Map::new();

    for param in &definition.parameters {
        let Some(value) = present(inputs, &param.name) else {
            continue;
        };

        match param.location {
            ParamLocation::Path => {
                let segment = utf8_percent_encode(&scalar_text(value), PATH_SEGMENT).to_string();
                path_values.insert(param.name.clone(), Value::String(segment));
            }
            ParamLocation::Query => query.push((param.name.as_str(), scalar_text(value))),
            ParamLocation::Body => {
                body.insert(param.name.clone(), value.clone());
            }
        }
    }

    for name in inputs.keys() {
        if definition.parameter(name).is_none() {
            tracing::debug!(api = %definition.id, param = %name, "Ignoring undeclared input");
        }
    }

    let endpoint = render_endpoint(&definition.endpoint, &path_values)?;
    let endpoint = with_query(&endpoint, &query)?;

    let data = if !definition.method.allows_body() {
        if !body.is_empty() {
            tracing::debug!(api = %definition.id, "Dropping body parameters on GET request");
        }
        None
    } else if body.is_empty() {
        None
    } else {
        Some(Value::Object(body))
    };

    let headers = definition
        .headers
        .iter()
        .map(|h| (h.key.clone(), h.value.clone()))
        .collect();

    Ok(ProxyRequest {
        endpoint,
        method: definition.method,
        headers,
        data,
    })
}

/// Interpret a proxy response.
pub fn parse_response(response: &ProxyResponse) -> Result<Value, ExecutionError> {
    if !response.is_success() {
        let message = serde_json::from_str::<Value>(&response.body)
            .ok()
            .and_then(|body| {
                mapper::field(&body, "error")
                    .or_else(|| mapper::field(&body, "detail"))
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
            });

        return Err(ExecutionError::UpstreamStatus {
            status: response.status,
            message,
        });
    }

    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&response.body).map_err(|e| ExecutionError::Decode(e.to_string()))
}

/// Names of required parameters that have no value.
pub fn missing_required<'a>(definition: &'a ApiDefinition, inputs: &Map<String, Value>) -> Vec<&'a str> {
    definition
        .parameters
        .iter()
        .filter(|p| p.required && present(inputs, &p.name).is_none())
        .map(|p| p.name.as_str())
        .collect()
}

fn check_required(definition: &ApiDefinition, inputs: &Map<String, Value>) -> Result<(), ExecutionError> {
    if let Some(header) = definition
        .headers
        .iter()
        .find(|h| h.required && h.value.trim().is_empty())
    {
        return Err(ExecutionError::Validation(format!(
            "required header '{}' has no value",
            header.key
        )));
    }

    let missing = missing_required(definition, inputs);
    if !missing.is_empty() {
        return Err(ExecutionError::Validation(format!(
            "missing required parameter(s) for '{}': {}",
            definition.name,
            missing.join(", ")
        )));
    }

    Ok(())
}

fn present<'a>(inputs: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    inputs.get(name).filter(|v| !v.is_null())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_endpoint(template: &str, path_values: &Map<String, Value>) -> Result<String, ExecutionError> {
    let mut hb = Handlebars::new();
    hb.set_strict_mode(true);
    hb.register_escape_fn(handlebars::no_escape);

    let rendered = hb
        .render_template(template, path_values)
        .map_err(|e| ExecutionError::Validation(format!("cannot resolve endpoint '{}': {}", template, e)))?;

    if rendered.trim().is_empty() {
        return Err(ExecutionError::Validation(format!("endpoint '{}' renders empty", template)));
    }

    Ok(rendered)
}

/// Append query pairs to an endpoint.
///
/// Absolute endpoints are checked as URLs. Relative ones are passed through
/// for the proxy to resolve.
fn with_query(endpoint: &str, query: &[(&str, String)]) -> Result<String, ExecutionError> {
    match Url::parse(endpoint) {
        Ok(mut url) => {
            if !query.is_empty() {
                let mut pairs = url.query_pairs_mut();
                for (name, value) in query {
                    pairs.append_pair(name, value);
                }
            }
            Ok(url.to_string())
        }
        Err(ParseError::RelativeUrlWithoutBase) => {
            if query.is_empty() {
                return Ok(endpoint.to_string());
            }

            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (name, value) in query {
                serializer.append_pair(name, value);
            }

            let separator = if endpoint.contains('?') { '&' } else { '?' };
            Ok(format!("{}{}{}", endpoint, separator, serializer.finish()))
        }
        Err(e) => Err(ExecutionError::Validation(format!("invalid endpoint '{}': {}", endpoint, e))),
    }
}
