//! Outbound HTTP collaborators.
//!
//! The step executor never talks to the network itself. It hands a
//! [`ProxyRequest`] to a [`Proxy`] and interprets the [`ProxyResponse`].

use crate::definition::HttpMethod;
use crate::error::ExecutionError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Request envelope handed to the proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub endpoint: String,
    pub method: HttpMethod,
    /// Sent as a JSON object, keys in configured order
    #[serde(default, with = "header_map")]
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

mod header_map {
    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(headers: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(headers.iter().map(|(k, v)| (k, v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<(String, String)>, D::Error> {
        struct HeaderVisitor;

        impl<'de> Visitor<'de> for HeaderVisitor {
            type Value = Vec<(String, String)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of header names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut headers = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, String>()? {
                    headers.push(entry);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeaderVisitor)
    }
}

/// Raw status and body returned by the proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: String,
}

impl ProxyResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Proxy: Send + Sync {
    /// Perform the call. Only transport-level failures are errors.
    async fn send(&self, request: &ProxyRequest) -> Result<ProxyResponse, ExecutionError>;
}

fn build_client(timeout: Duration, connect_timeout: Duration) -> anyhow::Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .build()?)
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

/// Calls the target API directly.
///
/// Relative endpoints are joined onto the base URL, if one is set.
pub struct DirectProxy {
    client: Client,
    base_url: Option<Url>,
}

impl DirectProxy {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(timeout, connect_timeout)?,
            base_url: None,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> anyhow::Result<Self> {
        self.base_url = Some(Url::parse(base_url)?);
        Ok(self)
    }

    fn resolve(&self, endpoint: &str) -> Result<Url, ExecutionError> {
        let resolved = match self.base_url {
            Some(ref base) => base.join(endpoint),
            None => Url::parse(endpoint),
        };
        resolved.map_err(|e| ExecutionError::Transport(format!("cannot resolve endpoint '{}': {}", endpoint, e)))
    }
}

#[async_trait]
impl Proxy for DirectProxy {
    async fn send(&self, request: &ProxyRequest) -> Result<ProxyResponse, ExecutionError> {
        let url = self.resolve(&request.endpoint)?;
        let mut builder = self.client.request(to_reqwest(request.method), url);

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        if let Some(ref data) = request.data {
            builder = builder.json(data);
        }

        tracing::debug!(endpoint = %request.endpoint, method = %request.method, "Sending request");

        let response = builder
            .send()
            .await
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;

        Ok(ProxyResponse { status, body })
    }
}

/// Envelope returned by a relay endpoint.
#[derive(Debug, Deserialize)]
struct RelayEnvelope {
    status: u16,
    #[serde(default)]
    body: Value,
}

/// Forwards the request envelope to a generic proxy endpoint, which performs
/// the real call and answers with `{status, body}`.
pub struct RelayProxy {
    client: Client,
    relay_url: String,
}

impl RelayProxy {
    pub fn new(relay_url: &str, timeout: Duration, connect_timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(timeout, connect_timeout)?,
            relay_url: relay_url.to_string(),
        })
    }
}

#[async_trait]
impl Proxy for RelayProxy {
    async fn send(&self, request: &ProxyRequest) -> Result<ProxyResponse, ExecutionError> {
        tracing::debug!(
            relay = %self.relay_url,
            endpoint = %request.endpoint,
            method = %request.method,
            "Relaying request"
        );

        let response = self
            .client
            .post(&self.relay_url)
            .json(request)
            .send()
            .await
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExecutionError::Transport(format!(
                "relay answered with status {}",
                response.status()
            )));
        }

        let envelope: RelayEnvelope = response
            .json()
            .await
            .map_err(|e| ExecutionError::Transport(format!("unreadable relay envelope: {}", e)))?;

        let body = match envelope.body {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };

        Ok(ProxyResponse {
            status: envelope.status,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let request = ProxyRequest {
            endpoint: "https://sim.local/aml-check".to_string(),
            method: HttpMethod::Post,
            headers: vec![("x-client-id".to_string(), "demo".to_string())],
            data: Some(json!({"name": "Jane Doe"})),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["method"], json!("POST"));
        assert_eq!(value["headers"], json!({"x-client-id": "demo"}));
        assert_eq!(value["data"]["name"], json!("Jane Doe"));
    }

    #[test]
    fn test_headers_keep_order() {
        let request = ProxyRequest {
            endpoint: "/aml-check".to_string(),
            method: HttpMethod::Post,
            headers: vec![
                ("x-trace".to_string(), "1".to_string()),
                ("authorization".to_string(), "Bearer t".to_string()),
            ],
            data: None,
        };

        let text = serde_json::to_string(&request).unwrap();
        assert!(text.contains(r#""headers":{"x-trace":"1","authorization":"Bearer t"}"#));

        let parsed: ProxyRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_get_envelope_omits_data() {
        let request = ProxyRequest {
            endpoint: "https://sim.local/rc".to_string(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            data: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_success_range() {
        let ok = ProxyResponse { status: 204, body: String::new() };
        let bad = ProxyResponse { status: 302, body: String::new() };
        assert!(ok.is_success());
        assert!(!bad.is_success());
    }

    #[test]
    fn test_direct_proxy_resolves_relative_endpoints() {
        let proxy = DirectProxy::new(Duration::from_secs(2), Duration::from_secs(1))
            .unwrap()
            .with_base_url("https://sim.local/api/")
            .unwrap();

        assert_eq!(proxy.resolve("verify/pan").unwrap().as_str(), "https://sim.local/api/verify/pan");
        assert_eq!(proxy.resolve("/aml-check").unwrap().as_str(), "https://sim.local/aml-check");

        let bare = DirectProxy::new(Duration::from_secs(2), Duration::from_secs(1)).unwrap();
        assert!(matches!(bare.resolve("/aml-check"), Err(ExecutionError::Transport(_))));
    }

    #[tokio::test]
    async fn test_direct_proxy_connection_refused() {
        let proxy = DirectProxy::new(Duration::from_secs(2), Duration::from_secs(1)).unwrap();
        let request = ProxyRequest {
            endpoint: "http://127.0.0.1:1/unreachable".to_string(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            data: None,
        };

        let err = proxy.send(&request).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Transport(_)));
    }
}
