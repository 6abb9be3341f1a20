use api_chain::{
    parse_yaml, Catalog, ExecutionError, JsonFileStore, Proxy, ProxyRequest, ProxyResponse,
    RunState, WorkflowRunner,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("api_chain=debug"))
        .with_test_writer()
        .try_init();
}

/// Answers by endpoint path, like the demo's API simulators.
#[derive(Default)]
struct Simulator {
    routes: HashMap<String, (u16, Value)>,
    seen: Mutex<Vec<ProxyRequest>>,
}

impl Simulator {
    fn route(mut self, path: &str, status: u16, body: Value) -> Self {
        self.routes.insert(path.to_string(), (status, body));
        self
    }

    fn requests(&self) -> Vec<ProxyRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Proxy for Simulator {
    async fn send(&self, request: &ProxyRequest) -> Result<ProxyResponse, ExecutionError> {
        self.seen.lock().unwrap().push(request.clone());

        let url = url::Url::parse("https://sim.local")
            .and_then(|base| base.join(&request.endpoint))
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;
        match self.routes.get(url.path()) {
            Some((status, body)) => Ok(ProxyResponse {
                status: *status,
                body: body.to_string(),
            }),
            None => Err(ExecutionError::Transport("connection refused".to_string())),
        }
    }
}

const BUNDLE: &str = r#"
apis:
  - id: pan
    name: PAN verification
    method: POST
    endpoint: https://sim.local/verify/pan
    headers:
      - key: x-client-id
        value: demo
    parameters:
      - name: pan
        required: true
  - id: aml
    name: AML check
    method: POST
    endpoint: https://sim.local/aml-check
    parameters:
      - name: name
        required: true
      - name: threshold
        type: number
        default: 80
  - id: rc
    name: RC challan lookup
    method: GET
    endpoint: "https://sim.local/rc/{{rc_number}}"
    parameters:
      - name: rc_number
        location: path
        required: true
      - name: name
        location: body
workflow:
  id: kyc
  name: kyc-demo
  steps:
    - api_id: pan
      order: 1
    - api_id: aml
      order: 2
      mappings:
        - source: "0.holder_name"
          target: name
    - api_id: rc
      order: 3
      mappings:
        - source: "0.holder_name"
          target: name
"#;

fn simulator() -> Simulator {
    Simulator::default()
        .route("/verify/pan", 200, json!({"pan_valid": true, "holder_name": "Jane Doe"}))
        .route("/aml-check", 200, json!({"hits": []}))
        .route("/rc/KA01AB1234", 200, json!({"challans": 0}))
}

fn form(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[tokio::test]
async fn test_mapped_value_reaches_next_request() {
    init_tracing();

    let catalog = Catalog::in_memory();
    parse_yaml(BUNDLE).unwrap().install(&catalog).unwrap();

    let proxy = Arc::new(simulator());
    let mut runner = WorkflowRunner::from_catalog(catalog, "kyc", proxy.clone()).unwrap();

    let result = runner
        .run_all(|index, _| match index {
            0 => form(&[("pan", json!("ABCDE1234F"))]),
            2 => form(&[("rc_number", json!("KA01AB1234"))]),
            _ => Map::new(),
        })
        .await
        .unwrap();

    assert_eq!(runner.state(), RunState::Finished);
    assert_eq!(result.responses.len(), 3);
    assert_eq!(result.result, json!({"challans": 0}));

    let requests = proxy.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].headers, vec![("x-client-id".to_string(), "demo".to_string())]);
    assert_eq!(requests[1].data, Some(json!({"name": "Jane Doe", "threshold": 80})));

    // GET step: mapped body parameter is never sent
    assert_eq!(requests[2].endpoint, "https://sim.local/rc/KA01AB1234");
    assert_eq!(requests[2].data, None);
}

#[tokio::test]
async fn test_missing_form_value_is_rejected_before_any_call() {
    init_tracing();

    let catalog = Catalog::in_memory();
    parse_yaml(BUNDLE).unwrap().install(&catalog).unwrap();

    let proxy = Arc::new(simulator());
    let mut runner = WorkflowRunner::from_catalog(catalog, "kyc", proxy.clone()).unwrap();

    let err = runner.run_step().await.unwrap_err();
    assert!(matches!(err, ExecutionError::Validation(_)));
    assert_eq!(runner.state(), RunState::Idle);
    assert!(proxy.requests().is_empty());
}

#[tokio::test]
async fn test_upstream_failure_then_corrected_retry() {
    init_tracing();

    let catalog = Catalog::in_memory();
    parse_yaml(BUNDLE).unwrap().install(&catalog).unwrap();

    let proxy = Arc::new(simulator());
    let mut runner = WorkflowRunner::from_catalog(catalog, "kyc", proxy.clone()).unwrap();

    runner.set_input("pan", "ABCDE1234F");
    runner.run_step().await.unwrap();
    runner.run_step().await.unwrap();
    let before = runner.responses().clone();

    // Unknown vehicle: the simulator has no route for it
    runner.set_input("rc_number", "XX00");
    let err = runner.run_step().await.unwrap_err();
    assert!(matches!(err, ExecutionError::Transport(_)));
    assert_eq!(runner.state(), RunState::Failed(2));
    assert_eq!(runner.responses().get(0), before.get(0));
    assert_eq!(runner.responses().get(1), before.get(1));

    runner.set_input("rc_number", "KA01AB1234");
    runner.run_step().await.unwrap();
    assert_eq!(runner.state(), RunState::Finished);
}

#[tokio::test]
async fn test_runs_from_file_store() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    {
        let catalog = Catalog::new(Arc::new(JsonFileStore::open(&path).unwrap()));
        parse_yaml(BUNDLE).unwrap().install(&catalog).unwrap();
    }

    let catalog = Catalog::new(Arc::new(JsonFileStore::open(&path).unwrap()));
    assert_eq!(catalog.list_apis().unwrap().len(), 3);

    let proxy = Arc::new(simulator());
    let mut runner = WorkflowRunner::from_catalog(catalog, "kyc", proxy).unwrap();
    runner.set_input("pan", "ABCDE1234F");
    let response = runner.run_step().await.unwrap();
    assert_eq!(response["holder_name"], json!("Jane Doe"));
}

const RELATIVE_KYC: &str = r#"
apis:
  - id: pan
    name: PAN verification
    method: POST
    endpoint: /verify/pan
    parameters:
      - name: pan
        required: true
  - id: aml
    name: AML check
    method: POST
    endpoint: /aml-check
    parameters:
      - name: name
        required: true
workflow:
  id: kyc
  name: kyc-relative
  steps:
    - api_id: pan
      order: 1
    - api_id: aml
      order: 2
      mappings:
        - source: "0.holder_name"
          target: name
"#;

#[tokio::test]
async fn test_relative_endpoints_are_left_to_the_proxy() {
    init_tracing();

    let catalog = Catalog::in_memory();
    parse_yaml(RELATIVE_KYC).unwrap().install(&catalog).unwrap();

    let proxy = Arc::new(simulator());
    let mut runner = WorkflowRunner::from_catalog(catalog, "kyc", proxy.clone()).unwrap();

    runner.set_input("pan", "ABCDE1234F");
    runner.run_step().await.unwrap();
    runner.run_step().await.unwrap();
    assert_eq!(runner.state(), RunState::Finished);

    let requests = proxy.requests();
    assert_eq!(requests[0].endpoint, "/verify/pan");
    assert_eq!(requests[1].endpoint, "/aml-check");
    assert_eq!(requests[1].data, Some(json!({"name": "Jane Doe"})));
}

#[tokio::test]
async fn test_reserved_characters_in_path_value() {
    init_tracing();

    let catalog = Catalog::in_memory();
    parse_yaml(BUNDLE).unwrap().install(&catalog).unwrap();

    let proxy = Arc::new(simulator());
    let mut runner = WorkflowRunner::from_catalog(catalog, "kyc", proxy.clone()).unwrap();

    runner.set_input("pan", "ABCDE1234F");
    runner.run_step().await.unwrap();
    runner.run_step().await.unwrap();

    // No route exists for the escaped segment, so the call fails in the simulator
    runner.set_input("rc_number", "KA01?admin=1#");
    assert!(runner.run_step().await.is_err());

    let requests = proxy.requests();
    assert_eq!(requests[2].endpoint, "https://sim.local/rc/KA01%3Fadmin=1%23");
}
