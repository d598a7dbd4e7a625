mod common;

use std::io::Write;

use serde_json::json;

use common::{setup, FLOW, TENANT};
use flowengine::{load_definition_from_path, FlowEngineError, FlowStatus};

const DEFINITION: &str = r#"{
  "name": "order-routing",
  "nodes": [
    {"nodeId": "start", "type": "start", "nextNodes": ["route"]},
    {
      "nodeId": "route",
      "type": "switch",
      "conditions": [
        {"condition": {"op": "greater_than", "path": "total", "value": 1000}, "nextNodeId": "manual_review"},
        {"condition": "region == 'eu'", "nextNodeId": "eu_fulfilment"}
      ],
      "nextNodes": ["default_fulfilment"]
    },
    {"nodeId": "manual_review", "type": "standard", "nextNodes": ["end"]},
    {"nodeId": "eu_fulfilment", "type": "standard", "nextNodes": ["end"]},
    {"nodeId": "default_fulfilment", "type": "standard", "nextNodes": ["end"]},
    {"nodeId": "end", "type": "end"}
  ],
  "edges": [
    {"source": "start", "target": "route"},
    {"from": "route", "to": "manual_review"}
  ]
}"#;

#[tokio::test]
async fn definition_file_loads_and_runs() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(DEFINITION.as_bytes())?;

    let definition = load_definition_from_path(file.path())?;
    assert_eq!(definition.name.as_deref(), Some("order-routing"));
    assert_eq!(definition.edges.len(), 2);

    let harness = setup(definition).await?;
    let payload = json!({"total": 40, "region": "eu"});
    let flow = harness
        .engine
        .run_flow_with(TENANT, FLOW, payload.as_object().cloned().unwrap_or_default())
        .await?;

    assert_eq!(harness.calls(), vec!["start", "eu_fulfilment", "end"]);
    assert_eq!(
        flow.state("route").unwrap().selected_branch.as_deref(),
        Some("eu_fulfilment")
    );
    assert_eq!(flow.overall_status, FlowStatus::Completed);
    Ok(())
}

#[test]
fn missing_file_reports_the_path() {
    let err = load_definition_from_path("/nonexistent/flow.json").unwrap_err();
    assert!(matches!(err, FlowEngineError::Other(_)));
    assert!(format!("{err:#}").contains("/nonexistent/flow.json"));
}

#[test]
fn malformed_definition_is_a_serialization_error() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(b"{\"nodes\": [")?;

    let err = load_definition_from_path(file.path()).unwrap_err();
    assert!(matches!(err, FlowEngineError::Serialization(_)));
    Ok(())
}
